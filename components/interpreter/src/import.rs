//! Module import
//!
//! Resolution order: already loaded modules, registered native builders
//! (run once, lazily), then source returned by the import hook, compiled as
//! `<name>.py`.

use std::rc::Rc;

use core_types::ErrorKind;
use memory_manager::ObjRef;
use parser::CompileMode;

use crate::error::{VmError, VmResult};
use crate::value::Value;
use crate::vm::Vm;

/// Populates a freshly created module
pub type ModuleInit = Rc<dyn Fn(&mut Vm, ObjRef) -> VmResult<()>>;

/// Returns source text for a module name, or `None` if unknown
pub type ImportHook = Rc<dyn Fn(&str) -> Option<String>>;

impl Vm {
    /// Register a native module built on first import
    pub fn register_module(
        &mut self,
        name: &str,
        init: impl Fn(&mut Vm, ObjRef) -> VmResult<()> + 'static,
    ) {
        self.module_inits.insert(Rc::from(name), Rc::new(init));
    }

    /// Install the source provider consulted for unknown modules
    pub fn set_import_hook(&mut self, hook: impl Fn(&str) -> Option<String> + 'static) {
        self.import_hook = Some(Rc::new(hook));
    }

    /// Names of loaded and registered modules, sorted
    pub fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .keys()
            .chain(self.module_inits.keys())
            .map(|n| n.to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// `import name`
    pub fn import(&mut self, name: &str) -> VmResult<ObjRef> {
        if let Some(module) = self.modules.get(name) {
            return Ok(*module);
        }

        if let Some(init) = self.module_inits.get(name).cloned() {
            let module = self.new_module(name);
            self.modules.insert(Rc::from(name), module);
            if let Err(e) = init(self, module) {
                self.modules.remove(name);
                return Err(e);
            }
            tracing::debug!(module = name, "native module initialized");
            return Ok(module);
        }

        let source = self.import_hook.clone().and_then(|hook| hook(name));
        if let Some(source) = source {
            let module = self.new_module(name);
            self.modules.insert(Rc::from(name), module);
            let filename = format!("{}.py", name);
            if let Err(e) = self.compile_exec(&source, &filename, CompileMode::Exec, module) {
                self.modules.remove(name);
                return Err(VmError::Exception(e));
            }
            tracing::debug!(module = name, "source module loaded");
            return Ok(module);
        }

        Err(VmError::new(
            ErrorKind::ImportError,
            format!("No module named '{}'", name),
        ))
    }

    /// Import a module and read one of its globals
    pub fn import_attr(&mut self, module: &str, name: &str) -> VmResult<Value> {
        let handle = self.import(module)?;
        self.get_attr(&Value::Object(handle), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_module() {
        let mut vm = Vm::new();
        let err = vm.import("nope").unwrap_err().into_script_error();
        assert_eq!(err.kind, ErrorKind::ImportError);
        assert_eq!(err.message, "No module named 'nope'");
    }

    #[test]
    fn test_native_module_built_once() {
        let mut vm = Vm::new();
        vm.register_module("answers", |vm, module| {
            vm.set_global(module, "value", Value::Int(42));
            Ok(())
        });
        let first = vm.import("answers").unwrap();
        let second = vm.import("answers").unwrap();
        assert_eq!(first, second);
        assert_eq!(vm.import_attr("answers", "value").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_hook_source_module() {
        let mut vm = Vm::new();
        vm.set_import_hook(|name| match name {
            "helpers" => Some("def double(x):\n    return x * 2\n".to_string()),
            _ => None,
        });
        let double = vm.import_attr("helpers", "double").unwrap();
        assert_eq!(vm.call(&double, &[Value::Int(4)]).unwrap(), Value::Int(8));
    }

    #[test]
    fn test_failed_source_module_is_not_cached() {
        let mut vm = Vm::new();
        vm.set_import_hook(|_| Some("raise ValueError('boom')\n".to_string()));
        assert!(vm.import("bad").is_err());
        assert!(vm.loaded_module("bad").is_none());
    }
}
