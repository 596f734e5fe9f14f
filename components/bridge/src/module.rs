//! Native modules built from host functions and bridged types

use std::rc::Rc;

use interpreter::{ObjRef, Object, Value, Vm};

use crate::call::{self, HostFn};
use crate::codec::IntoScript;
use crate::descriptor;
use crate::error::BridgeResult;
use crate::object::Bridged;

/// Populates one module namespace
///
/// ```
/// use bridge::{ModuleBuilder, HostResult};
/// use interpreter::{CompileMode, Value, Vm};
///
/// let mut vm = Vm::new();
/// let mut m = ModuleBuilder::new(&mut vm, "mathx");
/// m.function("double(x: int) -> int", |x: i64| -> HostResult<i64> { Ok(x * 2) }).unwrap();
/// let module = m.finish();
/// vm.add_module("mathx", module);
///
/// let main = vm.main_module();
/// vm.compile_exec("import mathx\n", "<doc>", CompileMode::Exec, main).unwrap();
/// assert_eq!(vm.compile_exec("mathx.double(21)", "<doc>", CompileMode::Eval, main).unwrap(), Value::Int(42));
/// ```
pub struct ModuleBuilder<'vm> {
    vm: &'vm mut Vm,
    name: String,
    module: ObjRef,
    doc: Option<String>,
    interfaces: Vec<String>,
}

impl<'vm> ModuleBuilder<'vm> {
    /// Builder for a fresh, unregistered module
    pub fn new(vm: &'vm mut Vm, name: &str) -> Self {
        let module = vm.new_module(name);
        Self::attach(vm, name, module)
    }

    /// Builder for an existing module namespace
    pub fn attach(vm: &'vm mut Vm, name: &str, module: ObjRef) -> Self {
        Self {
            vm,
            name: name.to_string(),
            module,
            doc: None,
            interfaces: Vec::new(),
        }
    }

    /// The VM the module lives in
    pub fn vm(&mut self) -> &mut Vm {
        self.vm
    }

    /// Module being populated
    pub fn module(&self) -> ObjRef {
        self.module
    }

    /// Module docstring, placed before the member interfaces
    pub fn doc(&mut self, doc: &str) -> &mut Self {
        self.doc = Some(doc.to_string());
        self
    }

    /// Bind a host function as a module global
    pub fn function<Args, F: HostFn<Args>>(&mut self, signature: &str, f: F) -> BridgeResult<&mut Self> {
        let bound = call::function(self.vm, &self.name, signature, f)?;
        self.vm.set_global(self.module, &bound.signature.name, bound.value);
        self.interfaces.push(bound.interface);
        Ok(self)
    }

    /// Bind a constant
    pub fn value<V: IntoScript>(&mut self, name: &str, value: V) -> BridgeResult<&mut Self> {
        let value = value.into_script(self.vm)?;
        self.vm.set_global(self.module, name, value);
        self.interfaces.push(format!("{}: {}", name, V::type_name()));
        Ok(self)
    }

    /// Register `T` and bind its type object under its script name
    pub fn class<T: Bridged>(&mut self) -> BridgeResult<&mut Self> {
        let descriptor = descriptor::register::<T>(self.vm)?;
        if let Some(Object::Type(ty)) = self.vm.object_mut(descriptor.handle) {
            if ty.module.is_none() {
                ty.module = Some(Rc::from(self.name.as_str()));
            }
        }
        self.vm.set_global(self.module, &descriptor.name, descriptor.value());
        self.interfaces.push(descriptor.interface.clone());
        Ok(self)
    }

    /// Write `__doc__` from the collected interfaces and return the module
    pub fn finish(self) -> ObjRef {
        let mut sections: Vec<String> = Vec::with_capacity(self.interfaces.len() + 1);
        sections.extend(self.doc);
        sections.extend(self.interfaces);
        if !sections.is_empty() {
            self.vm
                .set_global(self.module, "__doc__", Value::str(sections.join("\n\n")));
        }
        tracing::debug!(module = %self.name, "module bound");
        self.module
    }
}

/// Register a native module built on first `import`
///
/// A failing `build` leaves the module unimported; the registration error
/// surfaces as the import's exception.
pub fn register_module<F>(vm: &mut Vm, name: &str, build: F)
where
    F: Fn(&mut ModuleBuilder<'_>) -> BridgeResult<()> + 'static,
{
    let module_name = name.to_string();
    vm.register_module(name, move |vm, module| {
        let mut builder = ModuleBuilder::attach(vm, &module_name, module);
        build(&mut builder)?;
        builder.finish();
        Ok(())
    });
}
