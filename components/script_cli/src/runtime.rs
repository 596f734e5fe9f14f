//! Runtime orchestration for script execution
//!
//! The Runtime struct coordinates all components:
//! - The VM holding the main module and every imported module
//! - The await scheduler and the `asyncio` module
//! - The standard host modules (`os`, `sys`, `pathlib`)
//! - The output sink receiving prints, timings and failures

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_runtime::{attach, Rewrite, Scheduler, SchedulerConfig};
use bridge::{BridgeResult, FromScript, ModuleBuilder};
use core_types::{ScriptError, ScriptResult};
use interpreter::{CompileMode, ObjRef, Object, OutputSink, Value, Vm, VmConfig};

use crate::stdlib;

/// Filename for code given as a string
pub const STRING_FILENAME: &str = "<string>";

/// Filename for REPL input
pub const STDIN_FILENAME: &str = "<stdin>";

/// Runtime configuration
///
/// # Example
///
/// ```
/// use script_cli::RuntimeConfig;
///
/// let config = RuntimeConfig::default().with_gc_threshold(128);
/// assert_eq!(config.vm.gc_threshold, 128);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// VM tunables
    pub vm: VmConfig,
    /// Scheduler tunables
    pub scheduler: SchedulerConfig,
    /// Print bytecode before each execution
    pub print_bytecode: bool,
}

impl RuntimeConfig {
    /// Replace the VM configuration
    pub fn with_vm(mut self, vm: VmConfig) -> Self {
        self.vm = vm;
        self
    }

    /// Replace the scheduler configuration
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the automatic collection threshold
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.vm = self.vm.with_gc_threshold(threshold);
        self
    }

    /// Set the generator poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.scheduler = self.scheduler.with_poll_interval(interval);
        self
    }

    /// Enable bytecode printing
    pub fn with_print_bytecode(mut self, enabled: bool) -> Self {
        self.print_bytecode = enabled;
        self
    }
}

/// What the REPL should do after a line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStatus {
    /// A block is open; keep reading
    Incomplete,
    /// The accumulated input ran; `true` when it succeeded
    Executed(bool),
    /// The input awaits and must be run with [`Runtime::async_run`]
    Deferred(String),
}

/// Main runtime that orchestrates script execution
pub struct Runtime {
    vm: Rc<RefCell<Vm>>,
    scheduler: Scheduler,
    config: RuntimeConfig,
    failure: Option<ScriptError>,
    buffer: String,
}

impl Runtime {
    /// Create a runtime with the standard host modules registered
    ///
    /// # Example
    /// ```
    /// use script_cli::{Runtime, RuntimeConfig};
    ///
    /// let mut runtime = Runtime::new(RuntimeConfig::default());
    /// assert!(runtime.run("x = 1 + 1"));
    /// assert_eq!(runtime.evaluate::<i64>("x"), Some(2));
    /// ```
    pub fn new(config: RuntimeConfig) -> Self {
        let vm = Rc::new(RefCell::new(Vm::with_config(config.vm.clone())));
        let scheduler = attach(&vm, config.scheduler.clone());
        stdlib::register(&mut vm.borrow_mut());
        tracing::debug!(print_bytecode = config.print_bytecode, "runtime created");
        Self {
            vm,
            scheduler,
            config,
            failure: None,
            buffer: String::new(),
        }
    }

    /// Route output to `sink`
    pub fn with_sink(self, sink: Rc<dyn OutputSink>) -> Self {
        self.vm.borrow_mut().set_output(sink);
        self
    }

    /// Current configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shared handle to the VM
    pub fn shared_vm(&self) -> Rc<RefCell<Vm>> {
        Rc::clone(&self.vm)
    }

    /// Borrow the VM
    pub fn vm(&self) -> Ref<'_, Vm> {
        self.vm.borrow()
    }

    /// Borrow the VM mutably
    pub fn vm_mut(&self) -> RefMut<'_, Vm> {
        self.vm.borrow_mut()
    }

    /// The await scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The `__main__` namespace
    pub fn main_module(&self) -> ObjRef {
        self.vm.borrow().main_module()
    }

    /// Execute statements in the main module; returns whether they succeeded
    pub fn run(&mut self, source: &str) -> bool {
        self.execute(source, CompileMode::Exec).is_ok()
    }

    /// Execute `source` in the main module in `mode`
    ///
    /// Failures are reported to the sink and recorded as the last failure.
    pub fn execute(&mut self, source: &str, mode: CompileMode) -> ScriptResult<Value> {
        self.execute_named(source, STRING_FILENAME, mode)
    }

    /// Execute `source` under `filename`
    pub fn execute_named(&mut self, source: &str, filename: &str, mode: CompileMode) -> ScriptResult<Value> {
        let result = {
            let mut vm = self.vm.borrow_mut();
            let output = vm.output();
            output.input(source);
            let started = Instant::now();
            let main = vm.main_module();
            let result = vm.compile(source, filename, mode).and_then(|code| {
                if self.config.print_bytecode {
                    output.stdout(&code.disassemble());
                }
                vm.exec_code(code, main)
            });
            output.execution_time(started.elapsed());
            result
        };
        self.record(&result);
        result
    }

    /// Evaluate an expression and convert the result
    ///
    /// Returns `None` when evaluation fails or the value does not convert.
    pub fn evaluate<T: FromScript>(&mut self, expression: &str) -> Option<T> {
        let value = self.execute(expression, CompileMode::Eval).ok()?;
        let mut vm = self.vm.borrow_mut();
        let pin = vm.pin(value);
        T::from_script(&mut vm, pin.value())
    }

    /// Feed one line of interactive input
    ///
    /// Lines ending in `:` or an opening bracket start a block; an empty
    /// line closes it. Complete input runs in single mode, echoing the
    /// value of expression statements.
    pub fn input(&mut self, line: &str) -> InputStatus {
        if self.buffer.is_empty() {
            if line.trim().is_empty() {
                return InputStatus::Executed(true);
            }
            if !opens_block(line) {
                return self.dispatch(line.to_string());
            }
            self.buffer.push_str(line);
            return InputStatus::Incomplete;
        }
        if !line.trim().is_empty() {
            self.buffer.push('\n');
            self.buffer.push_str(line);
            return InputStatus::Incomplete;
        }
        let source = std::mem::take(&mut self.buffer);
        self.dispatch(source)
    }

    /// Whether a block is open in the input buffer
    pub fn has_pending_input(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drop any partially entered block
    pub fn clear_input(&mut self) {
        self.buffer.clear();
    }

    fn dispatch(&mut self, source: String) -> InputStatus {
        if Rewrite::parse(&source).is_match() {
            return InputStatus::Deferred(source);
        }
        let ok = self.execute_named(&source, STDIN_FILENAME, CompileMode::Single).is_ok();
        InputStatus::Executed(ok)
    }

    /// Run `source` with top-level awaits and wait for its whole chain
    pub async fn async_run(&mut self, source: &str) -> ScriptResult<()> {
        self.vm.borrow().output().input(source);
        let started = Instant::now();
        let result = self.scheduler.run_async(source, None).await;
        self.vm.borrow().output().execution_time(started.elapsed());
        self.record(&result);
        result
    }

    /// Drive spawned host work until nothing is pending
    pub async fn run_until_idle(&self) {
        self.scheduler.run_until_idle().await;
    }

    /// Register a native module built on first import
    ///
    /// # Example
    /// ```
    /// use bridge::HostResult;
    /// use script_cli::{Runtime, RuntimeConfig};
    ///
    /// let mut runtime = Runtime::new(RuntimeConfig::default());
    /// runtime.bind_module("geometry", |m| {
    ///     m.function("area(w: float, h: float) -> float", |w: f64, h: f64| -> HostResult<f64> { Ok(w * h) })?;
    ///     Ok(())
    /// });
    /// assert!(runtime.run("from geometry import area\nsize = area(2, 3.5)"));
    /// assert_eq!(runtime.evaluate::<f64>("size"), Some(7.0));
    /// ```
    pub fn bind_module<F>(&self, name: &str, build: F)
    where
        F: Fn(&mut ModuleBuilder<'_>) -> BridgeResult<()> + 'static,
    {
        bridge::register_module(&mut self.vm.borrow_mut(), name, build);
    }

    /// Names completing `text`
    ///
    /// Plain names complete against the main module and builtins; dotted
    /// names resolve everything before the last dot by plain lookup and
    /// complete its attributes. Lookup never runs script code or property
    /// getters. Private names are offered only when the partial name starts
    /// with `_`.
    pub fn complete(&self, text: &str) -> Vec<String> {
        let mut vm = self.vm.borrow_mut();
        let (base, partial) = match text.rsplit_once('.') {
            Some((base, partial)) => (Some(base), partial),
            None => (None, text),
        };
        let candidates: BTreeSet<String> = match base {
            None => {
                let main = vm.main_module();
                let builtins = vm.builtins_module();
                vm.global_names(main)
                    .into_iter()
                    .chain(vm.global_names(builtins))
                    .chain(vm.module_names())
                    .collect()
            }
            Some(base) if is_dotted_name(base) => match resolve_name(&vm, base) {
                Some(value) => attribute_names(&vm, &value),
                None => BTreeSet::new(),
            },
            Some(_) => BTreeSet::new(),
        };
        let show_private = partial.starts_with('_');
        candidates
            .into_iter()
            .filter(|name| name.starts_with(partial))
            .filter(|name| show_private || !name.starts_with('_'))
            .map(|name| match base {
                Some(base) => format!("{}.{}", base, name),
                None => name,
            })
            .collect()
    }

    /// Run a full collection; returns the number of objects freed
    pub fn collect(&self) -> usize {
        self.vm.borrow_mut().collect()
    }

    /// Whether the last execution failed
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Error from the last failed execution
    pub fn last_failure(&self) -> Option<&ScriptError> {
        self.failure.as_ref()
    }

    fn record<T>(&mut self, result: &ScriptResult<T>) {
        match result {
            Ok(_) => self.failure = None,
            Err(e) => {
                tracing::debug!(error = %e.summary(), "execution failed");
                self.vm.borrow().report_error(e);
                self.failure = Some(e.clone());
            }
        }
    }
}

fn opens_block(line: &str) -> bool {
    let code = match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    };
    matches!(code.trim_end().chars().last(), Some(':' | '(' | '[' | '{'))
}

fn is_dotted_name(text: &str) -> bool {
    !text.is_empty()
        && text.split('.').all(|part| {
            part.starts_with(|c: char| c.is_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_alphanumeric() || c == '_')
        })
}

/// Look up a dotted name without calling anything
fn resolve_name(vm: &Vm, dotted: &str) -> Option<Value> {
    let mut parts = dotted.split('.');
    let first = parts.next()?;
    let mut value = vm
        .get_global(vm.main_module(), first)
        .or_else(|| vm.get_global(vm.builtins_module(), first))?;
    for part in parts {
        value = stored_attribute(vm, &value, part)?;
    }
    Some(value)
}

/// Attribute held directly in a namespace or type dict; properties stop
/// the walk
fn stored_attribute(vm: &Vm, value: &Value, name: &str) -> Option<Value> {
    let handle = value.as_object()?;
    let found = match vm.object(handle) {
        Some(Object::Module(module)) => return module.namespace.get(name).cloned(),
        Some(Object::Instance(instance)) => instance.attrs.get(name).cloned(),
        _ => None,
    };
    let found = found.or_else(|| {
        let mut ty = match vm.type_object(handle) {
            Some(_) => Some(handle),
            None => Some(vm.type_of(value)),
        };
        while let Some(current) = ty {
            let type_object = vm.type_object(current)?;
            if let Some(attr) = type_object.attrs.get(name) {
                return Some(attr.clone());
            }
            ty = type_object.base;
        }
        None
    })?;
    match found.as_object().and_then(|h| vm.object(h)) {
        Some(Object::Property(_)) => None,
        _ => Some(found),
    }
}

fn attribute_names(vm: &Vm, value: &Value) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    if let Some(handle) = value.as_object() {
        match vm.object(handle) {
            Some(Object::Module(module)) => {
                names.extend(module.namespace.keys().map(|k| k.to_string()));
                return names;
            }
            Some(Object::Instance(instance)) => {
                names.extend(instance.attrs.keys().map(|k| k.to_string()));
            }
            _ => {}
        }
    }
    let mut ty = Some(vm.type_of(value));
    while let Some(handle) = ty {
        let Some(type_object) = vm.type_object(handle) else {
            break;
        };
        names.extend(type_object.attrs.keys().map(|k| k.to_string()));
        ty = type_object.base;
    }
    names
}
