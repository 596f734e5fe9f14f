//! Virtual Machine for bytecode execution
//!
//! Main entry point for compiling and running script code, and the host-side
//! API the bridge builds on: value stack, scratch registers, allocation,
//! calls and module namespaces.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytecode_system::BytecodeChunk;
use core_types::{ErrorKind, ScriptError, ScriptResult, StackFrame};
use memory_manager::{Heap, ObjRef, RootTable};
use parser::CompileMode;

use crate::call_frame::CallFrame;
use crate::config::VmConfig;
use crate::context::ExecutionContext;
use crate::dispatch::Exit;
use crate::error::{VmError, VmResult};
use crate::import::{ImportHook, ModuleInit};
use crate::object::*;
use crate::output::{OutputSink, TracingSink};
use crate::value::{HashKey, Value};

/// Number of scratch registers
pub const REGISTER_COUNT: usize = 8;

static NEXT_VM_ID: AtomicU64 = AtomicU64::new(1);

/// Type objects of the builtin value kinds
pub struct BuiltinTypes {
    /// `object`
    pub object: ObjRef,
    /// `type`
    pub type_: ObjRef,
    /// `NoneType`
    pub none: ObjRef,
    /// `bool`
    pub bool: ObjRef,
    /// `int`
    pub int: ObjRef,
    /// `float`
    pub float: ObjRef,
    /// `str`
    pub str: ObjRef,
    /// `bytes`
    pub bytes: ObjRef,
    /// `list`
    pub list: ObjRef,
    /// `dict`
    pub dict: ObjRef,
    /// `function`
    pub function: ObjRef,
    /// `builtin_function_or_method`
    pub native: ObjRef,
    /// `method`
    pub method: ObjRef,
    /// `module`
    pub module: ObjRef,
    /// `generator`
    pub generator: ObjRef,
    /// `iterator`
    pub iterator: ObjRef,
    /// `property`
    pub property: ObjRef,
    /// `staticmethod`
    pub staticmethod: ObjRef,
    /// `StopIteration`
    pub stop_iteration: ObjRef,
    /// Exception classes by kind
    pub errors: HashMap<ErrorKind, ObjRef>,
}

impl BuiltinTypes {
    fn allocate(heap: &mut Heap<Object>) -> Self {
        let object = heap.allocate(Object::Type(TypeObject::new("object", TypeKind::Builtin)));
        let mut builtin = |name: &str, base: ObjRef| {
            let mut ty = TypeObject::new(name, TypeKind::Builtin);
            ty.base = Some(base);
            heap.allocate(Object::Type(ty))
        };
        let int = builtin("int", object);
        let bool = builtin("bool", int);
        let mut types = BuiltinTypes {
            type_: builtin("type", object),
            none: builtin("NoneType", object),
            bool,
            int,
            float: builtin("float", object),
            str: builtin("str", object),
            bytes: builtin("bytes", object),
            list: builtin("list", object),
            dict: builtin("dict", object),
            function: builtin("function", object),
            native: builtin("builtin_function_or_method", object),
            method: builtin("method", object),
            module: builtin("module", object),
            generator: builtin("generator", object),
            iterator: builtin("iterator", object),
            property: builtin("property", object),
            staticmethod: builtin("staticmethod", object),
            stop_iteration: object,
            errors: HashMap::new(),
            object,
        };

        // ErrorKind::ALL lists every base before its subclasses
        for kind in ErrorKind::ALL {
            let mut ty = TypeObject::new(kind.name(), TypeKind::Exception(kind));
            ty.base = Some(match kind.base() {
                Some(base) => types.errors[&base],
                None => object,
            });
            let handle = heap.allocate(Object::Type(ty));
            types.errors.insert(kind, handle);
        }
        let mut stop = TypeObject::new("StopIteration", TypeKind::StopIteration);
        stop.base = Some(types.errors[&ErrorKind::Exception]);
        types.stop_iteration = heap.allocate(Object::Type(stop));
        types
    }

    fn handles(&self) -> Vec<ObjRef> {
        let mut out = vec![
            self.object,
            self.type_,
            self.none,
            self.bool,
            self.int,
            self.float,
            self.str,
            self.bytes,
            self.list,
            self.dict,
            self.function,
            self.native,
            self.method,
            self.module,
            self.generator,
            self.iterator,
            self.property,
            self.staticmethod,
            self.stop_iteration,
        ];
        out.extend(self.errors.values().copied());
        out
    }
}

pub(crate) enum CallOutcome {
    /// The callee finished and produced a value
    Value(Value),
    /// A script frame was pushed and must be run
    FramePushed,
}

/// Remembers a stack height and restores it
///
/// ```
/// use interpreter::{StackGuard, Value, Vm};
///
/// let mut vm = Vm::new();
/// let guard = StackGuard::new(&vm);
/// vm.push(Value::Int(1));
/// guard.restore(&mut vm);
/// assert_eq!(vm.stack_depth(), 0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StackGuard {
    depth: usize,
}

impl StackGuard {
    /// Record the current depth
    pub fn new(vm: &Vm) -> Self {
        Self {
            depth: vm.stack_depth(),
        }
    }

    /// Pop everything pushed since the guard was created
    pub fn restore(self, vm: &mut Vm) {
        vm.truncate_stack(self.depth);
    }
}

/// Virtual Machine for executing script bytecode
///
/// The VM manages the execution state including:
/// - Module namespaces and the builtins
/// - Frame stack and the shared operand stack
/// - Memory heap (via memory_manager) and persistent roots
/// - Host extensions keyed by type
pub struct Vm {
    id: u64,
    pub(crate) heap: Heap<Object>,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<ExecutionContext>,
    pub(crate) registers: Vec<Value>,
    pub(crate) modules: HashMap<Rc<str>, ObjRef>,
    pub(crate) module_inits: HashMap<Rc<str>, ModuleInit>,
    pub(crate) import_hook: Option<ImportHook>,
    pub(crate) builtins: ObjRef,
    main: ObjRef,
    pub(crate) types: BuiltinTypes,
    pub(crate) roots: RootTable,
    extensions: HashMap<TypeId, Box<dyn Any>>,
    output: Rc<dyn OutputSink>,
    pub(crate) config: VmConfig,
    pub(crate) native_depth: usize,
    pub(crate) repr_guard: Vec<ObjRef>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a VM with the default configuration
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create a VM with `config`
    pub fn with_config(config: VmConfig) -> Self {
        let mut heap = Heap::new(config.gc_threshold);
        let types = BuiltinTypes::allocate(&mut heap);
        let builtins = heap.allocate(Object::Module(ModuleObject {
            name: Rc::from("builtins"),
            namespace: Namespace::new(),
        }));
        let main = heap.allocate(Object::Module(ModuleObject {
            name: Rc::from("__main__"),
            namespace: Namespace::new(),
        }));

        let mut vm = Self {
            id: NEXT_VM_ID.fetch_add(1, Ordering::Relaxed),
            heap,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            registers: vec![Value::None; REGISTER_COUNT],
            modules: HashMap::new(),
            module_inits: HashMap::new(),
            import_hook: None,
            builtins,
            main,
            types,
            roots: RootTable::new(),
            extensions: HashMap::new(),
            output: Rc::new(TracingSink),
            config,
            native_depth: 0,
            repr_guard: Vec::new(),
        };
        vm.modules.insert(Rc::from("builtins"), builtins);
        vm.modules.insert(Rc::from("__main__"), main);
        crate::builtins::install(&mut vm);
        vm.set_global(main, "__name__", Value::str("__main__"));
        tracing::debug!(vm = vm.id, "vm created");
        vm
    }

    /// Process-unique identifier of this VM
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Active configuration
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Change the automatic collection threshold
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.config.gc_threshold = threshold;
        self.heap.set_threshold(threshold);
    }

    // ------------------------------------------------------------------
    // Compile and run
    // ------------------------------------------------------------------

    /// Compile source without running it
    pub fn compile(
        &self,
        source: &str,
        filename: &str,
        mode: CompileMode,
    ) -> ScriptResult<Rc<BytecodeChunk>> {
        parser::compile(source, filename, mode).map_err(|mut e| {
            if let Some(position) = e.source_position {
                e.push_frame(StackFrame {
                    function_name: None,
                    filename: filename.to_string(),
                    line: position.line,
                });
            }
            e
        })
    }

    /// Compile `source` and run it in `module`
    ///
    /// Exec and single mode return `None`; eval mode returns the value of
    /// the expression. On failure the value stack, frame stack and scratch
    /// registers are restored to their state before the call.
    pub fn compile_exec(
        &mut self,
        source: &str,
        filename: &str,
        mode: CompileMode,
        module: ObjRef,
    ) -> ScriptResult<Value> {
        let code = self.compile(source, filename, mode)?;
        self.exec_code(code, module)
    }

    /// Run an already compiled module chunk in `module`
    pub fn exec_code(&mut self, code: Rc<BytecodeChunk>, module: ObjRef) -> ScriptResult<Value> {
        if !matches!(self.heap.get(module), Some(Object::Module(_))) {
            return Err(ScriptError::type_error("exec target is not a module"));
        }
        let stack_depth = self.stack.len();
        let frame_depth = self.frames.len();
        let registers = self.registers.clone();

        let frame = ExecutionContext::new(code, module, Vec::new(), stack_depth);
        let result = match self.push_frame(frame) {
            Ok(()) => self.run_frames(frame_depth),
            Err(e) => Err(e),
        };
        match result {
            Ok(Exit::Return(value)) => Ok(value),
            Ok(Exit::Yield(..)) => {
                self.restore_depths(stack_depth, frame_depth, registers);
                Err(ScriptError::runtime_error("'yield' outside function"))
            }
            Err(e) => {
                self.restore_depths(stack_depth, frame_depth, registers);
                Err(e.into_script_error())
            }
        }
    }

    fn restore_depths(&mut self, stack: usize, frames: usize, registers: Vec<Value>) {
        self.stack.truncate(stack);
        self.frames.truncate(frames);
        self.registers = registers;
    }

    pub(crate) fn push_frame(&mut self, frame: ExecutionContext) -> VmResult<()> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VmError::new(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        self.frames.push(frame);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Value stack and registers
    // ------------------------------------------------------------------

    /// Push a value onto the operand stack
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop the top of the operand stack
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Value `distance` slots below the top
    pub fn peek(&self, distance: usize) -> Option<&Value> {
        let len = self.stack.len();
        if distance >= len {
            return None;
        }
        self.stack.get(len - 1 - distance)
    }

    /// Current operand stack height
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Pop down to `depth`
    pub fn truncate_stack(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }

    pub(crate) fn stack_slot(&self, index: usize) -> Option<Value> {
        self.stack.get(index).cloned()
    }

    /// Run `f` and restore the stack height afterwards
    pub fn guarded<R>(&mut self, f: impl FnOnce(&mut Vm) -> R) -> R {
        let guard = StackGuard::new(self);
        let result = f(self);
        guard.restore(self);
        result
    }

    /// Store into a scratch register
    pub fn set_register(&mut self, index: usize, value: Value) -> VmResult<()> {
        match self.registers.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::new(
                ErrorKind::IndexError,
                format!("register {} out of range", index),
            )),
        }
    }

    /// Read a scratch register
    pub fn register(&self, index: usize) -> Option<Value> {
        self.registers.get(index).cloned()
    }

    /// Current number of script frames
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Nesting of native entry points currently executing
    pub fn native_depth(&self) -> usize {
        self.native_depth
    }

    // ------------------------------------------------------------------
    // Heap access
    // ------------------------------------------------------------------

    /// Store an object on the heap
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        self.heap.allocate(object)
    }

    /// Borrow a heap object
    pub fn object(&self, handle: ObjRef) -> Option<&Object> {
        self.heap.get(handle)
    }

    /// Mutably borrow a heap object
    pub fn object_mut(&mut self, handle: ObjRef) -> Option<&mut Object> {
        self.heap.get_mut(handle)
    }

    /// True if `handle` refers to a live object
    pub fn is_live(&self, handle: ObjRef) -> bool {
        self.heap.contains(handle)
    }

    pub(crate) fn get_object(&self, handle: ObjRef) -> VmResult<&Object> {
        self.heap
            .get(handle)
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "stale object handle"))
    }

    pub(crate) fn get_object_mut(&mut self, handle: ObjRef) -> VmResult<&mut Object> {
        self.heap
            .get_mut(handle)
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "stale object handle"))
    }

    /// Allocate a list
    pub fn new_list(&mut self, items: Vec<Value>) -> Value {
        Value::Object(self.alloc(Object::List(items)))
    }

    /// Allocate a dict from key/value pairs
    pub fn new_dict(&mut self, pairs: Vec<(Value, Value)>) -> VmResult<Value> {
        let mut dict = crate::dict::Dict::new();
        for (key, value) in pairs {
            let hash = self.hash_key(&key)?;
            dict.insert(hash, key, value);
        }
        Ok(Value::Object(self.alloc(Object::Dict(dict))))
    }

    /// Items of a list value
    pub fn list_items(&self, value: &Value) -> Option<Vec<Value>> {
        match self.heap.get(value.as_object()?)? {
            Object::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Entries of a dict value in insertion order
    pub fn dict_items(&self, value: &Value) -> Option<Vec<(Value, Value)>> {
        match self.heap.get(value.as_object()?)? {
            Object::Dict(dict) => Some(
                dict.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Wrap a host closure as a callable
    pub fn new_native(
        &mut self,
        name: &str,
        func: impl Fn(&mut Vm, CallFrame) -> VmResult<Value> + 'static,
    ) -> Value {
        let mut attrs = Namespace::new();
        attrs.insert(Rc::from("__name__"), Value::str(name));
        Value::Object(self.alloc(Object::Native(NativeFunction {
            name: Rc::from(name),
            func: Rc::new(func),
            attrs,
        })))
    }

    /// Register a type object; the base defaults to `object`
    pub fn new_type(&mut self, mut ty: TypeObject) -> ObjRef {
        if ty.base.is_none() {
            ty.base = Some(self.types.object);
        }
        ty.attrs
            .entry(Rc::from("__name__"))
            .or_insert_with(|| Value::Str(ty.name.clone()));
        self.alloc(Object::Type(ty))
    }

    /// Borrow a type object
    pub fn type_object(&self, handle: ObjRef) -> Option<&TypeObject> {
        match self.heap.get(handle)? {
            Object::Type(ty) => Some(ty),
            _ => None,
        }
    }

    /// Allocate an instance of `class` carrying `userdata`
    ///
    /// The instance gets the type's slot count and finalizer.
    pub fn new_instance(
        &mut self,
        class: ObjRef,
        userdata: Option<Box<dyn Any>>,
    ) -> VmResult<Value> {
        let (slots, finalizer) = match self.get_object(class)? {
            Object::Type(ty) => (ty.slots, ty.finalizer.clone()),
            _ => return Err(ScriptError::type_error("instance class is not a type").into()),
        };
        Ok(Value::Object(self.alloc(Object::Instance(Instance {
            class,
            attrs: Namespace::new(),
            slots: vec![Value::None; slots],
            userdata,
            finalizer,
        }))))
    }

    /// Borrow the userdata of an instance if it has type `T`
    pub fn userdata<T: 'static>(&self, value: &Value) -> Option<&T> {
        match self.heap.get(value.as_object()?)? {
            Object::Instance(inst) => inst.userdata.as_ref()?.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Attach host payload to an instance that has none
    pub fn set_userdata(&mut self, value: &Value, userdata: Box<dyn Any>) -> VmResult<()> {
        let handle = value
            .as_object()
            .ok_or_else(|| ScriptError::type_error("userdata requires an instance"))?;
        match self.get_object_mut(handle)? {
            Object::Instance(inst) if inst.userdata.is_none() => {
                inst.userdata = Some(userdata);
                Ok(())
            }
            Object::Instance(_) => Err(VmError::new(
                ErrorKind::RuntimeError,
                "instance is already initialized",
            )),
            _ => Err(ScriptError::type_error("userdata requires an instance").into()),
        }
    }

    /// Read an instance slot
    pub fn instance_slot(&self, value: &Value, index: usize) -> Option<Value> {
        match self.heap.get(value.as_object()?)? {
            Object::Instance(inst) => inst.slots.get(index).cloned(),
            _ => None,
        }
    }

    /// Write an instance slot
    pub fn set_instance_slot(&mut self, value: &Value, index: usize, slot_value: Value) -> VmResult<()> {
        let handle = value
            .as_object()
            .ok_or_else(|| ScriptError::type_error("slots require an instance"))?;
        match self.get_object_mut(handle)? {
            Object::Instance(inst) => match inst.slots.get_mut(index) {
                Some(slot) => {
                    *slot = slot_value;
                    Ok(())
                }
                None => Err(VmError::new(
                    ErrorKind::IndexError,
                    format!("slot {} out of range", index),
                )),
            },
            _ => Err(ScriptError::type_error("slots require an instance").into()),
        }
    }

    /// Attribute table of a function, native, type or module
    pub fn attrs_mut(&mut self, handle: ObjRef) -> Option<&mut Namespace> {
        match self.heap.get_mut(handle)? {
            Object::Function(f) => Some(&mut f.attrs),
            Object::Native(f) => Some(&mut f.attrs),
            Object::Type(t) => Some(&mut t.attrs),
            Object::Module(m) => Some(&mut m.namespace),
            Object::Instance(i) => Some(&mut i.attrs),
            _ => None,
        }
    }

    /// Builtin type objects
    pub fn builtin_types(&self) -> &BuiltinTypes {
        &self.types
    }

    pub(crate) fn types_handles(&self) -> Vec<ObjRef> {
        self.types.handles()
    }

    /// Exception class for `kind`
    pub fn exception_type(&self, kind: ErrorKind) -> ObjRef {
        self.types
            .errors
            .get(&kind)
            .copied()
            .unwrap_or(self.types.object)
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Type object of a value
    pub fn type_of(&self, value: &Value) -> ObjRef {
        let t = &self.types;
        match value {
            Value::None => t.none,
            Value::Bool(_) => t.bool,
            Value::Int(_) => t.int,
            Value::Float(_) => t.float,
            Value::Str(_) => t.str,
            Value::Bytes(_) => t.bytes,
            Value::Object(handle) => match self.heap.get(*handle) {
                Some(Object::List(_)) => t.list,
                Some(Object::Dict(_)) => t.dict,
                Some(Object::Function(_)) => t.function,
                Some(Object::Native(_)) => t.native,
                Some(Object::BoundMethod { .. }) => t.method,
                Some(Object::Module(_)) => t.module,
                Some(Object::Type(_)) => t.type_,
                Some(Object::Instance(inst)) => inst.class,
                Some(Object::Generator(_)) => t.generator,
                Some(Object::Iterator(_)) => t.iterator,
                Some(Object::Exception(e)) => e.class,
                Some(Object::Property(_)) => t.property,
                Some(Object::StaticMethod(_)) => t.staticmethod,
                None => t.object,
            },
        }
    }

    /// Name of a value's type, as used in error messages
    pub fn type_name(&self, value: &Value) -> String {
        self.type_object(self.type_of(value))
            .map(|ty| ty.name.to_string())
            .unwrap_or_else(|| "object".to_string())
    }

    /// True if `ty` is `base` or derives from it
    pub fn is_subtype(&self, ty: ObjRef, base: ObjRef) -> bool {
        let mut current = Some(ty);
        while let Some(handle) = current {
            if handle == base {
                return true;
            }
            current = self.type_object(handle).and_then(|t| t.base);
        }
        false
    }

    /// `isinstance(value, ty)`
    pub fn isinstance(&self, value: &Value, ty: ObjRef) -> bool {
        self.is_subtype(self.type_of(value), ty)
    }

    /// True if calling the value can succeed
    pub fn is_callable(&self, value: &Value) -> bool {
        let Some(handle) = value.as_object() else {
            return false;
        };
        match self.heap.get(handle) {
            Some(Object::Function(_) | Object::Native(_) | Object::BoundMethod { .. }) => true,
            Some(Object::Type(_)) => true,
            Some(Object::Instance(_)) => self.lookup_type_attr(self.type_of(value), "__call__").is_some(),
            _ => false,
        }
    }

    /// True if the value is a generator object
    pub fn is_generator(&self, value: &Value) -> bool {
        matches!(
            value.as_object().and_then(|h| self.heap.get(h)),
            Some(Object::Generator(_))
        )
    }

    /// Find an attribute on a type or its bases
    pub fn lookup_type_attr(&self, ty: ObjRef, name: &str) -> Option<Value> {
        let mut current = Some(ty);
        while let Some(handle) = current {
            let t = self.type_object(handle)?;
            if let Some(value) = t.attrs.get(name) {
                return Some(value.clone());
            }
            current = t.base;
        }
        None
    }

    /// Dict key for a value
    pub fn hash_key(&self, value: &Value) -> VmResult<HashKey> {
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(n) => HashKey::Int(*n),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.2e18 {
                    HashKey::Int(*f as i64)
                } else {
                    HashKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Bytes(b) => HashKey::Bytes(b.clone()),
            Value::Object(handle) => match self.heap.get(*handle) {
                Some(Object::List(_)) | Some(Object::Dict(_)) => {
                    return Err(ScriptError::type_error(format!(
                        "unhashable type: '{}'",
                        self.type_name(value)
                    ))
                    .into())
                }
                _ => HashKey::Object(*handle),
            },
        })
    }

    // ------------------------------------------------------------------
    // Modules and globals
    // ------------------------------------------------------------------

    /// The `__main__` module
    pub fn main_module(&self) -> ObjRef {
        self.main
    }

    /// The `builtins` module
    pub fn builtins_module(&self) -> ObjRef {
        self.builtins
    }

    /// Allocate an unregistered module
    pub fn new_module(&mut self, name: &str) -> ObjRef {
        let mut namespace = Namespace::new();
        namespace.insert(Rc::from("__name__"), Value::str(name));
        self.alloc(Object::Module(ModuleObject {
            name: Rc::from(name),
            namespace,
        }))
    }

    /// Make `module` importable as `name`
    pub fn add_module(&mut self, name: &str, module: ObjRef) {
        self.modules.insert(Rc::from(name), module);
    }

    /// A module that has already been imported
    pub fn loaded_module(&self, name: &str) -> Option<ObjRef> {
        self.modules.get(name).copied()
    }

    /// Read a module global
    pub fn get_global(&self, module: ObjRef, name: &str) -> Option<Value> {
        match self.heap.get(module)? {
            Object::Module(m) => m.namespace.get(name).cloned(),
            _ => None,
        }
    }

    /// Write a module global; ignored if `module` is not a module
    pub fn set_global(&mut self, module: ObjRef, name: &str, value: Value) {
        if let Some(Object::Module(m)) = self.heap.get_mut(module) {
            m.namespace.insert(Rc::from(name), value);
        }
    }

    /// Remove a module global
    pub fn remove_global(&mut self, module: ObjRef, name: &str) -> Option<Value> {
        match self.heap.get_mut(module)? {
            Object::Module(m) => m.namespace.remove(name),
            _ => None,
        }
    }

    /// Sorted global names of a module
    pub fn global_names(&self, module: ObjRef) -> Vec<String> {
        let mut names: Vec<String> = match self.heap.get(module) {
            Some(Object::Module(m)) => m.namespace.keys().map(|k| k.to_string()).collect(),
            _ => Vec::new(),
        };
        names.sort();
        names
    }

    /// Name a module was created with
    pub fn module_name(&self, module: ObjRef) -> Option<String> {
        match self.heap.get(module)? {
            Object::Module(m) => Some(m.name.to_string()),
            _ => None,
        }
    }

    /// Look up a builtin
    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.get_global(self.builtins, name)
    }

    /// Module global, falling back to builtins
    pub fn lookup_global(&self, module: ObjRef, name: &str) -> Option<Value> {
        self.get_global(module, name).or_else(|| self.builtin(name))
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Call `callee` with positional arguments
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> VmResult<Value> {
        let depth = self.stack.len();
        self.stack.push(callee.clone());
        self.stack.extend(args.iter().cloned());
        let entry = self.frames.len();
        let result = match self.call_on_stack(args.len()) {
            Ok(CallOutcome::Value(value)) => Ok(value),
            Ok(CallOutcome::FramePushed) => match self.run_frames(entry) {
                Ok(Exit::Return(value)) => Ok(value),
                Ok(Exit::Yield(..)) => Err(VmError::new(
                    ErrorKind::RuntimeError,
                    "unexpected yield in called frame",
                )),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        self.stack.truncate(depth);
        result
    }

    /// Look up `name` on `receiver` and call it
    pub fn call_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> VmResult<Value> {
        let method = self.get_attr(receiver, name)?;
        self.call(&method, args)
    }

    /// Call the callee sitting below `argc` arguments on the stack
    ///
    /// Native and constructor calls complete immediately; script functions
    /// push a frame that the caller runs. Either way the callee and its
    /// arguments are gone from the stack afterwards.
    pub(crate) fn call_on_stack(&mut self, argc: usize) -> VmResult<CallOutcome> {
        let callee_index = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(|| VmError::new(ErrorKind::RuntimeError, "operand stack underflow"))?;
        let callee = self.stack[callee_index].clone();
        let frame = CallFrame::new(callee_index + 1, argc);

        let Some(handle) = callee.as_object() else {
            return Err(self.not_callable(&callee));
        };

        enum Target {
            Script(Rc<BytecodeChunk>, Vec<Value>, ObjRef, Option<ObjRef>),
            Native(NativeFn),
            Bound(Value, Value),
            Type(ObjRef),
            Instance,
        }

        let target = match self.get_object(handle)? {
            Object::Function(f) => {
                Target::Script(f.code.clone(), f.defaults.clone(), f.module, f.owner)
            }
            Object::Native(f) => Target::Native(f.func.clone()),
            Object::BoundMethod { receiver, function } => {
                Target::Bound(receiver.clone(), function.clone())
            }
            Object::Type(_) => Target::Type(handle),
            Object::Instance(_) => Target::Instance,
            _ => return Err(self.not_callable(&callee)),
        };

        match target {
            Target::Script(code, defaults, module, owner) => {
                let locals = bind_arguments(&code, &defaults, &self.stack[callee_index + 1..])?;
                self.stack.truncate(callee_index);
                let mut context = ExecutionContext::new(code.clone(), module, locals, callee_index);
                context.owner = owner;
                if code.is_generator {
                    let generator = self.alloc(Object::Generator(GeneratorObject {
                        name: Rc::from(code.name.as_str()),
                        state: GeneratorState::Created,
                        frame: Some(Box::new(context)),
                    }));
                    return Ok(CallOutcome::Value(Value::Object(generator)));
                }
                self.push_frame(context)?;
                Ok(CallOutcome::FramePushed)
            }
            Target::Native(func) => {
                let result = self.invoke_native(&func, frame);
                self.stack.truncate(callee_index);
                result.map(CallOutcome::Value)
            }
            Target::Bound(receiver, function) => {
                self.stack[callee_index] = function;
                self.stack.insert(callee_index + 1, receiver);
                self.call_on_stack(argc + 1)
            }
            Target::Type(ty) => {
                let result = self.construct(ty, frame);
                self.stack.truncate(callee_index);
                result.map(CallOutcome::Value)
            }
            Target::Instance => {
                let call = self
                    .lookup_type_attr(self.type_of(&callee), "__call__")
                    .ok_or_else(|| self.not_callable(&callee))?;
                let bound = self.bind_method(callee, call);
                self.stack[callee_index] = bound;
                self.call_on_stack(argc)
            }
        }
    }

    fn not_callable(&self, value: &Value) -> VmError {
        ScriptError::type_error(format!(
            "'{}' object is not callable",
            self.type_name(value)
        ))
        .into()
    }

    /// Run a native entry point with automatic collection suspended
    pub(crate) fn invoke_native(&mut self, func: &NativeFn, frame: CallFrame) -> VmResult<Value> {
        if self.native_depth >= self.config.max_native_depth {
            return Err(VmError::new(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded in native call",
            ));
        }
        self.native_depth += 1;
        let result = func(self, frame);
        self.native_depth -= 1;
        result
    }

    fn construct(&mut self, ty: ObjRef, frame: CallFrame) -> VmResult<Value> {
        let (kind, constructor, name) = match self.get_object(ty)? {
            Object::Type(t) => (t.kind, t.constructor.clone(), t.name.clone()),
            _ => return Err(ScriptError::type_error("not a type").into()),
        };
        match kind {
            TypeKind::Exception(error_kind) => {
                let first = frame.arg(self, 0).unwrap_or(Value::None);
                let message = match &first {
                    Value::None => String::new(),
                    other => self.to_str(other)?,
                };
                let error = ScriptError::new(error_kind, message);
                Ok(self.new_exception(ty, error, first))
            }
            TypeKind::StopIteration => {
                let value = frame.arg(self, 0).unwrap_or(Value::None);
                let message = match &value {
                    Value::None => String::new(),
                    other => self.to_str(other)?,
                };
                let error = ScriptError::new(ErrorKind::Exception, message);
                Ok(self.new_exception(ty, error, value))
            }
            TypeKind::Builtin | TypeKind::Host => match constructor {
                Some(func) => self.invoke_native(&func, frame),
                None => Err(ScriptError::type_error(format!("cannot create '{}' instances", name)).into()),
            },
            TypeKind::Script => {
                let args = frame.args(self);
                let instance = self.new_instance(ty, None)?;
                match self.lookup_type_attr(ty, "__init__") {
                    Some(init) => {
                        let mut call_args = Vec::with_capacity(args.len() + 1);
                        call_args.push(instance.clone());
                        call_args.extend(args);
                        let returned = self.call(&init, &call_args)?;
                        if returned != Value::None {
                            return Err(ScriptError::type_error(format!(
                                "__init__() should return None, not '{}'",
                                self.type_name(&returned)
                            ))
                            .into());
                        }
                    }
                    None if !args.is_empty() => {
                        return Err(ScriptError::type_error(format!("{}() takes no arguments", name)).into())
                    }
                    None => {}
                }
                Ok(instance)
            }
        }
    }

    /// Create a class from a `class` statement
    ///
    /// Only `object`, host types and other classes can be bases. The class
    /// inherits the base's slot count and finalizer. Script functions among
    /// the members remember the class for `super()`.
    pub fn build_class(
        &mut self,
        name: &str,
        base: &Value,
        members: Vec<(Rc<str>, Value)>,
        module: ObjRef,
    ) -> VmResult<ObjRef> {
        let base = match base {
            Value::None => self.types.object,
            other => other
                .as_object()
                .filter(|h| self.type_object(*h).is_some())
                .ok_or_else(|| {
                    ScriptError::type_error(format!(
                        "class base must be a type, not '{}'",
                        self.type_name(other)
                    ))
                })?,
        };
        let (slots, finalizer) = match self.type_object(base) {
            Some(t) if matches!(t.kind, TypeKind::Host | TypeKind::Script) || base == self.types.object => {
                (t.slots, t.finalizer.clone())
            }
            Some(t) => {
                return Err(ScriptError::type_error(format!(
                    "type '{}' is not an acceptable base type",
                    t.name
                ))
                .into())
            }
            None => return Err(ScriptError::type_error("class base must be a type").into()),
        };

        let mut ty = TypeObject::new(name, TypeKind::Script);
        ty.module = self.module_name(module).map(|m| Rc::from(m.as_str()));
        ty.base = Some(base);
        ty.slots = slots;
        ty.finalizer = finalizer;
        ty.has_dict = true;
        let methods: Vec<ObjRef> = members.iter().filter_map(|(_, v)| v.as_object()).collect();
        ty.attrs.extend(members);
        let class = self.new_type(ty);
        for handle in methods {
            if let Some(Object::Function(f)) = self.heap.get_mut(handle) {
                if f.owner.is_none() {
                    f.owner = Some(class);
                }
            }
        }
        Ok(class)
    }

    /// Allocate an exception object
    pub fn new_exception(&mut self, class: ObjRef, error: ScriptError, value: Value) -> Value {
        Value::Object(self.alloc(Object::Exception(ExceptionObject {
            class,
            error,
            value,
        })))
    }

    /// Bind `function` to `receiver`
    pub fn bind_method(&mut self, receiver: Value, function: Value) -> Value {
        Value::Object(self.alloc(Object::BoundMethod { receiver, function }))
    }

    // ------------------------------------------------------------------
    // Host extensions and output
    // ------------------------------------------------------------------

    /// Host state stored on this VM
    pub fn extension<T: 'static>(&self) -> Option<&T> {
        self.extensions.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    /// Mutable host state stored on this VM
    pub fn extension_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.extensions.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    /// Store host state, replacing any previous value of the same type
    pub fn set_extension<T: 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Replace the output sink
    pub fn set_output(&mut self, sink: Rc<dyn OutputSink>) {
        self.output = sink;
    }

    /// The output sink
    pub fn output(&self) -> Rc<dyn OutputSink> {
        self.output.clone()
    }

    /// Write to the sink's stdout channel
    pub fn write_stdout(&self, text: &str) {
        self.output.stdout(text);
    }

    /// Route a failure to the sink's error channel
    pub fn report_error(&self, error: &ScriptError) {
        self.output.stderr(&error.render());
    }
}

/// Map positional arguments onto a code object's parameter slots
fn bind_arguments(
    code: &BytecodeChunk,
    defaults: &[Value],
    args: &[Value],
) -> VmResult<Vec<Option<Value>>> {
    let params = code.params.len();
    let required = params - defaults.len().min(params);
    if args.len() > params {
        let noun = if params == 1 { "argument" } else { "arguments" };
        return Err(ScriptError::type_error(format!(
            "{}() takes {} positional {} but {} were given",
            code.name,
            params,
            noun,
            args.len()
        ))
        .into());
    }
    if args.len() < required {
        let missing: Vec<String> = code.params[args.len()..required]
            .iter()
            .map(|p| format!("'{}'", p))
            .collect();
        let noun = if missing.len() == 1 { "argument" } else { "arguments" };
        return Err(ScriptError::type_error(format!(
            "{}() missing {} required positional {}: {}",
            code.name,
            missing.len(),
            noun,
            missing.join(", ")
        ))
        .into());
    }

    let mut locals: Vec<Option<Value>> = vec![None; code.locals.len().max(params)];
    for (slot, arg) in args.iter().enumerate() {
        locals[slot] = Some(arg.clone());
    }
    let first_default = params - defaults.len().min(params);
    for slot in args.len()..params {
        locals[slot] = defaults.get(slot - first_default).cloned();
    }
    Ok(locals)
}
