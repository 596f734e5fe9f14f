//! Heap objects

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use bytecode_system::BytecodeChunk;
use core_types::{ErrorKind, ScriptError};
use memory_manager::{ObjRef, Trace};

use crate::call_frame::CallFrame;
use crate::context::ExecutionContext;
use crate::dict::Dict;
use crate::error::VmResult;
use crate::value::Value;
use crate::vm::Vm;

/// Native entry point
pub type NativeFn = Rc<dyn Fn(&mut Vm, CallFrame) -> VmResult<Value>>;

/// Called with the handle and userdata of a swept instance
pub type Finalizer = Rc<dyn Fn(ObjRef, Box<dyn Any>)>;

/// Attribute table of modules, functions, types and instances
pub type Namespace = HashMap<Rc<str>, Value>;

/// Everything that lives on the VM heap
pub enum Object {
    /// Mutable list
    List(Vec<Value>),
    /// Insertion-ordered dict
    Dict(Dict),
    /// Script function
    Function(FunctionObject),
    /// Host function
    Native(NativeFunction),
    /// Function bound to a receiver
    BoundMethod {
        /// Passed as the first argument
        receiver: Value,
        /// Underlying callable
        function: Value,
    },
    /// Module
    Module(ModuleObject),
    /// Type
    Type(TypeObject),
    /// Instance of a host or builtin type
    Instance(Instance),
    /// Suspended generator
    Generator(GeneratorObject),
    /// Builtin iterator
    Iterator(IteratorState),
    /// Raised or constructed exception
    Exception(ExceptionObject),
    /// Computed attribute
    Property(Property),
    /// Type attribute returned without binding
    StaticMethod(Value),
}

/// Script function
pub struct FunctionObject {
    /// Function name
    pub name: Rc<str>,
    /// Compiled body
    pub code: Rc<BytecodeChunk>,
    /// Values for the trailing parameters
    pub defaults: Vec<Value>,
    /// Module whose namespace holds the globals
    pub module: ObjRef,
    /// Class whose body defined the function; `super()` starts above it
    pub owner: Option<ObjRef>,
    /// `__doc__`, `_signature` and friends
    pub attrs: Namespace,
}

/// Host function
pub struct NativeFunction {
    /// Function name
    pub name: Rc<str>,
    /// Entry point
    pub func: NativeFn,
    /// `__doc__`, `_signature` and friends
    pub attrs: Namespace,
}

/// Module
pub struct ModuleObject {
    /// Import name
    pub name: Rc<str>,
    /// Globals
    pub namespace: Namespace,
}

/// What a type object describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Builtin value type (`int`, `list`, ...)
    Builtin,
    /// Exception class for an [`ErrorKind`]
    Exception(ErrorKind),
    /// `StopIteration`
    StopIteration,
    /// Type registered by the host
    Host,
    /// Class defined by a `class` statement
    Script,
}

/// Type object
pub struct TypeObject {
    /// Type name
    pub name: Rc<str>,
    /// Owning module, if any
    pub module: Option<Rc<str>>,
    /// Base type
    pub base: Option<ObjRef>,
    /// Methods, properties and class attributes
    pub attrs: Namespace,
    /// Kind of type
    pub kind: TypeKind,
    /// Runs when the type object is called
    pub constructor: Option<NativeFn>,
    /// Runs when an instance with userdata is swept
    pub finalizer: Option<Finalizer>,
    /// Extra value slots per instance
    pub slots: usize,
    /// Instances accept arbitrary attributes
    pub has_dict: bool,
}

impl TypeObject {
    /// A type with no attributes
    pub fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: Rc::from(name),
            module: None,
            base: None,
            attrs: Namespace::new(),
            kind,
            constructor: None,
            finalizer: None,
            slots: 0,
            has_dict: false,
        }
    }

    /// `module.Name` or `Name`
    pub fn qualified_name(&self) -> String {
        match &self.module {
            Some(module) => format!("{}.{}", module, self.name),
            None => self.name.to_string(),
        }
    }
}

/// Instance of a host or builtin type
pub struct Instance {
    /// The instance's type
    pub class: ObjRef,
    /// Per-instance attributes (only used when the type has a dict)
    pub attrs: Namespace,
    /// Extra value slots
    pub slots: Vec<Value>,
    /// Opaque host payload
    pub userdata: Option<Box<dyn Any>>,
    /// Copied from the type at allocation
    pub finalizer: Option<Finalizer>,
}

/// Generator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Never resumed
    Created,
    /// Stopped at a `yield`
    Suspended,
    /// Currently on the frame stack
    Running,
    /// Returned or raised
    Finished,
}

/// Generator object
pub struct GeneratorObject {
    /// Name of the generator function
    pub name: Rc<str>,
    /// Lifecycle state
    pub state: GeneratorState,
    /// Saved frame while not running
    pub frame: Option<Box<ExecutionContext>>,
}

/// Builtin iterator state
pub enum IteratorState {
    /// Snapshot of values
    Seq {
        /// Items
        items: Vec<Value>,
        /// Next position
        index: usize,
    },
    /// Live view over a list
    List {
        /// The list
        list: ObjRef,
        /// Next position
        index: usize,
    },
    /// Arithmetic progression
    Range {
        /// Next value
        next: i64,
        /// Exclusive bound
        stop: i64,
        /// Non-zero step
        step: i64,
    },
}

/// Exception instance
pub struct ExceptionObject {
    /// Exception class
    pub class: ObjRef,
    /// Kind, message and traceback
    pub error: ScriptError,
    /// Carried value (`StopIteration.value`, first constructor argument)
    pub value: Value,
}

/// Computed attribute
#[derive(Clone)]
pub struct Property {
    /// Called with the receiver
    pub getter: Option<Value>,
    /// Called with the receiver and the new value
    pub setter: Option<Value>,
    /// Documentation
    pub doc: Option<String>,
}

fn trace_namespace(namespace: &Namespace, out: &mut Vec<ObjRef>) {
    out.extend(namespace.values().filter_map(Value::as_object));
}

fn trace_values<'a>(values: impl IntoIterator<Item = &'a Value>, out: &mut Vec<ObjRef>) {
    out.extend(values.into_iter().filter_map(Value::as_object));
}

impl Trace for Object {
    fn trace(&self, out: &mut Vec<ObjRef>) {
        match self {
            Object::List(items) => trace_values(items, out),
            Object::Dict(dict) => {
                for (k, v) in dict.iter() {
                    trace_values([k, v], out);
                }
            }
            Object::Function(f) => {
                trace_values(&f.defaults, out);
                out.push(f.module);
                out.extend(f.owner);
                trace_namespace(&f.attrs, out);
            }
            Object::Native(f) => trace_namespace(&f.attrs, out),
            Object::BoundMethod { receiver, function } => trace_values([receiver, function], out),
            Object::Module(m) => trace_namespace(&m.namespace, out),
            Object::Type(t) => {
                out.extend(t.base);
                trace_namespace(&t.attrs, out);
            }
            Object::Instance(inst) => {
                out.push(inst.class);
                trace_namespace(&inst.attrs, out);
                trace_values(&inst.slots, out);
            }
            Object::Generator(g) => {
                if let Some(frame) = &g.frame {
                    frame.trace(out);
                }
            }
            Object::Iterator(state) => match state {
                IteratorState::Seq { items, .. } => trace_values(items, out),
                IteratorState::List { list, .. } => out.push(*list),
                IteratorState::Range { .. } => {}
            },
            Object::Exception(e) => {
                out.push(e.class);
                trace_values([&e.value], out);
            }
            Object::Property(p) => trace_values(p.getter.iter().chain(p.setter.iter()), out),
            Object::StaticMethod(v) => trace_values([v], out),
        }
    }
}

impl Object {
    /// Short description used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::List(_) => "list",
            Object::Dict(_) => "dict",
            Object::Function(_) => "function",
            Object::Native(_) => "builtin_function_or_method",
            Object::BoundMethod { .. } => "method",
            Object::Module(_) => "module",
            Object::Type(_) => "type",
            Object::Instance(_) => "object",
            Object::Generator(_) => "generator",
            Object::Iterator(_) => "iterator",
            Object::Exception(_) => "exception",
            Object::Property(_) => "property",
            Object::StaticMethod(_) => "staticmethod",
        }
    }
}
