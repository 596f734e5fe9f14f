//! Bytecode interpreter for the embedded script dialect
//!
//! This crate provides a stack-based virtual machine with:
//! - Module namespaces, builtins and a lazy module importer
//! - Generators with `send` and `yield from` delegation
//! - `try`/`except` unwinding with Python-style tracebacks
//! - A mark/sweep heap with persistent pins for host-held values
//! - A host API (value stack, registers, calls, attributes) for bridges
//!
//! # Example
//!
//! ```
//! use interpreter::{CompileMode, Value, Vm};
//!
//! let mut vm = Vm::new();
//! let main = vm.main_module();
//!
//! vm.compile_exec("def add(a, b=2):\n    return a + b\n", "<doc>", CompileMode::Exec, main)
//!     .unwrap();
//! let result = vm.compile_exec("add(40)", "<doc>", CompileMode::Eval, main).unwrap();
//! assert_eq!(result, Value::Int(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod config;
pub mod context;
pub mod dict;
pub mod error;
pub mod gc_integration;
pub mod import;
pub mod iteration;
pub mod object;
pub mod output;
pub mod value;
pub mod vm;

mod builtins;
mod dispatch;
mod ops;
mod protocol;

// Re-export main types at crate root
pub use call_frame::CallFrame;
pub use config::VmConfig;
pub use context::{ExecutionContext, Handler};
pub use dict::Dict;
pub use error::{VmError, VmResult};
pub use gc_integration::Pinned;
pub use import::{ImportHook, ModuleInit};
pub use iteration::{GeneratorStep, IterStep};
pub use object::{
    Finalizer, Namespace, NativeFn, Object, Property, TypeKind, TypeObject,
};
pub use output::{CaptureSink, OutputSink, StdioSink, TracingSink};
pub use value::{HashKey, Value};
pub use vm::{BuiltinTypes, StackGuard, Vm, REGISTER_COUNT};

pub use memory_manager::{GcStats, ObjRef};
pub use parser::CompileMode;
