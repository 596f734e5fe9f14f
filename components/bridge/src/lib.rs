//! Host bridge for the embedded script VM
//!
//! This crate provides:
//! - A value codec between Rust types and script values
//! - Identity-preserving exposure of `Rc`-held host objects
//! - Signature-checked native entry points for host closures
//! - Type descriptors and native module builders
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use bridge::{register_module, BridgeCache, BridgeResult, Bridged, HostResult, TypeBuilder};
//! use interpreter::{CompileMode, Value, Vm};
//!
//! #[derive(Default)]
//! struct Counter {
//!     cache: BridgeCache,
//!     count: Cell<i64>,
//! }
//!
//! impl Bridged for Counter {
//!     const TYPE_NAME: &'static str = "Counter";
//!
//!     fn bridge_cache(&self) -> &BridgeCache {
//!         &self.cache
//!     }
//!
//!     fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
//!         ty.constructor("Counter()", || -> HostResult<Rc<Counter>> { Ok(Rc::new(Counter::default())) })?;
//!         ty.method("incr(self, by: int = 1) -> int", |c: &Counter, by: i64| -> HostResult<i64> {
//!             c.count.set(c.count.get() + by);
//!             Ok(c.count.get())
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let mut vm = Vm::new();
//! register_module(&mut vm, "counters", |m| {
//!     m.class::<Counter>()?;
//!     Ok(())
//! });
//!
//! let main = vm.main_module();
//! vm.compile_exec("from counters import Counter\nc = Counter()\nc.incr()\n", "<doc>", CompileMode::Exec, main)
//!     .unwrap();
//! assert_eq!(vm.compile_exec("c.incr(2)", "<doc>", CompileMode::Eval, main).unwrap(), Value::Int(3));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod module;
pub mod object;
pub mod signature;

// Re-export main types at crate root
pub use call::{Bound, CallError, HostFn, HostMethod};
pub use codec::{ByteBuf, Dynamic, FromScript, IntoScript, ScriptKey, ScriptType};
pub use descriptor::{
    descriptor, register, register_in, type_handle, Operation, OperationKind, TypeBuilder,
    TypeDescriptor, TypeRegistry,
};
pub use error::{BridgeError, BridgeResult, HostError, HostResult};
pub use module::{register_module, ModuleBuilder};
pub use object::{expose, materialize, BridgeCache, Bridged};
pub use signature::{Literal, Param, Signature, SignatureError};
