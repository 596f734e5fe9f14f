//! Await support for the embedded script VM
//!
//! This crate provides the async runtime components for the script bridge:
//! - [`Rewrite`] - splits source at its first top-level `await`
//! - [`AsyncTask`] - awaitable handle completed by host futures or generators
//! - [`Scheduler`] - runs await chains on a tokio `LocalSet`
//! - The `asyncio` script module with `sleep` and `AsyncTask`
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use async_runtime::{attach, SchedulerConfig};
//! use interpreter::{Value, Vm};
//!
//! let vm = Rc::new(RefCell::new(Vm::new()));
//! let scheduler = attach(&vm, SchedulerConfig::default());
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! runtime
//!     .block_on(scheduler.run_async(
//!         "import asyncio\nx = await asyncio.sleep(0.001)\ndone = True",
//!         None,
//!     ))
//!     .unwrap();
//!
//! let vm = vm.borrow();
//! assert_eq!(vm.get_global(vm.main_module(), "done"), Some(Value::Bool(true)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::cell::RefCell;
use std::rc::Rc;

use interpreter::Vm;

pub mod asyncio;
pub mod context;
pub mod rewriter;
pub mod scheduler;
pub mod task;

// Re-export main types at crate root
pub use context::{AsyncContext, Completion, ContextScope, ContextStack};
pub use rewriter::{match_await, AwaitLine, Rewrite};
pub use scheduler::{Scheduler, SchedulerConfig, ASYNC_FILENAME, CONTINUATION_FILENAME};
pub use task::{AsyncTask, TaskCallback};

/// Create a scheduler for `vm` and register the `asyncio` module
pub fn attach(vm: &Rc<RefCell<Vm>>, config: SchedulerConfig) -> Scheduler {
    let scheduler = Scheduler::new(vm, config);
    asyncio::register(&mut vm.borrow_mut(), &scheduler);
    scheduler
}
