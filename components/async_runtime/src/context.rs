//! Await chain contexts
//!
//! Each unit of source handed to the scheduler runs inside an
//! [`AsyncContext`]. Contexts form a stack while they execute: a nested
//! await pushes its own context and the enclosing one is current again
//! once the nested unit returns control.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use core_types::ScriptResult;
use interpreter::{ObjRef, Vm};

use crate::rewriter::Rewrite;

/// Called once when an await chain finishes
pub type Completion = Box<dyn FnOnce(&mut Vm, ScriptResult<()>)>;

/// One unit of source and the continuation state around it
pub struct AsyncContext {
    /// Scheduler-assigned identifier
    pub id: u64,
    /// Source as submitted
    pub source: String,
    /// Split of the source at its first await
    pub rewrite: Rewrite,
    /// Namespace the unit executes in
    pub module: ObjRef,
    /// Filename used for compiled code
    pub filename: String,
    completion: RefCell<Option<Completion>>,
}

impl AsyncContext {
    /// Create a context that reports to `completion`
    pub fn new(
        id: u64,
        source: &str,
        filename: &str,
        module: ObjRef,
        completion: Completion,
    ) -> Self {
        Self {
            id,
            source: source.to_string(),
            rewrite: Rewrite::parse(source),
            module,
            filename: filename.to_string(),
            completion: RefCell::new(Some(completion)),
        }
    }

    /// Whether the completion callback already ran
    pub fn is_complete(&self) -> bool {
        self.completion.borrow().is_none()
    }

    /// Run the completion callback, at most once
    pub fn complete(&self, vm: &mut Vm, result: ScriptResult<()>) -> bool {
        let completion = self.completion.borrow_mut().take();
        match completion {
            Some(completion) => {
                tracing::trace!(context = self.id, ok = result.is_ok(), "await chain finished");
                completion(vm, result);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for AsyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncContext")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("rewrite", &self.rewrite)
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Contexts currently executing, innermost last
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: RefCell<Vec<Rc<AsyncContext>>>,
}

impl ContextStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `context` current until the returned scope is dropped
    pub fn enter(&self, context: Rc<AsyncContext>) -> ContextScope<'_> {
        let mut frames = self.frames.borrow_mut();
        let depth = frames.len();
        frames.push(context);
        ContextScope { stack: self, depth }
    }

    /// Innermost executing context
    pub fn current(&self) -> Option<Rc<AsyncContext>> {
        self.frames.borrow().last().cloned()
    }

    /// Number of executing contexts
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Restores the enclosing context on drop
#[derive(Debug)]
pub struct ContextScope<'a> {
    stack: &'a ContextStack,
    depth: usize,
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.stack.frames.borrow_mut().truncate(self.depth);
    }
}
