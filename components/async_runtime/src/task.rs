//! Awaitable task handles
//!
//! An [`AsyncTask`] is the value a script awaits. It starts pending and
//! moves exactly once to done (with a result or an error) or to cancelled.
//! Host code completes it from a spawned future; a generator-backed task is
//! completed by the scheduler when the generator is exhausted.
//!
//! On completion the task first calls a script-assigned `resume` attribute
//! with the result, then the await callbacks registered by the scheduler.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use bridge::{BridgeCache, BridgeResult, Bridged, HostError, HostResult, TypeBuilder};
use core_types::{ErrorKind, ScriptError, ScriptResult};
use interpreter::{Pinned, Value, Vm};
use tokio::task::AbortHandle;

use crate::scheduler::Scheduler;

/// Invoked with the task's outcome when it finishes
pub type TaskCallback = Box<dyn FnOnce(&mut Vm, ScriptResult<Value>)>;

enum Status {
    Pending,
    Done(Result<Pinned, ScriptError>),
    Cancelled,
}

struct TaskState {
    status: Status,
    interim: Option<Pinned>,
    abort: Option<AbortHandle>,
    callbacks: Vec<TaskCallback>,
}

/// Handle to one in-flight host operation
pub struct AsyncTask {
    cache: BridgeCache,
    this: Weak<AsyncTask>,
    state: RefCell<TaskState>,
}

impl AsyncTask {
    /// Create a pending task with no work attached
    ///
    /// The task finishes only through [`AsyncTask::complete`] or
    /// [`AsyncTask::cancel`].
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| AsyncTask {
            cache: BridgeCache::new(),
            this: this.clone(),
            state: RefCell::new(TaskState {
                status: Status::Pending,
                interim: None,
                abort: None,
                callbacks: Vec::new(),
            }),
        })
    }

    /// Neither done nor cancelled
    pub fn is_pending(&self) -> bool {
        matches!(self.state.borrow().status, Status::Pending)
    }

    /// Finished with a result or an error
    pub fn is_done(&self) -> bool {
        matches!(self.state.borrow().status, Status::Done(_))
    }

    /// Cancelled before finishing
    pub fn is_cancelled(&self) -> bool {
        matches!(self.state.borrow().status, Status::Cancelled)
    }

    /// Successful result, once done
    pub fn result(&self) -> Option<Value> {
        match &self.state.borrow().status {
            Status::Done(Ok(pin)) => Some(pin.value().clone()),
            _ => None,
        }
    }

    /// Failure, once done
    pub fn error(&self) -> Option<ScriptError> {
        match &self.state.borrow().status {
            Status::Done(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Outcome of a finished task
    pub fn outcome(&self) -> Option<ScriptResult<Value>> {
        match &self.state.borrow().status {
            Status::Done(Ok(pin)) => Some(Ok(pin.value().clone())),
            Status::Done(Err(e)) => Some(Err(e.clone())),
            _ => None,
        }
    }

    /// Last value yielded by a backing generator
    pub fn interim(&self) -> Option<Value> {
        self.state.borrow().interim.as_ref().map(|pin| pin.value().clone())
    }

    /// Record a value yielded while still pending
    pub fn set_interim(&self, vm: &Vm, value: Value) {
        let pin = vm.pin(value);
        self.state.borrow_mut().interim = Some(pin);
    }

    pub(crate) fn set_abort(&self, handle: AbortHandle) {
        let mut state = self.state.borrow_mut();
        if matches!(state.status, Status::Pending) {
            state.abort = Some(handle);
        } else if matches!(state.status, Status::Cancelled) {
            handle.abort();
        }
    }

    /// Finish the task with `outcome`
    ///
    /// Returns false when the task already finished or was cancelled.
    pub fn complete(&self, vm: &mut Vm, outcome: ScriptResult<Value>) -> bool {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if !matches!(state.status, Status::Pending) {
                return false;
            }
            state.status = Status::Done(outcome.clone().map(|value| vm.pin(value)));
            state.abort = None;
            std::mem::take(&mut state.callbacks)
        };
        tracing::debug!(ok = outcome.is_ok(), callbacks = callbacks.len(), "task finished");

        self.notify_resume(vm, &outcome);
        for callback in callbacks {
            callback(vm, outcome.clone());
        }
        true
    }

    /// Stop the task and drop its pending callbacks
    ///
    /// Returns false when the task already finished.
    pub fn cancel(&self) -> bool {
        let (abort, callbacks) = {
            let mut state = self.state.borrow_mut();
            if !matches!(state.status, Status::Pending) {
                return false;
            }
            state.status = Status::Cancelled;
            (state.abort.take(), std::mem::take(&mut state.callbacks))
        };
        if let Some(abort) = abort {
            abort.abort();
        }
        tracing::debug!(dropped = callbacks.len(), "task cancelled");
        drop(callbacks);
        true
    }

    /// Run `callback` when the task finishes
    ///
    /// A finished task hands the callback back so the caller can schedule
    /// it. A cancelled task drops it.
    pub fn subscribe(&self, callback: TaskCallback) -> Option<TaskCallback> {
        let mut state = self.state.borrow_mut();
        match state.status {
            Status::Pending => {
                state.callbacks.push(callback);
                None
            }
            Status::Done(_) => Some(callback),
            Status::Cancelled => None,
        }
    }

    fn notify_resume(&self, vm: &mut Vm, outcome: &ScriptResult<Value>) {
        let Some(handle) = self.cache.get(vm.id()) else {
            return;
        };
        if !vm.is_live(handle) {
            return;
        }
        let instance = Value::Object(handle);
        let callback = match vm.get_attr(&instance, "resume") {
            Ok(callback) if vm.is_callable(&callback) => callback,
            _ => return,
        };
        let argument = outcome.as_ref().map(Value::clone).unwrap_or(Value::None);
        if let Err(e) = vm.call(&callback, &[argument]) {
            let error = e.into_script_error();
            tracing::warn!(error = %error.summary(), "resume callback raised");
            vm.report_error(&error);
        }
    }

    /// One step of the iterator protocol
    fn step(&self) -> HostResult<Value> {
        match &self.state.borrow().status {
            Status::Pending => Ok(Value::None),
            Status::Done(Ok(pin)) => Err(HostError::Exhausted(pin.value().clone())),
            Status::Done(Err(e)) => Err(HostError::from(e.clone())),
            Status::Cancelled => Err(HostError::script(ErrorKind::RuntimeError, "task was cancelled")),
        }
    }

    fn status_name(&self) -> &'static str {
        match self.state.borrow().status {
            Status::Pending => "pending",
            Status::Done(Ok(_)) => "done",
            Status::Done(Err(_)) => "failed",
            Status::Cancelled => "cancelled",
        }
    }
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("status", &self.status_name())
            .field("callbacks", &self.state.borrow().callbacks.len())
            .finish()
    }
}

impl Bridged for AsyncTask {
    const TYPE_NAME: &'static str = "AsyncTask";

    fn bridge_cache(&self) -> &BridgeCache {
        &self.cache
    }

    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        ty.doc("Handle to one in-flight host operation.\n\nAwaiting a task suspends the awaiting code until the task finishes.")
            .module("asyncio")
            .dynamic_attrs();

        let scheduler = Scheduler::of(ty.vm());
        ty.constructor(
            "AsyncTask(generator: object) -> AsyncTask\nPoll `generator` until it is exhausted; its return value is the result.",
            move |generator: Pinned| -> HostResult<Rc<AsyncTask>> {
                let scheduler = scheduler.as_ref().ok_or_else(|| {
                    HostError::script(ErrorKind::RuntimeError, "no scheduler is attached to this interpreter")
                })?;
                Ok(scheduler.spawn_generator(generator))
            },
        )?;
        ty.property("is_done -> bool", |t: &AsyncTask| -> HostResult<bool> { Ok(t.is_done()) })?;
        ty.property("is_cancelled -> bool", |t: &AsyncTask| -> HostResult<bool> { Ok(t.is_cancelled()) })?;
        ty.property("result -> object\nResult once done, otherwise None.", |t: &AsyncTask| -> HostResult<Value> {
            Ok(t.result().unwrap_or(Value::None))
        })?;
        ty.property("value -> object\nLast value yielded by the backing generator.", |t: &AsyncTask| -> HostResult<Value> {
            Ok(t.interim().unwrap_or(Value::None))
        })?;
        ty.property("error -> Optional[str]", |t: &AsyncTask| -> HostResult<Option<String>> {
            Ok(t.error().map(|e| e.summary()))
        })?;
        ty.method("cancel(self) -> bool\nCancel the task; False if it already finished.", |t: &AsyncTask| -> HostResult<bool> {
            Ok(t.cancel())
        })?;
        ty.method("__iter__(self) -> AsyncTask", |t: &AsyncTask| -> HostResult<Rc<AsyncTask>> {
            t.this.upgrade().ok_or_else(|| HostError::msg("task was released"))
        })?;
        ty.method("__next__(self) -> object", |t: &AsyncTask| -> HostResult<Value> { t.step() })?;
        ty.method("__repr__(self) -> str", |t: &AsyncTask| -> HostResult<String> {
            Ok(format!("<AsyncTask {}>", t.status_name()))
        })?;
        Ok(())
    }
}
