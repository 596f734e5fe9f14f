//! Await scheduler
//!
//! Drives await chains on a tokio [`LocalSet`]. The VM is shared as
//! `Rc<RefCell<Vm>>`; spawned work borrows it only for the short, synchronous
//! steps where it touches script state, so host futures run between steps
//! without holding the interpreter.
//!
//! A unit of source is split at its first await. The prefix runs at once,
//! the awaited value is resolved to an [`AsyncTask`], and the continuation
//! is queued on that task. When the task finishes the result is bound and
//! the continuation is run through the same procedure, so chains of awaits
//! unroll one step at a time.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use bridge::{materialize, HostResult, IntoScript};
use core_types::{ScriptError, ScriptResult};
use interpreter::{CompileMode, IterStep, ObjRef, Pinned, Value, Vm};
use tokio::sync::{oneshot, Notify};
use tokio::task::{AbortHandle, LocalSet};

use crate::context::{AsyncContext, Completion, ContextStack};
use crate::task::{AsyncTask, TaskCallback};

/// Filename for the first unit of an await chain
pub const ASYNC_FILENAME: &str = "<async>";

/// Filename for continuations
pub const CONTINUATION_FILENAME: &str = "<async_continuation>";

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between polls of a generator-backed task
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl SchedulerConfig {
    /// Override the generator poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

struct Shared {
    vm: Weak<RefCell<Vm>>,
    config: SchedulerConfig,
    local: LocalSet,
    contexts: ContextStack,
    next_context: Cell<u64>,
    pending: Cell<usize>,
    idle: Notify,
}

/// Decrements the pending count when a spawned future ends or is aborted
struct PendingGuard(Weak<Shared>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(shared) = self.0.upgrade() {
            shared.pending.set(shared.pending.get().saturating_sub(1));
            shared.idle.notify_one();
        }
    }
}

/// Runs await chains for one VM
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    shared: Rc<Shared>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.shared.config)
            .field("pending", &self.shared.pending.get())
            .field("depth", &self.shared.contexts.depth())
            .finish()
    }
}

/// Borrow the VM for one synchronous step, yielding while it is busy
///
/// Returns `None` once the VM has been dropped.
async fn with_vm<R>(vm: &Weak<RefCell<Vm>>, f: impl FnOnce(&mut Vm) -> R) -> Option<R> {
    loop {
        let cell = vm.upgrade()?;
        if let Ok(mut guard) = cell.try_borrow_mut() {
            return Some(f(&mut guard));
        }
        drop(cell);
        tokio::task::yield_now().await;
    }
}

impl Scheduler {
    /// Create a scheduler for `vm` and install it as a VM extension
    pub fn new(vm: &Rc<RefCell<Vm>>, config: SchedulerConfig) -> Self {
        let scheduler = Scheduler {
            shared: Rc::new(Shared {
                vm: Rc::downgrade(vm),
                config,
                local: LocalSet::new(),
                contexts: ContextStack::new(),
                next_context: Cell::new(1),
                pending: Cell::new(0),
                idle: Notify::new(),
            }),
        };
        vm.borrow_mut().set_extension(scheduler.clone());
        tracing::debug!(poll_interval = ?scheduler.shared.config.poll_interval, "scheduler attached");
        scheduler
    }

    /// The scheduler installed on `vm`, if any
    pub fn of(vm: &Vm) -> Option<Scheduler> {
        vm.extension::<Scheduler>().cloned()
    }

    /// Current configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Executing await contexts
    pub fn contexts(&self) -> &ContextStack {
        &self.shared.contexts
    }

    /// Innermost executing context
    pub fn current_context(&self) -> Option<Rc<AsyncContext>> {
        self.shared.contexts.current()
    }

    /// Spawned futures that have not finished
    pub fn pending(&self) -> usize {
        self.shared.pending.get()
    }

    /// Whether both handles refer to the same scheduler
    pub fn ptr_eq(&self, other: &Scheduler) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    fn vm(&self) -> ScriptResult<Rc<RefCell<Vm>>> {
        self.shared
            .vm
            .upgrade()
            .ok_or_else(|| ScriptError::runtime_error("interpreter was dropped"))
    }

    fn next_id(&self) -> u64 {
        let id = self.shared.next_context.get();
        self.shared.next_context.set(id + 1);
        id
    }

    fn spawn_local<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + 'static,
    {
        self.shared.pending.set(self.shared.pending.get() + 1);
        let guard = PendingGuard(Rc::downgrade(&self.shared));
        let handle = self.shared.local.spawn_local(async move {
            let _guard = guard;
            future.await;
        });
        handle.abort_handle()
    }

    /// Run a host future as a task
    ///
    /// The future starts the next time the scheduler is driven. Its output
    /// is converted into a script value in the VM when it completes.
    pub fn spawn<F, R>(&self, future: F) -> Rc<AsyncTask>
    where
        F: Future<Output = HostResult<R>> + 'static,
        R: IntoScript + 'static,
    {
        let task = AsyncTask::new();
        let target = Rc::clone(&task);
        let vm = self.shared.vm.clone();
        let abort = self.spawn_local(async move {
            let outcome = future.await;
            with_vm(&vm, move |vm| {
                let result = outcome
                    .map_err(|e| e.into_vm_error().into_script_error())
                    .and_then(|value| value.into_script(vm));
                target.complete(vm, result);
            })
            .await;
        });
        task.set_abort(abort);
        task
    }

    /// Wrap a script generator as a task
    ///
    /// The generator is advanced once per poll interval; yielded values are
    /// kept as the task's interim value and its return value becomes the
    /// result.
    pub fn spawn_generator(&self, iterable: Pinned) -> Rc<AsyncTask> {
        let task = AsyncTask::new();
        let target = Rc::clone(&task);
        let vm = self.shared.vm.clone();
        let interval = self.shared.config.poll_interval;
        let abort = self.spawn_local(async move {
            let iterator = with_vm(&vm, |vm| match vm.get_iter(iterable.value()) {
                Ok(iterator) => Some(vm.pin(iterator)),
                Err(e) => {
                    target.complete(vm, Err(e.into_script_error()));
                    None
                }
            })
            .await
            .flatten();
            let Some(iterator) = iterator else {
                return;
            };
            loop {
                let finished = with_vm(&vm, |vm| match vm.iter_next(iterator.value()) {
                    Ok(IterStep::Item(value)) => {
                        target.set_interim(vm, value);
                        false
                    }
                    Ok(IterStep::Done(value)) => {
                        target.complete(vm, Ok(value));
                        true
                    }
                    Err(e) => {
                        target.complete(vm, Err(e.into_script_error()));
                        true
                    }
                })
                .await;
                match finished {
                    Some(false) => tokio::time::sleep(interval).await,
                    _ => return,
                }
            }
        });
        task.set_abort(abort);
        task
    }

    /// Resolve an awaited value to a task
    ///
    /// Tasks are used as they are; generators are wrapped with
    /// [`Scheduler::spawn_generator`].
    pub fn task_for(&self, vm: &mut Vm, value: &Value) -> ScriptResult<Rc<AsyncTask>> {
        if let Some(task) = materialize::<AsyncTask>(vm, value) {
            return Ok(task);
        }
        if vm.is_generator(value) {
            return Ok(self.spawn_generator(vm.pin(value.clone())));
        }
        Err(ScriptError::type_error(format!(
            "object of type '{}' can't be awaited",
            vm.type_name(value)
        )))
    }

    /// Run `source` in `module`, calling `completion` when its await chain ends
    ///
    /// Code before the first await runs before this returns. A failure in
    /// that code completes the chain with the error and the continuation
    /// never runs.
    pub fn run<F>(&self, vm: &mut Vm, source: &str, module: ObjRef, completion: F)
    where
        F: FnOnce(&mut Vm, ScriptResult<()>) + 'static,
    {
        self.run_unit(vm, source, ASYNC_FILENAME, module, Box::new(completion));
    }

    fn run_unit(&self, vm: &mut Vm, source: &str, filename: &str, module: ObjRef, completion: Completion) {
        let context = Rc::new(AsyncContext::new(self.next_id(), source, filename, module, completion));
        let _scope = self.shared.contexts.enter(Rc::clone(&context));
        tracing::debug!(
            context = context.id,
            awaits = context.rewrite.is_match(),
            depth = self.shared.contexts.depth(),
            "running async unit"
        );

        match self.start(vm, &context) {
            Ok(Some(task)) => self.await_task(task, context),
            Ok(None) => {
                context.complete(vm, Ok(()));
            }
            Err(e) => {
                tracing::debug!(context = context.id, error = %e.summary(), "async prefix failed");
                context.complete(vm, Err(e));
            }
        }
    }

    fn start(&self, vm: &mut Vm, context: &AsyncContext) -> ScriptResult<Option<Rc<AsyncTask>>> {
        let rewrite = &context.rewrite;
        if !rewrite.preamble.trim().is_empty() {
            vm.compile_exec(&rewrite.preamble, &context.filename, CompileMode::Exec, context.module)?;
        }
        let Some(call) = &rewrite.call else {
            return Ok(None);
        };
        let awaited = vm.compile_exec(call, &context.filename, CompileMode::Eval, context.module)?;
        self.task_for(vm, &awaited).map(Some)
    }

    fn await_task(&self, task: Rc<AsyncTask>, context: Rc<AsyncContext>) {
        let scheduler = self.clone();
        let callback: TaskCallback = Box::new(move |vm, outcome| scheduler.resume(vm, &context, outcome));
        let Some(callback) = task.subscribe(callback) else {
            return;
        };
        // Already finished: resume on the next turn of the scheduler.
        let Some(outcome) = task.outcome() else {
            return;
        };
        let vm = self.shared.vm.clone();
        self.spawn_local(async move {
            with_vm(&vm, move |vm| callback(vm, outcome)).await;
        });
    }

    fn resume(&self, vm: &mut Vm, context: &Rc<AsyncContext>, outcome: ScriptResult<Value>) {
        let _scope = self.shared.contexts.enter(Rc::clone(context));
        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(context = context.id, error = %e.summary(), "awaited task failed");
                vm.report_error(&e);
                Value::None
            }
        };
        if let Some(name) = &context.rewrite.result_name {
            vm.set_global(context.module, name, value);
        }

        match &context.rewrite.continuation {
            Some(continuation) => {
                let outer = Rc::clone(context);
                self.run_unit(
                    vm,
                    continuation,
                    CONTINUATION_FILENAME,
                    context.module,
                    Box::new(move |vm, result| {
                        outer.complete(vm, result);
                    }),
                );
            }
            None => {
                context.complete(vm, Ok(()));
            }
        }
    }

    /// Run `source` and wait for its whole await chain
    ///
    /// `module` defaults to the main module. Must be awaited from outside
    /// the scheduler's own tasks.
    pub async fn run_async(&self, source: &str, module: Option<ObjRef>) -> ScriptResult<()> {
        let (sender, receiver) = oneshot::channel();
        {
            let cell = self.vm()?;
            let mut vm = cell
                .try_borrow_mut()
                .map_err(|_| ScriptError::runtime_error("interpreter is busy"))?;
            let module = module.unwrap_or_else(|| vm.main_module());
            self.run(&mut vm, source, module, move |_, result| {
                let _ = sender.send(result);
            });
        }
        match self.shared.local.run_until(receiver).await {
            Ok(result) => result,
            Err(_) => Err(ScriptError::runtime_error("await chain was cancelled")),
        }
    }

    /// Drive spawned work until nothing is pending
    pub async fn run_until_idle(&self) {
        let shared = Rc::clone(&self.shared);
        self.shared
            .local
            .run_until(async move {
                while shared.pending.get() > 0 {
                    shared.idle.notified().await;
                }
            })
            .await
    }

    /// Drive spawned work while awaiting `future`
    pub async fn drive<F: Future>(&self, future: F) -> F::Output {
        self.shared.local.run_until(future).await
    }
}
