//! Contract tests for await chains
//!
//! Prefix before continuation, results bound by name, generator delegation,
//! and tasks that never report once cancelled.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use async_runtime::{attach, AsyncTask, Scheduler, SchedulerConfig};
use bridge::{HostError, HostResult, ModuleBuilder};
use core_types::ErrorKind;
use interpreter::{CaptureSink, Value, Vm};

struct Harness {
    vm: Rc<RefCell<Vm>>,
    scheduler: Scheduler,
    sink: Rc<CaptureSink>,
}

impl Harness {
    fn new() -> Self {
        let vm = Rc::new(RefCell::new(Vm::new()));
        let sink = Rc::new(CaptureSink::new());
        vm.borrow_mut().set_output(sink.clone());
        let scheduler = attach(&vm, SchedulerConfig::default());
        Harness { vm, scheduler, sink }
    }

    /// Bind `name(...)` in the main module as a host async function
    fn bind(&self, build: impl FnOnce(&mut ModuleBuilder<'_>, Scheduler)) {
        let mut vm = self.vm.borrow_mut();
        let main = vm.main_module();
        let mut module = ModuleBuilder::attach(&mut vm, "__main__", main);
        build(&mut module, self.scheduler.clone());
    }

    fn bind_constant(&self, name: &str, value: i64) {
        self.bind(|m, scheduler| {
            m.function(&format!("{}() -> AsyncTask", name), move || -> HostResult<Rc<AsyncTask>> {
                Ok(scheduler.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok::<_, HostError>(value)
                }))
            })
            .unwrap();
        });
    }

    fn bind_adder(&self) {
        self.bind(|m, scheduler| {
            m.function("f(a: int, b: int) -> AsyncTask", move |a: i64, b: i64| -> HostResult<Rc<AsyncTask>> {
                Ok(scheduler.spawn(async move { Ok::<_, HostError>(a + b) }))
            })
            .unwrap();
        });
    }

    fn global(&self, name: &str) -> Option<Value> {
        let vm = self.vm.borrow();
        vm.get_global(vm.main_module(), name)
    }
}

/// The result of the awaited call is bound before the continuation runs
#[tokio::test]
async fn test_await_binds_result_contract() {
    let h = Harness::new();
    h.bind_adder();
    h.scheduler
        .run_async("result = await f(1, 2)\nprint(result)", None)
        .await
        .unwrap();
    assert_eq!(h.sink.stdout_text(), "3\n");
    assert_eq!(h.global("result"), Some(Value::Int(3)));
}

/// Generator coroutines delegate to host tasks with `yield from`
#[tokio::test]
async fn test_await_chaining_contract() {
    let h = Harness::new();
    h.bind_constant("f1", 3);
    h.bind_constant("f2", 4);
    h.scheduler
        .run_async(
            "def main():\n    a = yield from f1()\n    b = yield from f2()\n    return a * b\n\nresult = await main()",
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.global("result"), Some(Value::Int(12)));
}

/// Wrapping a generator explicitly gives the same result
#[tokio::test]
async fn test_explicit_generator_task_contract() {
    let h = Harness::new();
    h.bind_constant("f1", 3);
    h.bind_constant("f2", 4);
    h.scheduler
        .run_async(
            "from asyncio import AsyncTask\ndef main():\n    a = yield from f1()\n    b = yield from f2()\n    return a * b\n\nresult = await AsyncTask(main())",
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.global("result"), Some(Value::Int(12)));
}

/// Source without an await completes before `run` returns
#[tokio::test]
async fn test_no_match_passthrough_contract() {
    let h = Harness::new();
    let completed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&completed);
    {
        let mut vm = h.vm.borrow_mut();
        let main = vm.main_module();
        h.scheduler.run(&mut vm, "print('sync')\nvalue = 7", main, move |_, result| {
            assert!(result.is_ok());
            flag.set(true);
        });
    }
    assert!(completed.get());
    assert_eq!(h.sink.stdout_text(), "sync\n");
    assert_eq!(h.global("value"), Some(Value::Int(7)));
    assert_eq!(h.scheduler.pending(), 0);
}

/// A cancelled task never sets its result and never resumes its awaiter
#[tokio::test]
async fn test_cancellation_contract() {
    let h = Harness::new();
    let created: Rc<RefCell<Option<Rc<AsyncTask>>>> = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&created);
    h.bind(|m, scheduler| {
        m.function("slow() -> AsyncTask", move || -> HostResult<Rc<AsyncTask>> {
            let task = scheduler.spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, HostError>(1i64)
            });
            *slot.borrow_mut() = Some(Rc::clone(&task));
            Ok(task)
        })
        .unwrap();
    });

    let completed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&completed);
    {
        let mut vm = h.vm.borrow_mut();
        let main = vm.main_module();
        h.scheduler.run(&mut vm, "r = await slow()\nreached = True", main, move |_, _| {
            flag.set(true);
        });
    }
    let task = created.borrow().clone().unwrap();
    assert!(task.is_pending());
    assert!(task.cancel());
    h.scheduler.run_until_idle().await;

    assert!(task.is_cancelled());
    assert_eq!(task.result(), None);
    assert!(!completed.get());
    assert_eq!(h.global("reached"), None);
    assert_eq!(h.scheduler.pending(), 0);
}

/// Awaiting a task that was already cancelled abandons the chain
#[tokio::test]
async fn test_await_cancelled_task_contract() {
    let h = Harness::new();
    h.bind(|m, scheduler| {
        m.function("doomed() -> AsyncTask", move || -> HostResult<Rc<AsyncTask>> {
            let task = scheduler.spawn(async { Ok::<_, HostError>(()) });
            task.cancel();
            Ok(task)
        })
        .unwrap();
    });
    let err = h
        .scheduler
        .run_async("await doomed()\nreached = True", None)
        .await
        .unwrap_err();
    assert_eq!(err.message, "await chain was cancelled");
    assert_eq!(h.global("reached"), None);
}

/// A host failure is reported, binds None and the continuation still runs
#[tokio::test]
async fn test_host_failure_binds_none_contract() {
    let h = Harness::new();
    h.bind(|m, scheduler| {
        m.function("failing() -> AsyncTask", move || -> HostResult<Rc<AsyncTask>> {
            Ok(scheduler.spawn(async {
                Err::<i64, _>(HostError::script(ErrorKind::ValueError, "boom"))
            }))
        })
        .unwrap();
    });
    h.scheduler
        .run_async("r = 1\nr = await failing()\nafter = r is None", None)
        .await
        .unwrap();
    assert_eq!(h.global("after"), Some(Value::Bool(true)));
    assert!(h.sink.stderr_text().contains("ValueError: boom"));
}

/// A generator that raises is treated like a failing host task
#[tokio::test]
async fn test_generator_failure_contract() {
    let h = Harness::new();
    h.scheduler
        .run_async(
            "def g():\n    yield 1\n    raise KeyError('missing')\n\nr = await g()\nafter = r is None",
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.global("after"), Some(Value::Bool(true)));
    assert!(h.sink.stderr_text().contains("KeyError"));
}

/// A failing prefix completes with its error and skips the continuation
#[tokio::test]
async fn test_prefix_failure_contract() {
    let h = Harness::new();
    h.bind_adder();
    let err = h
        .scheduler
        .run_async("x = undefined_name\nr = await f(1, 2)\nreached = True", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameError);
    assert_eq!(h.global("r"), None);
    assert_eq!(h.global("reached"), None);
}

/// Awaits in a continuation unroll one at a time and restore the context stack
#[tokio::test]
async fn test_nested_awaits_contract() {
    let h = Harness::new();
    h.bind_adder();
    h.scheduler
        .run_async("a = await f(1, 2)\nb = await f(a, 10)\ntotal = a + b", None)
        .await
        .unwrap();
    assert_eq!(h.global("total"), Some(Value::Int(16)));
    assert_eq!(h.scheduler.contexts().depth(), 0);
}

/// Names bound by one chain are visible to the next
#[tokio::test]
async fn test_sequential_chains_contract() {
    let h = Harness::new();
    h.bind_constant("answer", 42);
    h.scheduler.run_async("result = await answer()", None).await.unwrap();
    h.scheduler.run_async("new_result = result + 3", None).await.unwrap();
    assert_eq!(h.global("new_result"), Some(Value::Int(45)));
}

/// A script-assigned `resume` callable receives the result
#[tokio::test]
async fn test_resume_callback_contract() {
    let h = Harness::new();
    h.bind_adder();
    h.scheduler
        .run_async(
            "seen = []\ndef callback(result):\n    seen.append(result)\ntask = f(20, 22)\ntask.resume = callback",
            None,
        )
        .await
        .unwrap();
    h.scheduler.run_until_idle().await;
    let seen = h.global("seen").unwrap();
    assert_eq!(h.vm.borrow().list_items(&seen), Some(vec![Value::Int(42)]));
}

/// Plain yields keep the generator polling until it returns
#[tokio::test]
async fn test_generator_yields_until_return_contract() {
    let h = Harness::new();
    h.bind_constant("tick", 0);
    h.scheduler
        .run_async(
            "from asyncio import AsyncTask\ndef steps():\n    yield 'first'\n    yield from tick()\n    return 'last'\n\nr = await AsyncTask(steps())",
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.global("r"), Some(Value::str("last")));
}
