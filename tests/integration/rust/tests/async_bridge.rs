//! Async Bridge Integration Tests
//!
//! Host modules built with the bridge hand out tasks from the scheduler and
//! scripts await them with top-level await.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use async_runtime::{AsyncTask, Scheduler, SchedulerConfig};
use bridge::{BridgeCache, BridgeResult, Bridged, HostError, HostResult, TypeBuilder};
use core_types::ErrorKind;
use interpreter::{CaptureSink, Vm};

#[derive(Default)]
struct Sensor {
    cache: BridgeCache,
    reading: Cell<i64>,
}

impl Bridged for Sensor {
    const TYPE_NAME: &'static str = "Sensor";

    fn bridge_cache(&self) -> &BridgeCache {
        &self.cache
    }

    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        ty.doc("A polled sensor.");
        ty.property("reading -> int", |s: &Sensor| -> HostResult<i64> { Ok(s.reading.get()) })?;
        ty.method("scaled(self, factor: int) -> int", |s: &Sensor, factor: i64| -> HostResult<i64> {
            Ok(s.reading.get() * factor)
        })?;
        Ok(())
    }
}

struct Setup {
    vm: Rc<RefCell<Vm>>,
    scheduler: Scheduler,
    sink: Rc<CaptureSink>,
}

fn setup() -> Setup {
    let vm = Rc::new(RefCell::new(Vm::new()));
    let sink = Rc::new(CaptureSink::new());
    vm.borrow_mut().set_output(sink.clone());
    let scheduler = async_runtime::attach(&vm, SchedulerConfig::default().with_poll_interval(Duration::from_millis(1)));

    let spawner = scheduler.clone();
    bridge::register_module(&mut vm.borrow_mut(), "devices", move |m| {
        m.class::<Sensor>()?;
        let scheduler = spawner.clone();
        m.function("poll(reading: int) -> AsyncTask", move |reading: i64| -> HostResult<Rc<AsyncTask>> {
            Ok(scheduler.spawn(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                let sensor = Sensor::default();
                sensor.reading.set(reading);
                Ok::<_, HostError>(Rc::new(sensor))
            }))
        })?;
        let scheduler = spawner.clone();
        m.function("offline() -> AsyncTask", move || -> HostResult<Rc<AsyncTask>> {
            Ok(scheduler.spawn(async move {
                Err::<i64, _>(HostError::script(ErrorKind::OSError, "sensor offline"))
            }))
        })?;
        Ok(())
    });

    Setup { vm, scheduler, sink }
}

#[tokio::test]
async fn test_awaited_host_object_is_usable() {
    let s = setup();
    s.scheduler
        .run_async(
            "import devices\nsensor = await devices.poll(21)\nprint(sensor.reading, sensor.scaled(2))",
            None,
        )
        .await
        .unwrap();
    assert_eq!(s.sink.stdout_text(), "21 42\n");
    assert_eq!(s.scheduler.pending(), 0);
}

#[tokio::test]
async fn test_generator_delegates_to_host_tasks() {
    let s = setup();
    s.scheduler
        .run_async(
            "import devices\nfrom asyncio import AsyncTask\ndef survey():\n    total = 0\n    for r in [1, 2, 3]:\n        sensor = yield from devices.poll(r)\n        total += sensor.reading\n    return total\nresult = await AsyncTask(survey())\nprint(result)",
            None,
        )
        .await
        .unwrap();
    assert_eq!(s.sink.stdout_text(), "6\n");
}

#[tokio::test]
async fn test_host_failure_is_reported_and_chain_continues() {
    let s = setup();
    s.scheduler
        .run_async("import devices\nvalue = await devices.offline()\nprint(value)", None)
        .await
        .unwrap();
    assert_eq!(s.sink.stdout_text(), "None\n");
    assert!(s.sink.stderr_text().contains("OSError: sensor offline"));
}

#[tokio::test]
async fn test_host_holds_result_after_chain() {
    let s = setup();
    s.scheduler
        .run_async("import devices\nsensor = await devices.poll(7)", None)
        .await
        .unwrap();

    let mut vm = s.vm.borrow_mut();
    let main = vm.main_module();
    let value = vm.get_global(main, "sensor").unwrap();
    let sensor: Rc<Sensor> = bridge::FromScript::from_script(&mut vm, &value).unwrap();
    assert_eq!(sensor.reading.get(), 7);
}

#[tokio::test]
async fn test_cancelled_host_task_abandons_chain() {
    let s = setup();
    let task = {
        let mut vm = s.vm.borrow_mut();
        let main = vm.main_module();
        vm.compile_exec(
            "import devices\npending = devices.poll(1)",
            "setup.py",
            interpreter::CompileMode::Exec,
            main,
        )
        .unwrap();
        let value = vm.get_global(main, "pending").unwrap();
        <Rc<AsyncTask> as bridge::FromScript>::from_script(&mut vm, &value).unwrap()
    };
    assert!(task.cancel());

    let err = s
        .scheduler
        .run_async("def same(t):\n    return t\nreading = await same(pending)", None)
        .await
        .unwrap_err();
    assert_eq!(err.message, "await chain was cancelled");
    s.scheduler.run_until_idle().await;
    assert_eq!(s.scheduler.pending(), 0);
}
