//! Integration tests for script execution
//!
//! These tests verify that the Runtime executes scripts, drives await
//! chains and exposes host modules.

use std::cell::Cell;
use std::rc::Rc;

use bridge::{BridgeCache, BridgeResult, Bridged, HostError, HostResult, TypeBuilder};
use core_types::ErrorKind;
use interpreter::{CaptureSink, CompileMode, Value};
use script_cli::{InputStatus, Runtime, RuntimeConfig};

fn runtime() -> (Runtime, Rc<CaptureSink>) {
    let sink = Rc::new(CaptureSink::new());
    let runtime = Runtime::new(RuntimeConfig::default()).with_sink(sink.clone());
    (runtime, sink)
}

#[derive(Default)]
struct Thermostat {
    cache: BridgeCache,
    target: Cell<f64>,
}

impl Bridged for Thermostat {
    const TYPE_NAME: &'static str = "Thermostat";

    fn bridge_cache(&self) -> &BridgeCache {
        &self.cache
    }

    fn describe(ty: &mut TypeBuilder<'_, Self>) -> BridgeResult<()> {
        ty.constructor("Thermostat(target: float = 20.0)", |target: f64| -> HostResult<Rc<Thermostat>> {
            let t = Thermostat::default();
            t.target.set(target);
            Ok(Rc::new(t))
        })?;
        ty.property_mut(
            "target -> float",
            |t: &Thermostat| -> HostResult<f64> { Ok(t.target.get()) },
            |t: &Thermostat, value: f64| -> HostResult<()> {
                if !(5.0..=30.0).contains(&value) {
                    return Err(HostError::script(ErrorKind::ValueError, "target out of range"));
                }
                t.target.set(value);
                Ok(())
            },
        )?;
        Ok(())
    }
}

#[test]
fn test_execute_expression() {
    let (mut runtime, _) = runtime();
    let result = runtime.execute("6 * 7", CompileMode::Eval).unwrap();
    assert_eq!(result, Value::Int(42));
}

#[test]
fn test_state_persists_between_runs() {
    let (mut runtime, _) = runtime();
    assert!(runtime.run("counter = 1"));
    assert!(runtime.run("counter += 1"));
    assert_eq!(runtime.evaluate::<i64>("counter"), Some(2));
}

#[test]
fn test_print_goes_to_sink() {
    let (mut runtime, sink) = runtime();
    assert!(runtime.run("print('hello', 3)"));
    assert_eq!(sink.stdout_text(), "hello 3\n");
    assert_eq!(sink.executions(), 1);
}

#[test]
fn test_syntax_error_is_recorded() {
    let (mut runtime, sink) = runtime();
    assert!(!runtime.run("def broken(:"));
    assert_eq!(runtime.last_failure().map(|e| e.kind), Some(ErrorKind::SyntaxError));
    assert!(sink.stderr_text().contains("SyntaxError"));
}

#[test]
fn test_evaluate_conversion_mismatch() {
    let (mut runtime, _) = runtime();
    assert_eq!(runtime.evaluate::<String>("1 + 1"), None);
    assert!(!runtime.is_failed());
    assert_eq!(runtime.evaluate::<Vec<String>>("['a', 'b']"), Some(vec!["a".into(), "b".into()]));
}

#[test]
fn test_bound_module_with_class() {
    let (mut runtime, _) = runtime();
    runtime.bind_module("home", |m| {
        m.doc("Home automation.");
        m.class::<Thermostat>()?;
        Ok(())
    });
    assert!(runtime.run("from home import Thermostat\nt = Thermostat()\nt.target = 22.5"));
    assert_eq!(runtime.evaluate::<f64>("t.target"), Some(22.5));

    assert!(!runtime.run("t.target = 99.0"));
    assert_eq!(runtime.last_failure().map(|e| e.kind), Some(ErrorKind::ValueError));
    assert_eq!(runtime.evaluate::<f64>("t.target"), Some(22.5));

    assert!(!runtime.run("t.target = 'warm'"));
    assert_eq!(runtime.last_failure().map(|e| e.kind), Some(ErrorKind::TypeError));
}

#[test]
fn test_repl_input_echoes_expressions() {
    let (mut runtime, sink) = runtime();
    assert_eq!(runtime.input("values = [1, 2]"), InputStatus::Executed(true));
    assert_eq!(runtime.input("values"), InputStatus::Executed(true));
    assert_eq!(runtime.input("for v in values:"), InputStatus::Incomplete);
    assert_eq!(runtime.input("    print(v * 10)"), InputStatus::Incomplete);
    assert_eq!(runtime.input(""), InputStatus::Executed(true));
    assert_eq!(sink.stdout_text(), "[1, 2]\n10\n20\n");
    assert_eq!(runtime.input("undefined_thing"), InputStatus::Executed(false));
}

#[test]
fn test_os_module() {
    let (mut runtime, _) = runtime();
    assert!(runtime.run("import os"));
    let cwd = std::env::current_dir().unwrap().to_string_lossy().into_owned();
    assert_eq!(runtime.evaluate::<String>("os.getcwd()"), Some(cwd));
    assert_eq!(
        runtime.evaluate::<String>("os.sep"),
        Some(std::path::MAIN_SEPARATOR.to_string())
    );
}

#[test]
fn test_collect_keeps_reachable_objects() {
    let (mut runtime, _) = runtime();
    assert!(runtime.run("kept = [[1], [2]]\ntemp = [3]\ntemp = None"));
    runtime.collect();
    assert_eq!(runtime.evaluate::<Vec<Vec<i64>>>("kept"), Some(vec![vec![1], vec![2]]));
}

#[tokio::test]
async fn test_async_run_with_sleep() {
    let (mut runtime, sink) = runtime();
    runtime
        .async_run("import asyncio\nprint('start')\nawait asyncio.sleep(0.001)\nprint('end')")
        .await
        .unwrap();
    assert_eq!(sink.stdout_text(), "start\nend\n");
    assert!(!runtime.is_failed());
}

#[tokio::test]
async fn test_async_run_records_failure() {
    let (mut runtime, sink) = runtime();
    let err = runtime.async_run("import asyncio\nawait asyncio.sleep('soon')").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert!(runtime.is_failed());
    assert!(sink.stderr_text().contains("TypeError"));
}

#[tokio::test]
async fn test_async_run_host_module() {
    let (mut runtime, _) = runtime();
    let scheduler = runtime.scheduler().clone();
    runtime.bind_module("net", move |m| {
        let scheduler = scheduler.clone();
        m.function("fetch(url: str) -> AsyncTask", move |url: String| -> HostResult<Rc<async_runtime::AsyncTask>> {
            Ok(scheduler.spawn(async move { Ok::<_, HostError>(format!("body of {}", url)) }))
        })?;
        Ok(())
    });
    runtime
        .async_run("import net\npage = await net.fetch('a.html')\nsize = len(page)")
        .await
        .unwrap();
    assert_eq!(runtime.evaluate::<String>("page"), Some("body of a.html".to_string()));
    assert_eq!(runtime.evaluate::<i64>("size"), Some(14));
}
