//! End-to-End CLI Integration Tests
//!
//! Tests the complete runtime through the script_cli Runtime API.
//! This is the highest level integration test - source code to final result.

use std::rc::Rc;

use bridge::{Dynamic, FromScript};
use core_types::ErrorKind;
use interpreter::{CaptureSink, CompileMode, Value};
use script_cli::{InputStatus, Runtime, RuntimeConfig};

fn runtime() -> (Runtime, Rc<CaptureSink>) {
    let sink = Rc::new(CaptureSink::new());
    let runtime = Runtime::new(RuntimeConfig::default().with_gc_threshold(256)).with_sink(sink.clone());
    (runtime, sink)
}

/// Test: Simple expression
#[test]
fn test_e2e_simple_expression() {
    let (mut runtime, _) = runtime();
    let result = runtime.execute("1 + 2", CompileMode::Eval).expect("Execution failed");
    assert_eq!(result, Value::Int(3));
}

/// Test: Program state survives between inputs
#[test]
fn test_e2e_program_then_expression() {
    let (mut runtime, _) = runtime();
    assert!(runtime.run("def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n"));
    assert_eq!(runtime.evaluate::<i64>("fact(10)"), Some(3_628_800));
}

/// Test: JSON rendering of a result the way `--json` does it
#[test]
fn test_e2e_json_rendering() {
    let (mut runtime, _) = runtime();
    let value = runtime
        .execute("{'name': 'sample', 'values': [1, 2.5, None, True]}", CompileMode::Eval)
        .unwrap();
    let mut vm = runtime.vm_mut();
    let pin = vm.pin(value);
    let dynamic = Dynamic::from_script(&mut vm, pin.value()).unwrap();
    let json = serde_json_value(&dynamic);
    assert_eq!(json["name"], "sample");
    assert_eq!(json["values"][1], 2.5);
    // None has no JSON form and is dropped from the list
    assert_eq!(json["values"].as_array().map(Vec::len), Some(3));
    assert_eq!(json["values"][2], true);
}

fn serde_json_value(dynamic: &Dynamic) -> serde_json::Value {
    serde_json::to_value(dynamic).unwrap()
}

/// Test: pathlib round trip through a temporary directory
#[test]
fn test_e2e_pathlib_files() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runtime, sink) = runtime();
    let root = dir.path().to_string_lossy().replace('\\', "\\\\");
    assert!(runtime.run(&format!(
        "from pathlib import Path\nroot = Path('{}')\nnote = root.joinpath('note.txt')\nnote.write_text('remember')\nprint(note.exists(), note.name, note.read_text())",
        root
    )));
    assert_eq!(sink.stdout_text(), "True note.txt remember\n");
    assert_eq!(std::fs::read_to_string(dir.path().join("note.txt")).unwrap(), "remember");
}

/// Test: reading a missing file raises OSError in the script
#[test]
fn test_e2e_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runtime, _) = runtime();
    let root = dir.path().to_string_lossy().replace('\\', "\\\\");
    assert!(runtime.run(&format!(
        "from pathlib import Path\ntry:\n    Path('{}').joinpath('absent').read_text()\n    outcome = 'read'\nexcept OSError:\n    outcome = 'missing'\n",
        root
    )));
    assert_eq!(runtime.evaluate::<String>("outcome"), Some("missing".to_string()));
}

/// Test: sys module reports the runtime
#[test]
fn test_e2e_sys_module() {
    let (mut runtime, _) = runtime();
    assert!(runtime.run("import sys"));
    assert_eq!(runtime.evaluate::<String>("sys.version"), Some(script_cli::stdlib::VERSION.to_string()));
    assert_eq!(runtime.evaluate::<String>("sys.platform"), Some(std::env::consts::OS.to_string()));
}

/// Test: interactive input hands await lines to the scheduler
#[tokio::test]
async fn test_e2e_interactive_await() {
    let (mut runtime, sink) = runtime();
    assert_eq!(runtime.input("import asyncio"), InputStatus::Executed(true));
    let status = runtime.input("pause = await asyncio.sleep(0)");
    let InputStatus::Deferred(source) = status else {
        panic!("expected deferred input, got {:?}", status);
    };
    runtime.async_run(&source).await.unwrap();
    assert_eq!(runtime.input("pause"), InputStatus::Executed(true));
    assert_eq!(runtime.input("print('after')"), InputStatus::Executed(true));
    assert_eq!(sink.stdout_text(), "after\n");
}

/// Test: a whole file with awaits between statements
#[tokio::test]
async fn test_e2e_file_with_awaits() {
    let (mut runtime, sink) = runtime();
    let source = "import asyncio\nlog = []\nlog.append('a')\nawait asyncio.sleep(0.001)\nlog.append('b')\nawait asyncio.sleep(0)\nlog.append('c')\nprint(''.join(log))\n";
    runtime.async_run(source).await.unwrap();
    runtime.run_until_idle().await;
    assert_eq!(sink.stdout_text(), "abc\n");
}

/// Test: errors after an await fail the run with the script error
#[tokio::test]
async fn test_e2e_error_after_await() {
    let (mut runtime, sink) = runtime();
    let err = runtime
        .async_run("import asyncio\nawait asyncio.sleep(0)\n1 / 0\n")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
    assert!(runtime.is_failed());
    assert!(sink.stderr_text().contains("ZeroDivisionError"));
}
