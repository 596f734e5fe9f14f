//! Full Pipeline Integration Tests
//!
//! Tests the complete flow: Source -> Parser -> AST -> BytecodeGenerator -> Bytecode -> VM -> Result

use std::rc::Rc;

use core_types::ErrorKind;
use interpreter::{CaptureSink, CompileMode, Value, Vm};

/// Compile with the parser crate and run the chunk on a fresh VM
fn run_pipeline(source: &str, mode: CompileMode) -> (Vm, Result<Value, core_types::ScriptError>) {
    let mut vm = Vm::new();
    let result = parser::compile(source, "pipeline.py", mode).and_then(|code| {
        let main = vm.main_module();
        vm.exec_code(code, main)
    });
    (vm, result)
}

#[test]
fn test_full_pipeline_expression() {
    let (_, result) = run_pipeline("(10 + 20) * 2 - 18", CompileMode::Eval);
    assert_eq!(result.unwrap(), Value::Int(42));
}

#[test]
fn test_full_pipeline_float_promotion() {
    let (_, result) = run_pipeline("7 / 2", CompileMode::Eval);
    assert_eq!(result.unwrap(), Value::Float(3.5));
}

#[test]
fn test_full_pipeline_statements_bind_globals() {
    let (vm, result) = run_pipeline(
        "def square(n):\n    return n * n\n\ntotal = 0\nfor i in range(4):\n    total += square(i)\n",
        CompileMode::Exec,
    );
    result.unwrap();
    assert_eq!(vm.get_global(vm.main_module(), "total"), Some(Value::Int(14)));
}

#[test]
fn test_full_pipeline_generator_protocol() {
    let (mut vm, result) = run_pipeline(
        "def countdown(n):\n    while n > 0:\n        yield n\n        n -= 1\n    return 'liftoff'\n\nsteps = list(countdown(3))\n",
        CompileMode::Exec,
    );
    result.unwrap();
    let steps = vm.get_global(vm.main_module(), "steps").unwrap();
    assert_eq!(vm.repr(&steps).unwrap(), "[3, 2, 1]");
}

#[test]
fn test_full_pipeline_single_mode_echoes() {
    let mut vm = Vm::new();
    let sink = Rc::new(CaptureSink::new());
    vm.set_output(sink.clone());
    let main = vm.main_module();

    let code = parser::compile("'a' + 'b'", "<stdin>", CompileMode::Single).unwrap();
    vm.exec_code(code, main).unwrap();
    let code = parser::compile("None", "<stdin>", CompileMode::Single).unwrap();
    vm.exec_code(code, main).unwrap();

    assert_eq!(sink.stdout_text(), "'ab'\n");
}

#[test]
fn test_full_pipeline_disassembly_names_source() {
    let code = parser::compile("x = 1\nprint(x)\n", "listing.py", CompileMode::Exec).unwrap();
    let listing = code.disassemble();
    assert!(!listing.is_empty());
    assert!(listing.contains("print"));
}

#[test]
fn test_full_pipeline_incomplete_input() {
    let err = parser::compile("if True:", "<stdin>", CompileMode::Single).unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert!(parser::is_incomplete_input(&err));

    let err = parser::compile("x = )", "<stdin>", CompileMode::Single).unwrap_err();
    assert!(!parser::is_incomplete_input(&err));
}

#[test]
fn test_full_pipeline_runtime_error_has_traceback() {
    let (vm, result) = run_pipeline("def divide(a):\n    return a // 0\n\ndivide(1)\n", CompileMode::Exec);
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
    assert_eq!(err.traceback.last().and_then(|f| f.function_name.as_deref()), Some("divide"));
    assert_eq!(vm.stack_depth(), 0);
}
