//! Unit tests for interpreter components

use core_types::ErrorKind;
use interpreter::{
    CallFrame, CaptureSink, CompileMode, StackGuard, Value, Vm, VmConfig, VmError, REGISTER_COUNT,
};
use std::rc::Rc;

fn eval(vm: &mut Vm, source: &str) -> Value {
    let main = vm.main_module();
    vm.compile_exec(source, "<unit>", CompileMode::Eval, main)
        .unwrap()
}

// ============================================================================
// VM Tests
// ============================================================================

#[test]
fn test_vm_creation() {
    let vm = Vm::new();
    let main = vm.main_module();
    assert_eq!(vm.get_global(main, "__name__"), Some(Value::str("__main__")));
    assert!(vm.get_global(main, "undefined").is_none());
    assert!(vm.builtin("print").is_some());
}

#[test]
fn test_vm_ids_are_unique() {
    let a = Vm::new();
    let b = Vm::new();
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_vm_global_variables() {
    let mut vm = Vm::new();
    let main = vm.main_module();

    vm.set_global(main, "x", Value::Int(10));
    vm.set_global(main, "y", Value::Float(3.5));
    vm.set_global(main, "flag", Value::Bool(true));

    assert_eq!(vm.get_global(main, "x"), Some(Value::Int(10)));
    assert_eq!(eval(&mut vm, "x * 2 + y"), Value::Float(23.5));
    assert_eq!(eval(&mut vm, "not flag"), Value::Bool(false));
}

#[test]
fn test_stack_and_registers() {
    let mut vm = Vm::new();
    let guard = StackGuard::new(&vm);
    vm.push(Value::Int(1));
    vm.push(Value::str("two"));
    assert_eq!(vm.peek(0), Some(&Value::str("two")));
    assert_eq!(vm.peek(1), Some(&Value::Int(1)));
    assert_eq!(vm.peek(2), None);
    guard.restore(&mut vm);
    assert_eq!(vm.stack_depth(), 0);

    vm.set_register(REGISTER_COUNT - 1, Value::Int(7)).unwrap();
    assert_eq!(vm.register(REGISTER_COUNT - 1), Some(Value::Int(7)));
    assert!(vm.set_register(REGISTER_COUNT, Value::None).is_err());
}

#[test]
fn test_guarded_restores_depth() {
    let mut vm = Vm::new();
    let depth = vm.guarded(|vm| {
        vm.push(Value::Int(1));
        vm.push(Value::Int(2));
        vm.stack_depth()
    });
    assert_eq!(depth, 2);
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn test_native_function_call() {
    let mut vm = Vm::new();
    let add = vm.new_native("add", |vm, frame: CallFrame| {
        frame.expect("add", 2, 2)?;
        let a = frame.arg(vm, 0).and_then(|v| v.as_int()).unwrap_or(0);
        let b = frame.arg(vm, 1).and_then(|v| v.as_int()).unwrap_or(0);
        Ok(Value::Int(a + b))
    });
    assert_eq!(vm.call(&add, &[Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
    let err = vm.call(&add, &[Value::Int(2)]).unwrap_err();
    assert_eq!(
        err.to_script_error().message,
        "add() takes exactly 2 arguments (1 given)"
    );
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn test_calling_non_callable() {
    let mut vm = Vm::new();
    let err = vm.call(&Value::Int(3), &[]).unwrap_err();
    assert_eq!(err.to_script_error().message, "'int' object is not callable");
}

#[test]
fn test_type_names() {
    let mut vm = Vm::new();
    let list = vm.new_list(Vec::new());
    assert_eq!(vm.type_name(&Value::None), "NoneType");
    assert_eq!(vm.type_name(&Value::Bool(true)), "bool");
    assert_eq!(vm.type_name(&list), "list");
    assert_eq!(vm.type_name(&Value::Bytes(Rc::from(&b"x"[..]))), "bytes");
}

#[test]
fn test_exception_types_follow_hierarchy() {
    let vm = Vm::new();
    let lookup = vm.exception_type(ErrorKind::UnboundLocalError);
    let name = vm.exception_type(ErrorKind::NameError);
    let base = vm.exception_type(ErrorKind::Exception);
    assert!(vm.is_subtype(lookup, name));
    assert!(vm.is_subtype(name, base));
    assert!(!vm.is_subtype(name, lookup));
}

#[test]
fn test_config_limits() {
    let config = VmConfig::default().with_max_call_depth(50);
    let mut vm = Vm::with_config(config);
    let main = vm.main_module();
    let err = vm
        .compile_exec(
            "def down(n):\n    return down(n + 1)\ndown(0)\n",
            "<unit>",
            CompileMode::Exec,
            main,
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RecursionError);
    assert_eq!(vm.frame_depth(), 0);
}

#[test]
fn test_print_expression_in_single_mode() {
    let mut vm = Vm::new();
    let sink = Rc::new(CaptureSink::new());
    vm.set_output(sink.clone());
    let main = vm.main_module();
    vm.compile_exec("1 + 1", "<stdin>", CompileMode::Single, main)
        .unwrap();
    vm.compile_exec("None", "<stdin>", CompileMode::Single, main)
        .unwrap();
    assert_eq!(sink.stdout_text(), "2\n");
}

#[test]
fn test_report_error_goes_to_stderr() {
    let mut vm = Vm::new();
    let sink = Rc::new(CaptureSink::new());
    vm.set_output(sink.clone());
    let main = vm.main_module();
    let err = vm
        .compile_exec("1 / 0", "<stdin>", CompileMode::Eval, main)
        .unwrap_err();
    vm.report_error(&err);
    assert!(sink.stderr_text().contains("ZeroDivisionError: division by zero"));
}

#[test]
fn test_stop_iteration_error_kind() {
    let err = VmError::StopIteration(Value::Int(1));
    assert_eq!(err.kind(), None);
}

#[test]
fn test_userdata_round_trip() {
    let mut vm = Vm::new();
    let mut ty = interpreter::TypeObject::new("Box", interpreter::TypeKind::Host);
    ty.slots = 1;
    let class = vm.new_type(ty);
    let instance = vm.new_instance(class, Some(Box::new(String::from("inside")))).unwrap();
    assert_eq!(vm.userdata::<String>(&instance).map(String::as_str), Some("inside"));
    assert!(vm.userdata::<i32>(&instance).is_none());
    vm.set_instance_slot(&instance, 0, Value::Int(4)).unwrap();
    assert_eq!(vm.instance_slot(&instance, 0), Some(Value::Int(4)));
    assert!(vm.set_instance_slot(&instance, 1, Value::None).is_err());
}
