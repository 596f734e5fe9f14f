//! Contract tests for interpreter API
//!
//! These tests pin down the guarantees embedders rely on: handle lifetime,
//! module registration and error conversion.

use core_types::ErrorKind;
use interpreter::{CompileMode, TypeKind, TypeObject, Value, Vm};
use std::cell::RefCell;
use std::rc::Rc;

/// Pinned values survive collections; unpinned ones do not
#[test]
fn test_pin_contract() {
    let mut vm = Vm::new();
    let kept = vm.new_list(vec![Value::Int(1)]);
    let dropped = vm.new_list(vec![Value::Int(2)]);
    let pin = vm.pin(kept.clone());
    assert_eq!(vm.pinned_count(), 1);

    vm.collect();
    assert!(vm.is_live(kept.as_object().unwrap()));
    assert!(!vm.is_live(dropped.as_object().unwrap()));

    drop(pin);
    assert_eq!(vm.pinned_count(), 0);
    vm.collect();
    assert!(!vm.is_live(kept.as_object().unwrap()));
}

/// Scalars never take a root
#[test]
fn test_pin_scalar_contract() {
    let vm = Vm::new();
    let pin = vm.pin(Value::Int(3));
    assert!(pin.handle().is_none());
    assert_eq!(vm.pinned_count(), 0);
    assert_eq!(pin.into_value(), Value::Int(3));
}

/// Globals of loaded modules are roots
#[test]
fn test_globals_are_roots_contract() {
    let mut vm = Vm::new();
    let main = vm.main_module();
    vm.compile_exec("data = [[1], [2]]", "<contract>", CompileMode::Exec, main)
        .unwrap();
    let data = vm.get_global(main, "data").unwrap();
    vm.collect();
    assert!(vm.is_live(data.as_object().unwrap()));
    assert_eq!(vm.list_items(&data).map(|items| items.len()), Some(2));
}

/// Finalizers receive the userdata of swept instances exactly once
#[test]
fn test_finalizer_contract() {
    let mut vm = Vm::new();
    let released: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = released.clone();
    let mut ty = TypeObject::new("Handle", TypeKind::Host);
    ty.finalizer = Some(Rc::new(move |_, data| {
        if let Ok(name) = data.downcast::<String>() {
            sink.borrow_mut().push(*name);
        }
    }));
    let class = vm.new_type(ty);
    let pin = vm.pin(Value::Object(class));

    vm.new_instance(class, Some(Box::new(String::from("first"))))
        .unwrap();
    vm.collect();
    vm.collect();
    assert_eq!(released.borrow().as_slice(), ["first".to_string()]);
    drop(pin);
}

/// Registered modules initialize once on first import
#[test]
fn test_register_module_contract() {
    let mut vm = Vm::new();
    let inits = Rc::new(RefCell::new(0));
    let counter = inits.clone();
    vm.register_module("config", move |vm, module| {
        *counter.borrow_mut() += 1;
        vm.set_global(module, "DEBUG", Value::Bool(false));
        Ok(())
    });
    assert!(vm.module_names().contains(&"config".to_string()));

    let a = vm.import("config").unwrap();
    let b = vm.import("config").unwrap();
    assert_eq!(a, b);
    assert_eq!(*inits.borrow(), 1);
    assert_eq!(vm.import_attr("config", "DEBUG").unwrap(), Value::Bool(false));
}

/// A failing initializer leaves no half-built module behind
#[test]
fn test_failed_module_init_contract() {
    let mut vm = Vm::new();
    vm.register_module("broken", |_, _| {
        Err(core_types::ScriptError::runtime_error("cannot load").into())
    });
    let err = vm.import("broken").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RuntimeError));
    assert!(vm.loaded_module("broken").is_none());
}

/// Unknown modules raise ImportError
#[test]
fn test_missing_module_contract() {
    let mut vm = Vm::new();
    let err = vm.import("nowhere").unwrap_err().into_script_error();
    assert_eq!(err.kind, ErrorKind::ImportError);
    assert_eq!(err.message, "No module named 'nowhere'");
}

/// Calling a script function from the host leaves the stack balanced
#[test]
fn test_call_contract() {
    let mut vm = Vm::new();
    let main = vm.main_module();
    vm.compile_exec(
        "def greet(name, punct='!'):\n    return 'hi ' + name + punct\n",
        "<contract>",
        CompileMode::Exec,
        main,
    )
    .unwrap();
    let greet = vm.get_global(main, "greet").unwrap();
    let result = vm.call(&greet, &[Value::str("ann")]).unwrap();
    assert_eq!(result, Value::str("hi ann!"));
    let result = vm
        .call(&greet, &[Value::str("bo"), Value::str("?")])
        .unwrap();
    assert_eq!(result, Value::str("hi bo?"));
    assert_eq!(vm.stack_depth(), 0);
    assert_eq!(vm.frame_depth(), 0);
}

/// Host calls to script code that raises surface the script exception
#[test]
fn test_call_error_contract() {
    let mut vm = Vm::new();
    let main = vm.main_module();
    vm.compile_exec(
        "def fail():\n    raise KeyError('k')\n",
        "<contract>",
        CompileMode::Exec,
        main,
    )
    .unwrap();
    let fail = vm.get_global(main, "fail").unwrap();
    let err = vm.call(&fail, &[]).unwrap_err().into_script_error();
    assert_eq!(err.kind, ErrorKind::KeyError);
    assert_eq!(err.traceback.last().and_then(|f| f.function_name.clone()), Some("fail".to_string()));
    assert_eq!(vm.stack_depth(), 0);
}

/// Generators can be driven from the host
#[test]
fn test_generator_resume_contract() {
    let mut vm = Vm::new();
    let main = vm.main_module();
    vm.compile_exec(
        "def count():\n    yield 1\n    yield 2\n    return 3\ng = count()\n",
        "<contract>",
        CompileMode::Exec,
        main,
    )
    .unwrap();
    let g = vm.get_global(main, "g").unwrap();
    assert!(vm.is_generator(&g));
    let mut yielded = Vec::new();
    let returned = loop {
        match vm.resume(&g, Value::None).unwrap() {
            interpreter::GeneratorStep::Yielded(v) => yielded.push(v),
            interpreter::GeneratorStep::Returned(v) => break v,
        }
    };
    assert_eq!(yielded, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(returned, Value::Int(3));
}
