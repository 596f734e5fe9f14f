//! Integration tests for interpreter
//!
//! Whole programs compiled from source and run on one VM.

use core_types::ErrorKind;
use interpreter::{CaptureSink, CompileMode, Value, Vm};
use std::rc::Rc;

fn vm_with_capture() -> (Vm, Rc<CaptureSink>) {
    let mut vm = Vm::new();
    let sink = Rc::new(CaptureSink::new());
    vm.set_output(sink.clone());
    (vm, sink)
}

fn exec(vm: &mut Vm, source: &str) {
    let main = vm.main_module();
    vm.compile_exec(source, "main.py", CompileMode::Exec, main)
        .unwrap();
}

fn eval(vm: &mut Vm, source: &str) -> Value {
    let main = vm.main_module();
    vm.compile_exec(source, "main.py", CompileMode::Eval, main)
        .unwrap()
}

#[test]
fn test_loops_and_functions() {
    let (mut vm, sink) = vm_with_capture();
    exec(
        &mut vm,
        "def fib(n):\n    a = 0\n    b = 1\n    for i in range(n):\n        t = a + b\n        a = b\n        b = t\n    return a\n\nfor n in [1, 5, 10]:\n    print(n, fib(n))\n",
    );
    assert_eq!(sink.stdout_text(), "1 1\n5 5\n10 55\n");
}

#[test]
fn test_while_break_continue() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "total = 0\ni = 0\nwhile True:\n    i += 1\n    if i % 2 == 0:\n        continue\n    if i > 9:\n        break\n    total += i\n",
    );
    assert_eq!(eval(&mut vm, "total"), Value::Int(25));
}

#[test]
fn test_break_out_of_for_inside_try() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "found = None\nfor x in [1, 2, 3]:\n    try:\n        if x == 2:\n            found = x\n            break\n    except ValueError:\n        pass\nafter = 'done'\n",
    );
    assert_eq!(eval(&mut vm, "found"), Value::Int(2));
    assert_eq!(eval(&mut vm, "after"), Value::str("done"));
}

#[test]
fn test_try_except_binds_exception() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "try:\n    {}['missing']\nexcept KeyError as e:\n    message = str(e)\n    kind = type(e)\n",
    );
    assert_eq!(eval(&mut vm, "message"), Value::str("'missing'"));
    assert_eq!(eval(&mut vm, "kind is KeyError"), Value::Bool(true));
}

#[test]
fn test_except_matches_base_class() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "def risky():\n    return undefined_name\ntry:\n    risky()\nexcept Exception as e:\n    caught = repr(e)\n",
    );
    assert_eq!(
        eval(&mut vm, "caught"),
        Value::str("NameError(\"name 'undefined_name' is not defined\")")
    );
}

#[test]
fn test_unmatched_exception_propagates_with_traceback() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    let err = vm
        .compile_exec(
            "def inner():\n    raise ValueError('bad value')\n\ndef outer():\n    inner()\n\ntry:\n    outer()\nexcept KeyError:\n    pass\n",
            "main.py",
            CompileMode::Exec,
            main,
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValueError);
    assert_eq!(err.message, "bad value");
    let names: Vec<Option<&str>> = err
        .traceback
        .iter()
        .map(|f| f.function_name.as_deref())
        .collect();
    assert_eq!(names, vec![None, Some("outer"), Some("inner")]);
    assert_eq!(err.traceback[2].line, 2);
    assert_eq!(vm.stack_depth(), 0);
}

#[test]
fn test_bare_raise_keeps_original_traceback() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    let err = vm
        .compile_exec(
            "def fail():\n    raise KeyError('k')\n\ntry:\n    fail()\nexcept KeyError:\n    raise\n",
            "main.py",
            CompileMode::Exec,
            main,
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::KeyError);
    let names: Vec<Option<&str>> = err
        .traceback
        .iter()
        .map(|f| f.function_name.as_deref())
        .collect();
    assert_eq!(names, vec![None, Some("fail")]);
    assert_eq!(err.traceback[0].line, 5);
}

#[test]
fn test_bare_raise_reraises() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    let err = vm
        .compile_exec(
            "try:\n    int('nope')\nexcept ValueError:\n    raise\n",
            "main.py",
            CompileMode::Exec,
            main,
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValueError);

    let err = vm
        .compile_exec("raise", "main.py", CompileMode::Exec, main)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(err.message, "No active exception to reraise");
}

#[test]
fn test_assert_statement() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    let err = vm
        .compile_exec("assert 1 == 2, 'math broke'", "main.py", CompileMode::Exec, main)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AssertionError);
    assert_eq!(err.message, "math broke");
}

#[test]
fn test_unbound_local() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    let err = vm
        .compile_exec(
            "def f():\n    print(x)\n    x = 1\nf()\n",
            "main.py",
            CompileMode::Exec,
            main,
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnboundLocalError);
    assert_eq!(err.message, "local variable 'x' referenced before assignment");
}

#[test]
fn test_global_statement() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\n",
    );
    assert_eq!(eval(&mut vm, "count"), Value::Int(2));
}

#[test]
fn test_argument_errors() {
    let (mut vm, _) = vm_with_capture();
    exec(&mut vm, "def pair(a, b):\n    return [a, b]\n");
    let main = vm.main_module();
    let err = vm
        .compile_exec("pair(1)", "main.py", CompileMode::Eval, main)
        .unwrap_err();
    assert_eq!(err.message, "pair() missing 1 required positional argument: 'b'");
    let err = vm
        .compile_exec("pair(1, 2, 3)", "main.py", CompileMode::Eval, main)
        .unwrap_err();
    assert_eq!(err.message, "pair() takes 2 positional arguments but 3 were given");
}

#[test]
fn test_generators_and_yield_from() {
    let (mut vm, sink) = vm_with_capture();
    exec(
        &mut vm,
        "def inner():\n    yield 1\n    yield 2\n    return 'inner done'\n\ndef outer():\n    result = yield from inner()\n    yield result\n\nfor v in outer():\n    print(v)\n",
    );
    assert_eq!(sink.stdout_text(), "1\n2\ninner done\n");
}

#[test]
fn test_generator_send() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "def echo():\n    received = []\n    while True:\n        x = yield len(received)\n        if x is None:\n            return received\n        received.append(x)\n\ng = echo()\nfirst = next(g)\nsecond = g.send('a')\nthird = g.send('b')\ntry:\n    g.send(None)\nexcept StopIteration as stop:\n    final = stop.value\n",
    );
    assert_eq!(eval(&mut vm, "[first, second, third] == [0, 1, 2]"), Value::Bool(true));
    assert_eq!(eval(&mut vm, "final == ['a', 'b']"), Value::Bool(true));
}

#[test]
fn test_stop_iteration_inside_generator() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    let err = vm
        .compile_exec(
            "def g():\n    yield next(iter([]))\nlist(g())\n",
            "main.py",
            CompileMode::Exec,
            main,
        )
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(err.message, "generator raised StopIteration");
}

#[test]
fn test_failed_exec_restores_state() {
    let (mut vm, _) = vm_with_capture();
    vm.set_register(0, Value::Int(1)).unwrap();
    let main = vm.main_module();
    vm.compile_exec("x = 1\ny = [x, x]\nz = y[5]\n", "main.py", CompileMode::Exec, main)
        .unwrap_err();
    assert_eq!(vm.stack_depth(), 0);
    assert_eq!(vm.frame_depth(), 0);
    assert_eq!(vm.register(0), Some(Value::Int(1)));
    // Side effects before the failure stay visible
    assert_eq!(eval(&mut vm, "x"), Value::Int(1));
}

#[test]
fn test_syntax_error_has_location() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    let err = vm
        .compile_exec("x = 1\nif x\n    pass\n", "main.py", CompileMode::Exec, main)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SyntaxError);
    assert_eq!(err.traceback.last().map(|f| f.line), Some(2));
}

#[test]
fn test_import_hook_module_and_from_import() {
    let (mut vm, _) = vm_with_capture();
    vm.set_import_hook(|name| match name {
        "shapes" => Some("SIDES = 4\ndef area(w, h):\n    return w * h\n".to_string()),
        _ => None,
    });
    exec(&mut vm, "import shapes\nfrom shapes import area as a\n");
    assert_eq!(eval(&mut vm, "shapes.SIDES + a(2, 3)"), Value::Int(10));

    let main = vm.main_module();
    let err = vm
        .compile_exec("from shapes import volume", "main.py", CompileMode::Exec, main)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
    assert_eq!(err.message, "cannot import name 'volume' from 'shapes'");
}

#[test]
fn test_collection_during_long_loop() {
    let config = interpreter::VmConfig::default().with_gc_threshold(100);
    let mut vm = Vm::with_config(config);
    let main = vm.main_module();
    vm.compile_exec(
        "keep = []\nfor i in range(1000):\n    tmp = [i, [i]]\n    if i % 100 == 0:\n        keep.append(tmp)\n",
        "main.py",
        CompileMode::Exec,
        main,
    )
    .unwrap();
    assert!(vm.gc_stats().collections > 0);
    assert_eq!(
        vm.compile_exec("len(keep) == 10 and keep[9][1][0] == 900", "main.py", CompileMode::Eval, main)
            .unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn test_class_with_init_methods_and_attributes() {
    let (mut vm, sink) = vm_with_capture();
    exec(
        &mut vm,
        "class Counter:\n    \"Counts things.\"\n    step = 2\n    def __init__(self, start):\n        self.value = start\n    def bump(self):\n        self.value += self.step\n        return self.value\n\nc = Counter(3)\nc.bump()\nprint(c.bump(), Counter.step, Counter.__doc__)\n",
    );
    assert_eq!(sink.stdout_text(), "7 2 Counts things.\n");
    assert_eq!(eval(&mut vm, "isinstance(c, Counter)"), Value::Bool(true));
}

#[test]
fn test_subclass_overrides_and_calls_super() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "class Shape:\n    def __init__(self, name):\n        self.name = name\n    def describe(self):\n        return self.name\n\nclass Square(Shape):\n    def __init__(self, side):\n        super().__init__('square')\n        self.side = side\n    def describe(self):\n        return super().describe() + ' ' + str(self.side)\n\ns = Square(4)\n",
    );
    assert_eq!(eval(&mut vm, "s.describe()"), Value::str("square 4"));
    assert_eq!(eval(&mut vm, "isinstance(s, Shape)"), Value::Bool(true));
}

#[test]
fn test_object_init_through_super() {
    let (mut vm, _) = vm_with_capture();
    exec(
        &mut vm,
        "class Plain:\n    def __init__(self):\n        super().__init__()\n        self.ready = True\n\np = Plain()\n",
    );
    assert_eq!(eval(&mut vm, "p.ready"), Value::Bool(true));
}

#[test]
fn test_class_construction_errors() {
    let (mut vm, _) = vm_with_capture();
    let main = vm.main_module();
    for (source, kind) in [
        ("class Empty:\n    pass\n\nEmpty(1)\n", ErrorKind::TypeError),
        ("class Odd:\n    def __init__(self):\n        return 1\n\nOdd()\n", ErrorKind::TypeError),
        ("class Number(int):\n    pass\n", ErrorKind::TypeError),
        ("base = 3\nclass Weird(base):\n    pass\n", ErrorKind::TypeError),
        ("class Lonely:\n    def name(self):\n        return super().name()\n\nLonely().name()\n", ErrorKind::AttributeError),
    ] {
        let err = vm
            .compile_exec(source, "main.py", CompileMode::Exec, main)
            .unwrap_err();
        assert_eq!(err.kind, kind, "source: {}", source);
    }
}
