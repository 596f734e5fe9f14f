//! Builtin functions, type constructors and methods of the builtin types

use std::cell::RefCell;
use std::rc::Rc;

use core_types::{ErrorKind, ScriptError};
use memory_manager::ObjRef;

use crate::call_frame::CallFrame;
use crate::error::{VmError, VmResult};
use crate::iteration::{GeneratorStep, IterStep};
use crate::object::*;
use crate::value::Value;
use crate::vm::Vm;

type Builtin = fn(&mut Vm, CallFrame) -> VmResult<Value>;

/// Populate the builtins module and the builtin types
pub(crate) fn install(vm: &mut Vm) {
    let functions: [(&str, Builtin); 21] = [
        ("print", builtin_print),
        ("len", builtin_len),
        ("range", builtin_range),
        ("repr", builtin_repr),
        ("isinstance", builtin_isinstance),
        ("iter", builtin_iter),
        ("next", builtin_next),
        ("hasattr", builtin_hasattr),
        ("getattr", builtin_getattr),
        ("setattr", builtin_setattr),
        ("callable", builtin_callable),
        ("abs", builtin_abs),
        ("min", builtin_min),
        ("max", builtin_max),
        ("sum", builtin_sum),
        ("sorted", builtin_sorted),
        ("chr", builtin_chr),
        ("ord", builtin_ord),
        ("id", builtin_id),
        ("property", builtin_property),
        ("staticmethod", builtin_staticmethod),
    ];
    for (name, func) in functions {
        let native = vm.new_native(name, func);
        let builtins = vm.builtins_module();
        vm.set_global(builtins, name, native);
    }

    let t = vm.builtin_types();
    let exposed = [
        ("object", t.object),
        ("type", t.type_),
        ("bool", t.bool),
        ("int", t.int),
        ("float", t.float),
        ("str", t.str),
        ("bytes", t.bytes),
        ("list", t.list),
        ("dict", t.dict),
        ("StopIteration", t.stop_iteration),
    ];
    let (str_ty, list_ty, dict_ty, bytes_ty, generator_ty) = (t.str, t.list, t.dict, t.bytes, t.generator);
    let errors: Vec<(ErrorKind, ObjRef)> = t.errors.iter().map(|(k, v)| (*k, *v)).collect();

    let builtins = vm.builtins_module();
    for (name, ty) in exposed {
        vm.set_global(builtins, name, Value::Object(ty));
    }
    for (kind, ty) in errors {
        vm.set_global(builtins, kind.name(), Value::Object(ty));
    }
    vm.set_global(builtins, "__name__", Value::str("builtins"));

    let constructors: [(ObjRef, Builtin); 9] = {
        let t = vm.builtin_types();
        [
            (t.type_, construct_type),
            (t.object, construct_object),
            (t.bool, construct_bool),
            (t.int, construct_int),
            (t.float, construct_float),
            (t.str, construct_str),
            (t.bytes, construct_bytes),
            (t.list, construct_list),
            (t.dict, construct_dict),
        ]
    };
    for (ty, func) in constructors {
        if let Some(Object::Type(t)) = vm.object_mut(ty) {
            t.constructor = Some(Rc::new(func));
        }
    }

    let methods: [(ObjRef, &str, Builtin); 37] = [
        (list_ty, "append", list_append),
        (list_ty, "pop", list_pop),
        (list_ty, "insert", list_insert),
        (list_ty, "extend", list_extend),
        (list_ty, "index", list_index),
        (list_ty, "count", list_count),
        (list_ty, "reverse", list_reverse),
        (list_ty, "clear", list_clear),
        (list_ty, "copy", list_copy),
        (list_ty, "remove", list_remove),
        (list_ty, "sort", list_sort),
        (dict_ty, "get", dict_get),
        (dict_ty, "keys", dict_keys),
        (dict_ty, "values", dict_values),
        (dict_ty, "items", dict_items),
        (dict_ty, "pop", dict_pop),
        (dict_ty, "update", dict_update),
        (dict_ty, "clear", dict_clear),
        (dict_ty, "copy", dict_copy),
        (dict_ty, "setdefault", dict_setdefault),
        (str_ty, "upper", str_upper),
        (str_ty, "lower", str_lower),
        (str_ty, "strip", str_strip),
        (str_ty, "lstrip", str_lstrip),
        (str_ty, "rstrip", str_rstrip),
        (str_ty, "split", str_split),
        (str_ty, "join", str_join),
        (str_ty, "startswith", str_startswith),
        (str_ty, "endswith", str_endswith),
        (str_ty, "replace", str_replace),
        (str_ty, "find", str_find),
        (str_ty, "encode", str_encode),
        (str_ty, "isdigit", str_isdigit),
        (bytes_ty, "decode", bytes_decode),
        (generator_ty, "send", generator_send),
        (generator_ty, "__next__", generator_next),
        (generator_ty, "__iter__", identity),
    ];
    for (ty, name, func) in methods {
        let native = vm.new_native(name, func);
        if let Some(Object::Type(t)) = vm.object_mut(ty) {
            t.attrs.insert(Rc::from(name), native);
        }
    }
}

// ----------------------------------------------------------------------
// Argument helpers
// ----------------------------------------------------------------------

fn arg(vm: &Vm, frame: &CallFrame, index: usize) -> Value {
    frame.arg(vm, index).unwrap_or(Value::None)
}

fn int_arg(vm: &Vm, value: &Value) -> VmResult<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(ScriptError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            vm.type_name(other)
        ))
        .into()),
    }
}

fn str_arg(vm: &Vm, value: &Value, what: &str) -> VmResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ScriptError::type_error(format!(
            "{} must be str, not {}",
            what,
            vm.type_name(other)
        ))
        .into()),
    }
}

fn receiver_handle(vm: &Vm, frame: &CallFrame, kind: &str) -> VmResult<ObjRef> {
    let receiver = arg(vm, frame, 0);
    let ok = match receiver.as_object().and_then(|h| vm.object(h)) {
        Some(Object::List(_)) => kind == "list",
        Some(Object::Dict(_)) => kind == "dict",
        _ => false,
    };
    match receiver.as_object() {
        Some(handle) if ok => Ok(handle),
        _ => Err(ScriptError::type_error(format!(
            "descriptor requires a '{}' object but received a '{}'",
            kind,
            vm.type_name(&receiver)
        ))
        .into()),
    }
}

fn with_list<R>(vm: &mut Vm, handle: ObjRef, f: impl FnOnce(&mut Vec<Value>) -> R) -> VmResult<R> {
    match vm.object_mut(handle) {
        Some(Object::List(items)) => Ok(f(items)),
        _ => Err(ScriptError::type_error("expected a list").into()),
    }
}

fn with_dict<R>(vm: &mut Vm, handle: ObjRef, f: impl FnOnce(&mut crate::dict::Dict) -> R) -> VmResult<R> {
    match vm.object_mut(handle) {
        Some(Object::Dict(dict)) => Ok(f(dict)),
        _ => Err(ScriptError::type_error("expected a dict").into()),
    }
}

fn receiver_str(vm: &Vm, frame: &CallFrame) -> VmResult<Rc<str>> {
    str_arg(vm, &arg(vm, frame, 0), "descriptor receiver")
}

/// Sort with a fallible comparison; the first error wins
fn sort_values(vm: &Vm, items: &mut [Value]) -> VmResult<()> {
    let failure: RefCell<Option<VmError>> = RefCell::new(None);
    items.sort_by(|a, b| {
        if failure.borrow().is_some() {
            return std::cmp::Ordering::Equal;
        }
        match vm.ordering(a, b, bytecode_system::CompareOp::Lt) {
            Ok(Some(ordering)) => ordering,
            Ok(None) => std::cmp::Ordering::Equal,
            Err(e) => {
                *failure.borrow_mut() = Some(e);
                std::cmp::Ordering::Equal
            }
        }
    });
    match failure.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// ----------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------

fn builtin_print(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    let mut parts = Vec::with_capacity(frame.argc);
    for value in frame.args(vm) {
        parts.push(vm.to_str(&value)?);
    }
    let mut line = parts.join(" ");
    line.push('\n');
    vm.write_stdout(&line);
    Ok(Value::None)
}

fn builtin_len(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("len", 1, 1)?;
    let value = arg(vm, &frame, 0);
    Ok(Value::Int(vm.len(&value)? as i64))
}

fn builtin_range(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("range", 1, 3)?;
    let args = frame
        .args(vm)
        .iter()
        .map(|v| int_arg(vm, v))
        .collect::<VmResult<Vec<i64>>>()?;
    let (start, stop, step) = match args.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => (0, 0, 1),
    };
    if step == 0 {
        return Err(VmError::new(ErrorKind::ValueError, "range() arg 3 must not be zero"));
    }
    Ok(Value::Object(vm.alloc(Object::Iterator(IteratorState::Range {
        next: start,
        stop,
        step,
    }))))
}

fn builtin_repr(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("repr", 1, 1)?;
    let value = arg(vm, &frame, 0);
    Ok(Value::str(vm.repr(&value)?))
}

fn builtin_isinstance(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("isinstance", 2, 2)?;
    let value = arg(vm, &frame, 0);
    let class = arg(vm, &frame, 1);
    let classes = vm.list_items(&class).unwrap_or_else(|| vec![class.clone()]);
    let mut result = false;
    for class in &classes {
        match class.as_object().filter(|h| vm.type_object(*h).is_some()) {
            Some(ty) => result |= vm.isinstance(&value, ty),
            None => {
                return Err(ScriptError::type_error(
                    "isinstance() arg 2 must be a type or list of types",
                )
                .into())
            }
        }
    }
    Ok(Value::Bool(result))
}

fn builtin_iter(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("iter", 1, 1)?;
    let value = arg(vm, &frame, 0);
    vm.get_iter(&value)
}

fn builtin_next(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("next", 1, 2)?;
    let iterator = arg(vm, &frame, 0);
    match vm.iter_next(&iterator)? {
        IterStep::Item(item) => Ok(item),
        IterStep::Done(value) => match frame.arg(vm, 1) {
            Some(default) => Ok(default),
            None => Err(VmError::StopIteration(value)),
        },
    }
}

fn builtin_hasattr(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("hasattr", 2, 2)?;
    let object = arg(vm, &frame, 0);
    let name = str_arg(vm, &arg(vm, &frame, 1), "attribute name")?;
    Ok(Value::Bool(vm.has_attr(&object, &name)?))
}

fn builtin_getattr(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("getattr", 2, 3)?;
    let object = arg(vm, &frame, 0);
    let name = str_arg(vm, &arg(vm, &frame, 1), "attribute name")?;
    match vm.get_attr(&object, &name) {
        Err(VmError::Exception(e)) if e.kind == ErrorKind::AttributeError => match frame.arg(vm, 2) {
            Some(default) => Ok(default),
            None => Err(VmError::Exception(e)),
        },
        other => other,
    }
}

fn builtin_setattr(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("setattr", 3, 3)?;
    let object = arg(vm, &frame, 0);
    let name = str_arg(vm, &arg(vm, &frame, 1), "attribute name")?;
    let value = arg(vm, &frame, 2);
    vm.set_attr(&object, &name, value)?;
    Ok(Value::None)
}

fn builtin_callable(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("callable", 1, 1)?;
    Ok(Value::Bool(vm.is_callable(&arg(vm, &frame, 0))))
}

fn builtin_abs(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("abs", 1, 1)?;
    match arg(vm, &frame, 0) {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| VmError::new(ErrorKind::ValueError, "integer overflow")),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(ScriptError::type_error(format!(
            "bad operand type for abs(): '{}'",
            vm.type_name(&other)
        ))
        .into()),
    }
}

fn extremum(vm: &mut Vm, frame: CallFrame, name: &str, want: std::cmp::Ordering) -> VmResult<Value> {
    if frame.argc == 0 {
        return Err(ScriptError::type_error(format!(
            "{} expected at least 1 argument, got 0",
            name
        ))
        .into());
    }
    let candidates = if frame.argc == 1 {
        let iterable = arg(vm, &frame, 0);
        vm.collect_iter(&iterable)?
    } else {
        frame.args(vm)
    };
    let mut best: Option<Value> = None;
    for candidate in candidates {
        best = Some(match best {
            None => candidate,
            Some(current) => {
                if vm.ordering(&candidate, &current, bytecode_system::CompareOp::Lt)? == Some(want) {
                    candidate
                } else {
                    current
                }
            }
        });
    }
    best.ok_or_else(|| VmError::new(ErrorKind::ValueError, format!("{}() arg is an empty sequence", name)))
}

fn builtin_min(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    extremum(vm, frame, "min", std::cmp::Ordering::Less)
}

fn builtin_max(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    extremum(vm, frame, "max", std::cmp::Ordering::Greater)
}

fn builtin_sum(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("sum", 1, 2)?;
    let iterable = arg(vm, &frame, 0);
    let mut total = frame.arg(vm, 1).unwrap_or(Value::Int(0));
    if let Value::Str(_) = total {
        return Err(ScriptError::type_error("sum() can't sum strings [use ''.join(seq) instead]").into());
    }
    for item in vm.collect_iter(&iterable)? {
        total = vm.binary_op(bytecode_system::BinaryOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn builtin_sorted(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("sorted", 1, 1)?;
    let iterable = arg(vm, &frame, 0);
    let mut items = vm.collect_iter(&iterable)?;
    sort_values(vm, &mut items)?;
    Ok(vm.new_list(items))
}

fn builtin_chr(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("chr", 1, 1)?;
    let code = int_arg(vm, &arg(vm, &frame, 0))?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::str(c.to_string()))
        .ok_or_else(|| VmError::new(ErrorKind::ValueError, "chr() arg not in range(0x110000)"))
}

fn builtin_ord(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("ord", 1, 1)?;
    let text = str_arg(vm, &arg(vm, &frame, 0), "ord() argument")?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(c as i64)),
        _ => Err(ScriptError::type_error(format!(
            "ord() expected a character, but string of length {} found",
            text.chars().count()
        ))
        .into()),
    }
}

fn builtin_id(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("id", 1, 1)?;
    Ok(match arg(vm, &frame, 0) {
        Value::Object(handle) => {
            Value::Int(((handle.generation() as i64) << 32) | handle.index() as i64)
        }
        other => Value::Int(match vm.hash_key(&other)? {
            crate::value::HashKey::Int(n) => n,
            _ => -1,
        }),
    })
}

fn builtin_property(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("property", 0, 3)?;
    let getter = frame.arg(vm, 0).filter(|v| !v.is_none());
    let setter = frame.arg(vm, 1).filter(|v| !v.is_none());
    let doc = match frame.arg(vm, 2) {
        Some(Value::Str(s)) => Some(s.to_string()),
        _ => None,
    };
    Ok(Value::Object(vm.alloc(Object::Property(Property { getter, setter, doc }))))
}

fn builtin_staticmethod(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("staticmethod", 1, 1)?;
    let function = arg(vm, &frame, 0);
    Ok(Value::Object(vm.alloc(Object::StaticMethod(function))))
}

fn identity(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    Ok(arg(vm, &frame, 0))
}

// ----------------------------------------------------------------------
// Constructors
// ----------------------------------------------------------------------

fn construct_type(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("type", 1, 1)?;
    let value = arg(vm, &frame, 0);
    Ok(Value::Object(vm.type_of(&value)))
}

fn construct_object(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("object", 0, 0)?;
    let class = vm.builtin_types().object;
    vm.new_instance(class, None)
}

fn construct_bool(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("bool", 0, 1)?;
    match frame.arg(vm, 0) {
        Some(value) => Ok(Value::Bool(vm.truthy(&value)?)),
        None => Ok(Value::Bool(false)),
    }
}

fn parse_int(text: &str, base: u32) -> Option<i64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned).to_string()),
    };
    let digits = match base {
        16 => digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(&digits).to_string(),
        8 => digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")).unwrap_or(&digits).to_string(),
        2 => digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")).unwrap_or(&digits).to_string(),
        _ => digits,
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = i64::from_str_radix(&digits, base).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn construct_int(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("int", 0, 2)?;
    let Some(value) = frame.arg(vm, 0) else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = frame.arg(vm, 1) {
        let base = int_arg(vm, &base)?;
        let text = str_arg(vm, &value, "int() argument")?;
        if !(2..=36).contains(&base) {
            return Err(VmError::new(ErrorKind::ValueError, "int() base must be >= 2 and <= 36"));
        }
        return parse_int(&text, base as u32).map(Value::Int).ok_or_else(|| {
            VmError::new(
                ErrorKind::ValueError,
                format!("invalid literal for int() with base {}: {}", base, crate::value::str_repr(&text)),
            )
        });
    }
    match &value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => {
            if f.is_nan() {
                Err(VmError::new(ErrorKind::ValueError, "cannot convert float NaN to integer"))
            } else if f.is_infinite() || f.abs() >= 9.223_372_036_854_776e18 {
                Err(VmError::new(ErrorKind::ValueError, "cannot convert float infinity to integer"))
            } else {
                Ok(Value::Int(f.trunc() as i64))
            }
        }
        Value::Str(s) => parse_int(s, 10).map(Value::Int).ok_or_else(|| {
            VmError::new(
                ErrorKind::ValueError,
                format!("invalid literal for int() with base 10: {}", crate::value::str_repr(s)),
            )
        }),
        other => Err(ScriptError::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            vm.type_name(other)
        ))
        .into()),
    }
}

fn construct_float(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("float", 0, 1)?;
    match frame.arg(vm, 0) {
        None => Ok(Value::Float(0.0)),
        Some(Value::Float(f)) => Ok(Value::Float(f)),
        Some(Value::Int(n)) => Ok(Value::Float(n as f64)),
        Some(Value::Bool(b)) => Ok(Value::Float(b as i64 as f64)),
        Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            VmError::new(
                ErrorKind::ValueError,
                format!("could not convert string to float: {}", crate::value::str_repr(&s)),
            )
        }),
        Some(other) => Err(ScriptError::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            vm.type_name(&other)
        ))
        .into()),
    }
}

fn construct_str(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("str", 0, 1)?;
    match frame.arg(vm, 0) {
        Some(value) => Ok(Value::str(vm.to_str(&value)?)),
        None => Ok(Value::str("")),
    }
}

fn construct_bytes(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("bytes", 0, 1)?;
    let bytes: Vec<u8> = match frame.arg(vm, 0) {
        None => Vec::new(),
        Some(Value::Bytes(b)) => b.to_vec(),
        Some(Value::Int(n)) if n >= 0 => vec![0; n as usize],
        Some(Value::Str(_)) => {
            return Err(ScriptError::type_error("string argument without an encoding").into())
        }
        Some(iterable) => {
            let mut out = Vec::new();
            for item in vm.collect_iter(&iterable)? {
                let n = int_arg(vm, &item)?;
                let byte = u8::try_from(n).map_err(|_| {
                    VmError::new(ErrorKind::ValueError, "bytes must be in range(0, 256)")
                })?;
                out.push(byte);
            }
            out
        }
    };
    Ok(Value::Bytes(bytes.into()))
}

fn construct_list(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("list", 0, 1)?;
    let items = match frame.arg(vm, 0) {
        Some(iterable) => vm.collect_iter(&iterable)?,
        None => Vec::new(),
    };
    Ok(vm.new_list(items))
}

fn construct_dict(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("dict", 0, 1)?;
    let Some(source) = frame.arg(vm, 0) else {
        return vm.new_dict(Vec::new());
    };
    if let Some(pairs) = vm.dict_items(&source) {
        return vm.new_dict(pairs);
    }
    let mut pairs = Vec::new();
    for entry in vm.collect_iter(&source)? {
        match vm.list_items(&entry).as_deref() {
            Some([k, v]) => pairs.push((k.clone(), v.clone())),
            _ => {
                return Err(VmError::new(
                    ErrorKind::ValueError,
                    "dictionary update sequence element has wrong length",
                ))
            }
        }
    }
    vm.new_dict(pairs)
}

// ----------------------------------------------------------------------
// list
// ----------------------------------------------------------------------

fn list_append(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("append", 2, 2)?;
    let list = receiver_handle(vm, &frame, "list")?;
    let item = arg(vm, &frame, 1);
    with_list(vm, list, |items| items.push(item))?;
    Ok(Value::None)
}

fn list_pop(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("pop", 1, 2)?;
    let list = receiver_handle(vm, &frame, "list")?;
    let index = match frame.arg(vm, 1) {
        Some(v) => Some(int_arg(vm, &v)?),
        None => None,
    };
    with_list(vm, list, |items| {
        if items.is_empty() {
            return Err(VmError::new(ErrorKind::IndexError, "pop from empty list"));
        }
        let len = items.len() as i64;
        let at = index.map(|i| if i < 0 { i + len } else { i }).unwrap_or(len - 1);
        if at < 0 || at >= len {
            return Err(VmError::new(ErrorKind::IndexError, "pop index out of range"));
        }
        Ok(items.remove(at as usize))
    })?
}

fn list_insert(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("insert", 3, 3)?;
    let list = receiver_handle(vm, &frame, "list")?;
    let index = int_arg(vm, &arg(vm, &frame, 1))?;
    let item = arg(vm, &frame, 2);
    with_list(vm, list, |items| {
        let len = items.len() as i64;
        let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
        items.insert(at as usize, item);
    })?;
    Ok(Value::None)
}

fn list_extend(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("extend", 2, 2)?;
    let list = receiver_handle(vm, &frame, "list")?;
    let iterable = arg(vm, &frame, 1);
    let extra = vm.collect_iter(&iterable)?;
    with_list(vm, list, |items| items.extend(extra))?;
    Ok(Value::None)
}

fn list_index(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("index", 2, 2)?;
    let list = arg(vm, &frame, 0);
    receiver_handle(vm, &frame, "list")?;
    let needle = arg(vm, &frame, 1);
    let items = vm.list_items(&list).unwrap_or_default();
    match items.iter().position(|v| vm.values_equal(v, &needle)) {
        Some(at) => Ok(Value::Int(at as i64)),
        None => Err(VmError::new(
            ErrorKind::ValueError,
            format!("{} is not in list", vm.repr(&needle)?),
        )),
    }
}

fn list_count(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("count", 2, 2)?;
    let list = arg(vm, &frame, 0);
    receiver_handle(vm, &frame, "list")?;
    let needle = arg(vm, &frame, 1);
    let items = vm.list_items(&list).unwrap_or_default();
    Ok(Value::Int(items.iter().filter(|v| vm.values_equal(v, &needle)).count() as i64))
}

fn list_reverse(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("reverse", 1, 1)?;
    let list = receiver_handle(vm, &frame, "list")?;
    with_list(vm, list, |items| items.reverse())?;
    Ok(Value::None)
}

fn list_clear(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("clear", 1, 1)?;
    let list = receiver_handle(vm, &frame, "list")?;
    with_list(vm, list, |items| items.clear())?;
    Ok(Value::None)
}

fn list_copy(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("copy", 1, 1)?;
    let list = arg(vm, &frame, 0);
    receiver_handle(vm, &frame, "list")?;
    let items = vm.list_items(&list).unwrap_or_default();
    Ok(vm.new_list(items))
}

fn list_remove(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("remove", 2, 2)?;
    let list_value = arg(vm, &frame, 0);
    let list = receiver_handle(vm, &frame, "list")?;
    let needle = arg(vm, &frame, 1);
    let items = vm.list_items(&list_value).unwrap_or_default();
    match items.iter().position(|v| vm.values_equal(v, &needle)) {
        Some(at) => {
            with_list(vm, list, |items| {
                items.remove(at);
            })?;
            Ok(Value::None)
        }
        None => Err(VmError::new(ErrorKind::ValueError, "list.remove(x): x not in list")),
    }
}

fn list_sort(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("sort", 1, 1)?;
    let list_value = arg(vm, &frame, 0);
    let list = receiver_handle(vm, &frame, "list")?;
    let mut items = vm.list_items(&list_value).unwrap_or_default();
    sort_values(vm, &mut items)?;
    with_list(vm, list, |slot| *slot = items)?;
    Ok(Value::None)
}

// ----------------------------------------------------------------------
// dict
// ----------------------------------------------------------------------

fn dict_get(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("get", 2, 3)?;
    let dict = receiver_handle(vm, &frame, "dict")?;
    let key = vm.hash_key(&arg(vm, &frame, 1))?;
    let default = arg(vm, &frame, 2);
    with_dict(vm, dict, |d| d.get(&key).cloned().unwrap_or(default))
}

fn dict_keys(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("keys", 1, 1)?;
    let dict = receiver_handle(vm, &frame, "dict")?;
    let keys = with_dict(vm, dict, |d| d.keys())?;
    Ok(vm.new_list(keys))
}

fn dict_values(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("values", 1, 1)?;
    let dict = receiver_handle(vm, &frame, "dict")?;
    let values = with_dict(vm, dict, |d| d.values())?;
    Ok(vm.new_list(values))
}

fn dict_items(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("items", 1, 1)?;
    let receiver = arg(vm, &frame, 0);
    receiver_handle(vm, &frame, "dict")?;
    let entries = vm.dict_items(&receiver).unwrap_or_default();
    let depth = vm.stack_depth();
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let pair = vm.new_list(vec![k, v]);
        vm.push(pair.clone());
        pairs.push(pair);
    }
    let list = vm.new_list(pairs);
    vm.truncate_stack(depth);
    Ok(list)
}

fn dict_pop(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("pop", 2, 3)?;
    let dict = receiver_handle(vm, &frame, "dict")?;
    let key_value = arg(vm, &frame, 1);
    let key = vm.hash_key(&key_value)?;
    let removed = with_dict(vm, dict, |d| d.remove(&key))?;
    match (removed, frame.arg(vm, 2)) {
        (Some((_, value)), _) => Ok(value),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(VmError::new(ErrorKind::KeyError, vm.repr(&key_value)?)),
    }
}

fn dict_update(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("update", 2, 2)?;
    let dict = receiver_handle(vm, &frame, "dict")?;
    let other = arg(vm, &frame, 1);
    let entries = vm.dict_items(&other).ok_or_else(|| {
        VmError::new(ErrorKind::TypeError, format!("'{}' object is not a mapping", vm.type_name(&other)))
    })?;
    let mut hashed = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        hashed.push((vm.hash_key(&k)?, k, v));
    }
    with_dict(vm, dict, |d| {
        for (h, k, v) in hashed {
            d.insert(h, k, v);
        }
    })?;
    Ok(Value::None)
}

fn dict_clear(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("clear", 1, 1)?;
    let dict = receiver_handle(vm, &frame, "dict")?;
    with_dict(vm, dict, |d| d.clear())?;
    Ok(Value::None)
}

fn dict_copy(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("copy", 1, 1)?;
    let receiver = arg(vm, &frame, 0);
    receiver_handle(vm, &frame, "dict")?;
    let entries = vm.dict_items(&receiver).unwrap_or_default();
    vm.new_dict(entries)
}

fn dict_setdefault(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("setdefault", 2, 3)?;
    let dict = receiver_handle(vm, &frame, "dict")?;
    let key_value = arg(vm, &frame, 1);
    let key = vm.hash_key(&key_value)?;
    let default = arg(vm, &frame, 2);
    with_dict(vm, dict, |d| match d.get(&key) {
        Some(existing) => existing.clone(),
        None => {
            d.insert(key, key_value, default.clone());
            default
        }
    })
}

// ----------------------------------------------------------------------
// str and bytes
// ----------------------------------------------------------------------

fn str_upper(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("upper", 1, 1)?;
    Ok(Value::str(receiver_str(vm, &frame)?.to_uppercase()))
}

fn str_lower(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("lower", 1, 1)?;
    Ok(Value::str(receiver_str(vm, &frame)?.to_lowercase()))
}

fn strip_chars(vm: &Vm, frame: &CallFrame) -> VmResult<Option<Vec<char>>> {
    match frame.arg(vm, 1) {
        None | Some(Value::None) => Ok(None),
        Some(v) => Ok(Some(str_arg(vm, &v, "strip arg")?.chars().collect())),
    }
}

fn str_strip(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("strip", 1, 2)?;
    let s = receiver_str(vm, &frame)?;
    Ok(Value::str(match strip_chars(vm, &frame)? {
        Some(chars) => s.trim_matches(|c| chars.contains(&c)),
        None => s.trim(),
    }))
}

fn str_lstrip(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("lstrip", 1, 2)?;
    let s = receiver_str(vm, &frame)?;
    Ok(Value::str(match strip_chars(vm, &frame)? {
        Some(chars) => s.trim_start_matches(|c| chars.contains(&c)),
        None => s.trim_start(),
    }))
}

fn str_rstrip(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("rstrip", 1, 2)?;
    let s = receiver_str(vm, &frame)?;
    Ok(Value::str(match strip_chars(vm, &frame)? {
        Some(chars) => s.trim_end_matches(|c| chars.contains(&c)),
        None => s.trim_end(),
    }))
}

fn str_split(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("split", 1, 3)?;
    let s = receiver_str(vm, &frame)?;
    let max = match frame.arg(vm, 2) {
        Some(v) => int_arg(vm, &v)?,
        None => -1,
    };
    let parts: Vec<Value> = match frame.arg(vm, 1) {
        None | Some(Value::None) => {
            let words = s.split_whitespace();
            if max < 0 {
                words.map(Value::str).collect()
            } else {
                let mut out: Vec<Value> = Vec::new();
                let mut rest = s.trim_start();
                while !rest.is_empty() && (out.len() as i64) < max {
                    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    out.push(Value::str(&rest[..end]));
                    rest = rest[end..].trim_start();
                }
                if !rest.is_empty() {
                    out.push(Value::str(rest));
                }
                out
            }
        }
        Some(sep) => {
            let sep = str_arg(vm, &sep, "separator")?;
            if sep.is_empty() {
                return Err(VmError::new(ErrorKind::ValueError, "empty separator"));
            }
            if max < 0 {
                s.split(&*sep).map(Value::str).collect()
            } else {
                s.splitn(max as usize + 1, &*sep).map(Value::str).collect()
            }
        }
    };
    Ok(vm.new_list(parts))
}

fn str_join(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("join", 2, 2)?;
    let sep = receiver_str(vm, &frame)?;
    let iterable = arg(vm, &frame, 1);
    let mut parts = Vec::new();
    for (i, item) in vm.collect_iter(&iterable)?.into_iter().enumerate() {
        match item {
            Value::Str(s) => parts.push(s.to_string()),
            other => {
                return Err(ScriptError::type_error(format!(
                    "sequence item {}: expected str instance, {} found",
                    i,
                    vm.type_name(&other)
                ))
                .into())
            }
        }
    }
    Ok(Value::str(parts.join(&sep)))
}

fn str_startswith(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("startswith", 2, 2)?;
    let s = receiver_str(vm, &frame)?;
    let prefix = str_arg(vm, &arg(vm, &frame, 1), "startswith arg")?;
    Ok(Value::Bool(s.starts_with(&*prefix)))
}

fn str_endswith(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("endswith", 2, 2)?;
    let s = receiver_str(vm, &frame)?;
    let suffix = str_arg(vm, &arg(vm, &frame, 1), "endswith arg")?;
    Ok(Value::Bool(s.ends_with(&*suffix)))
}

fn str_replace(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("replace", 3, 3)?;
    let s = receiver_str(vm, &frame)?;
    let old = str_arg(vm, &arg(vm, &frame, 1), "replace arg 1")?;
    let new = str_arg(vm, &arg(vm, &frame, 2), "replace arg 2")?;
    Ok(Value::str(s.replace(&*old, &new)))
}

fn str_find(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("find", 2, 2)?;
    let s = receiver_str(vm, &frame)?;
    let needle = str_arg(vm, &arg(vm, &frame, 1), "find arg")?;
    Ok(Value::Int(match s.find(&*needle) {
        Some(byte) => s[..byte].chars().count() as i64,
        None => -1,
    }))
}

fn str_encode(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("encode", 1, 2)?;
    let s = receiver_str(vm, &frame)?;
    Ok(Value::Bytes(s.as_bytes().into()))
}

fn str_isdigit(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("isdigit", 1, 1)?;
    let s = receiver_str(vm, &frame)?;
    Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())))
}

fn bytes_decode(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("decode", 1, 2)?;
    match arg(vm, &frame, 0) {
        Value::Bytes(b) => match std::str::from_utf8(&b) {
            Ok(text) => Ok(Value::str(text)),
            Err(e) => Err(VmError::new(
                ErrorKind::ValueError,
                format!("'utf-8' codec can't decode bytes: {}", e),
            )),
        },
        other => Err(ScriptError::type_error(format!(
            "descriptor 'decode' requires a 'bytes' object but received a '{}'",
            vm.type_name(&other)
        ))
        .into()),
    }
}

// ----------------------------------------------------------------------
// generator
// ----------------------------------------------------------------------

fn generator_send(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("send", 2, 2)?;
    let generator = arg(vm, &frame, 0);
    let sent = arg(vm, &frame, 1);
    match vm.resume(&generator, sent)? {
        GeneratorStep::Yielded(value) => Ok(value),
        GeneratorStep::Returned(value) => Err(VmError::StopIteration(value)),
    }
}

fn generator_next(vm: &mut Vm, frame: CallFrame) -> VmResult<Value> {
    frame.expect("__next__", 1, 1)?;
    let generator = arg(vm, &frame, 0);
    match vm.resume(&generator, Value::None)? {
        GeneratorStep::Yielded(value) => Ok(value),
        GeneratorStep::Returned(value) => Err(VmError::StopIteration(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CaptureSink;
    use parser::CompileMode;

    fn run(source: &str) -> (Vm, Rc<CaptureSink>) {
        let mut vm = Vm::new();
        let sink = Rc::new(CaptureSink::new());
        vm.set_output(sink.clone());
        let main = vm.main_module();
        vm.compile_exec(source, "<test>", CompileMode::Exec, main)
            .unwrap();
        (vm, sink)
    }

    fn eval(vm: &mut Vm, source: &str) -> Value {
        let main = vm.main_module();
        vm.compile_exec(source, "<test>", CompileMode::Eval, main)
            .unwrap()
    }

    #[test]
    fn test_print_joins_with_spaces() {
        let (_vm, sink) = run("print('a', 1, 2.5, None, True)\n");
        assert_eq!(sink.stdout_text(), "a 1 2.5 None True\n");
    }

    #[test]
    fn test_list_methods() {
        let (mut vm, _) = run("xs = [3, 1, 2]\nxs.append(0)\nxs.sort()\nlast = xs.pop()\n");
        assert_eq!(eval(&mut vm, "last"), Value::Int(3));
        assert_eq!(eval(&mut vm, "xs == [0, 1, 2]"), Value::Bool(true));
    }

    #[test]
    fn test_dict_methods() {
        let (mut vm, _) = run("d = {'a': 1}\nd.update({'b': 2})\nv = d.get('c', 9)\n");
        assert_eq!(eval(&mut vm, "v"), Value::Int(9));
        assert_eq!(eval(&mut vm, "d.keys() == ['a', 'b']"), Value::Bool(true));
        assert_eq!(eval(&mut vm, "d.items()[1] == ['b', 2]"), Value::Bool(true));
    }

    #[test]
    fn test_str_methods() {
        let mut vm = Vm::new();
        assert_eq!(eval(&mut vm, "'a,b,,c'.split(',')[3]"), Value::str("c"));
        assert_eq!(eval(&mut vm, "'-'.join(['x', 'y'])"), Value::str("x-y"));
        assert_eq!(eval(&mut vm, "'  pad '.strip().upper()"), Value::str("PAD"));
        assert_eq!(eval(&mut vm, "'hello'.find('l')"), Value::Int(2));
    }

    #[test]
    fn test_int_parsing_errors() {
        let mut vm = Vm::new();
        let main = vm.main_module();
        let err = vm
            .compile_exec("int('x1')", "<test>", CompileMode::Eval, main)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
        assert_eq!(err.message, "invalid literal for int() with base 10: 'x1'");
        assert_eq!(eval(&mut vm, "int('ff', 16)"), Value::Int(255));
    }

    #[test]
    fn test_range_step_zero() {
        let mut vm = Vm::new();
        let main = vm.main_module();
        let err = vm
            .compile_exec("range(1, 2, 0)", "<test>", CompileMode::Eval, main)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
    }

    #[test]
    fn test_next_with_default() {
        let mut vm = Vm::new();
        assert_eq!(eval(&mut vm, "next(iter([]), 'empty')"), Value::str("empty"));
        assert_eq!(eval(&mut vm, "sum(range(5))"), Value::Int(10));
        assert_eq!(eval(&mut vm, "max([3, 9, 2])"), Value::Int(9));
        assert_eq!(eval(&mut vm, "min(4, 1, 8)"), Value::Int(1));
    }

    #[test]
    fn test_isinstance_with_bool_subclass() {
        let mut vm = Vm::new();
        assert_eq!(eval(&mut vm, "isinstance(True, int)"), Value::Bool(true));
        assert_eq!(eval(&mut vm, "isinstance(1, [str, float])"), Value::Bool(false));
    }

    #[test]
    fn test_sorted_mixed_types_fails() {
        let mut vm = Vm::new();
        let main = vm.main_module();
        let err = vm
            .compile_exec("sorted([1, 'a'])", "<test>", CompileMode::Eval, main)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
    }
}
