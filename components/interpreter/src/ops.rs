//! Operators, truthiness and text conversion

use std::cmp::Ordering;

use bytecode_system::{BinaryOp, CompareOp, UnaryOp};
use core_types::{ErrorKind, ScriptError};

use crate::error::{VmError, VmResult};
use crate::object::*;
use crate::value::{bytes_repr, float_repr, str_repr, Value};
use crate::vm::Vm;

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Int(n) => Some(Num::Int(*n)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn float(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }
}

fn overflow() -> VmError {
    VmError::new(ErrorKind::ValueError, "integer overflow")
}

fn zero_division(message: &str) -> VmError {
    VmError::new(ErrorKind::ZeroDivisionError, message)
}

fn dunder(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "__add__",
        BinaryOp::Sub => "__sub__",
        BinaryOp::Mul => "__mul__",
        BinaryOp::Div => "__truediv__",
        BinaryOp::FloorDiv => "__floordiv__",
        BinaryOp::Mod => "__mod__",
        BinaryOp::Pow => "__pow__",
    }
}

fn python_mod_int(a: i64, b: i64) -> VmResult<i64> {
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    Ok(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn python_mod_float(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else {
        r
    }
}

fn repeat_count(n: &Value) -> Option<usize> {
    match n {
        Value::Int(n) => Some((*n).max(0) as usize),
        Value::Bool(b) => Some(*b as usize),
        _ => None,
    }
}

fn numeric(op: BinaryOp, a: Num, b: Num) -> VmResult<Value> {
    use BinaryOp::*;
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            Div => {
                if y == 0 {
                    return Err(zero_division("division by zero"));
                }
                Ok(Value::Float(x as f64 / y as f64))
            }
            FloorDiv => {
                if y == 0 {
                    return Err(zero_division("integer division or modulo by zero"));
                }
                let q = x.checked_div(y).ok_or_else(overflow)?;
                let adjust = (x % y != 0) && ((x < 0) != (y < 0));
                Ok(Value::Int(if adjust { q - 1 } else { q }))
            }
            Mod => {
                if y == 0 {
                    return Err(zero_division("integer division or modulo by zero"));
                }
                python_mod_int(x, y).map(Value::Int)
            }
            Pow => {
                if y < 0 {
                    if x == 0 {
                        return Err(zero_division("0.0 cannot be raised to a negative power"));
                    }
                    return Ok(Value::Float((x as f64).powf(y as f64)));
                }
                let exp = u32::try_from(y).map_err(|_| overflow())?;
                x.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
            }
        },
        (a, b) => {
            let (x, y) = (a.float(), b.float());
            Ok(Value::Float(match op {
                Add => x + y,
                Sub => x - y,
                Mul => x * y,
                Div => {
                    if y == 0.0 {
                        return Err(zero_division("float division by zero"));
                    }
                    x / y
                }
                FloorDiv => {
                    if y == 0.0 {
                        return Err(zero_division("float floor division by zero"));
                    }
                    (x / y).floor()
                }
                Mod => {
                    if y == 0.0 {
                        return Err(zero_division("float modulo"));
                    }
                    python_mod_float(x, y)
                }
                Pow => {
                    if x == 0.0 && y < 0.0 {
                        return Err(zero_division("0.0 cannot be raised to a negative power"));
                    }
                    x.powf(y)
                }
            }))
        }
    }
}

impl Vm {
    /// Apply a binary arithmetic operator
    pub fn binary_op(&mut self, op: BinaryOp, a: &Value, b: &Value) -> VmResult<Value> {
        if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
            return numeric(op, x, y);
        }

        match (op, a, b) {
            (BinaryOp::Add, Value::Str(x), Value::Str(y)) => {
                return Ok(Value::str(format!("{}{}", x, y)))
            }
            (BinaryOp::Add, Value::Bytes(x), Value::Bytes(y)) => {
                let mut out = x.to_vec();
                out.extend_from_slice(y);
                return Ok(Value::Bytes(out.into()));
            }
            (BinaryOp::Mul, Value::Str(s), n) | (BinaryOp::Mul, n, Value::Str(s)) => {
                if let Some(count) = repeat_count(n) {
                    return Ok(Value::str(s.repeat(count)));
                }
            }
            (BinaryOp::Mul, Value::Bytes(s), n) | (BinaryOp::Mul, n, Value::Bytes(s)) => {
                if let Some(count) = repeat_count(n) {
                    return Ok(Value::Bytes(s.repeat(count).into()));
                }
            }
            _ => {}
        }

        if let (Some(x), Some(y)) = (self.list_items(a), self.list_items(b)) {
            if op == BinaryOp::Add {
                let mut items = x;
                items.extend(y);
                return Ok(self.new_list(items));
            }
        }
        if op == BinaryOp::Mul {
            let repeated = match (self.list_items(a), self.list_items(b)) {
                (Some(items), None) => repeat_count(b).map(|n| (items, n)),
                (None, Some(items)) => repeat_count(a).map(|n| (items, n)),
                _ => None,
            };
            if let Some((items, count)) = repeated {
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                return Ok(self.new_list(out));
            }
        }

        if let Some(method) = self.lookup_type_attr(self.type_of(a), dunder(op)) {
            if matches!(a.as_object().and_then(|h| self.object(h)), Some(Object::Instance(_))) {
                return self.call(&method, &[a.clone(), b.clone()]);
            }
        }

        if let (BinaryOp::Add, Value::Str(_)) = (op, a) {
            return Err(ScriptError::type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                self.type_name(b)
            ))
            .into());
        }
        Err(ScriptError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            self.type_name(a),
            self.type_name(b)
        ))
        .into())
    }

    /// Apply `-x` or `+x`
    pub fn unary_op(&mut self, op: UnaryOp, operand: &Value) -> VmResult<Value> {
        match (op, Num::of(operand)) {
            (UnaryOp::Not, _) => Ok(Value::Bool(!self.truthy(operand)?)),
            (UnaryOp::Neg, Some(Num::Int(n))) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
            (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
            (UnaryOp::Pos, Some(Num::Int(n))) => Ok(Value::Int(n)),
            (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
            (_, None) => {
                let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
                Err(ScriptError::type_error(format!(
                    "bad operand type for unary {}: '{}'",
                    symbol,
                    self.type_name(operand)
                ))
                .into())
            }
        }
    }

    /// Apply a comparison operator
    pub fn compare_op(&mut self, op: CompareOp, a: &Value, b: &Value) -> VmResult<Value> {
        let result = match op {
            CompareOp::Eq => self.values_equal(a, b),
            CompareOp::Ne => !self.values_equal(a, b),
            CompareOp::Is => a.is(b),
            CompareOp::IsNot => !a.is(b),
            CompareOp::In => self.contains(b, a)?,
            CompareOp::NotIn => !self.contains(b, a)?,
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                match self.ordering(a, b, op)? {
                    None => false,
                    Some(ordering) => match op {
                        CompareOp::Lt => ordering == Ordering::Less,
                        CompareOp::Le => ordering != Ordering::Greater,
                        CompareOp::Gt => ordering == Ordering::Greater,
                        _ => ordering != Ordering::Less,
                    },
                }
            }
        };
        Ok(Value::Bool(result))
    }

    /// Order two values; `None` when unordered (NaN)
    pub(crate) fn ordering(
        &self,
        a: &Value,
        b: &Value,
        op: CompareOp,
    ) -> VmResult<Option<Ordering>> {
        if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
            return Ok(match (x, y) {
                (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
                (x, y) => x.float().partial_cmp(&y.float()),
            });
        }
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => return Ok(Some(x.cmp(y))),
            (Value::Bytes(x), Value::Bytes(y)) => return Ok(Some(x.cmp(y))),
            _ => {}
        }
        if let (Some(x), Some(y)) = (self.list_items(a), self.list_items(b)) {
            for (p, q) in x.iter().zip(y.iter()) {
                if !self.values_equal(p, q) {
                    return self.ordering(p, q, op);
                }
            }
            return Ok(Some(x.len().cmp(&y.len())));
        }
        Err(ScriptError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            self.type_name(a),
            self.type_name(b)
        ))
        .into())
    }

    /// Structural equality: numbers across int and float, lists and dicts
    /// element-wise, other objects by identity
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
            return match (x, y) {
                (Num::Int(x), Num::Int(y)) => x == y,
                (x, y) => x.float() == y.float(),
            };
        }
        match (a, b) {
            (Value::None, Value::None) => true,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Bytes(x), Value::Bytes(y)) => x == y,
            (Value::Object(x), Value::Object(y)) => {
                if x == y {
                    return true;
                }
                match (self.object(*x), self.object(*y)) {
                    (Some(Object::List(p)), Some(Object::List(q))) => {
                        p.len() == q.len()
                            && p.iter().zip(q.iter()).all(|(u, v)| self.values_equal(u, v))
                    }
                    (Some(Object::Dict(p)), Some(Object::Dict(q))) => {
                        p.len() == q.len()
                            && p.iter().all(|(k, v)| {
                                self.hash_key(k)
                                    .ok()
                                    .and_then(|key| q.get(&key))
                                    .map(|w| self.values_equal(v, w))
                                    .unwrap_or(false)
                            })
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Membership test `item in container`
    pub fn contains(&mut self, container: &Value, item: &Value) -> VmResult<bool> {
        match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(&**needle)),
                other => Err(ScriptError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    self.type_name(other)
                ))
                .into()),
            },
            Value::Bytes(haystack) => match item {
                Value::Bytes(needle) => Ok(needle.is_empty()
                    || haystack.windows(needle.len()).any(|w| w == &needle[..])),
                Value::Int(byte) => Ok(haystack.iter().any(|b| i64::from(*b) == *byte)),
                other => Err(ScriptError::type_error(format!(
                    "a bytes-like object is required, not '{}'",
                    self.type_name(other)
                ))
                .into()),
            },
            Value::Object(handle) => match self.get_object(*handle)? {
                Object::List(items) => Ok(items.iter().any(|v| self.values_equal(v, item))),
                Object::Dict(dict) => {
                    let key = self.hash_key(item)?;
                    Ok(dict.contains(&key))
                }
                Object::Instance(_) => {
                    match self.lookup_type_attr(self.type_of(container), "__contains__") {
                        Some(method) => {
                            let result = self.call(&method, &[container.clone(), item.clone()])?;
                            self.truthy(&result)
                        }
                        None => Err(self.not_iterable_container(container)),
                    }
                }
                _ => Err(self.not_iterable_container(container)),
            },
            _ => Err(self.not_iterable_container(container)),
        }
    }

    fn not_iterable_container(&self, container: &Value) -> VmError {
        ScriptError::type_error(format!(
            "argument of type '{}' is not iterable",
            self.type_name(container)
        ))
        .into()
    }

    /// Truth value of `value`
    pub fn truthy(&mut self, value: &Value) -> VmResult<bool> {
        Ok(match value {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Object(handle) => match self.get_object(*handle)? {
                Object::List(items) => !items.is_empty(),
                Object::Dict(dict) => !dict.is_empty(),
                Object::Instance(_) => {
                    let ty = self.type_of(value);
                    if let Some(method) = self.lookup_type_attr(ty, "__bool__") {
                        let result = self.call(&method, &[value.clone()])?;
                        return self.truthy(&result);
                    }
                    if let Some(method) = self.lookup_type_attr(ty, "__len__") {
                        let result = self.call(&method, &[value.clone()])?;
                        return Ok(result.as_int().unwrap_or(0) != 0);
                    }
                    true
                }
                _ => true,
            },
        })
    }

    /// `repr(value)`
    pub fn repr(&mut self, value: &Value) -> VmResult<String> {
        let handle = match value {
            Value::Object(handle) => *handle,
            scalar => return Ok(scalar_repr(scalar)),
        };

        enum Shape {
            List(Vec<Value>),
            Dict(Vec<(Value, Value)>),
            Instance,
            Text(String),
        }

        let shape = match self.get_object(handle)? {
            Object::List(items) => Shape::List(items.clone()),
            Object::Dict(dict) => Shape::Dict(
                dict.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            Object::Instance(_) => Shape::Instance,
            other => Shape::Text(self.describe(handle, other)),
        };

        match shape {
            Shape::Text(text) => Ok(text),
            Shape::List(items) => self.with_repr_guard(handle, "[...]", |vm| {
                let parts = items
                    .iter()
                    .map(|item| vm.repr(item))
                    .collect::<VmResult<Vec<_>>>()?;
                Ok(format!("[{}]", parts.join(", ")))
            }),
            Shape::Dict(entries) => self.with_repr_guard(handle, "{...}", |vm| {
                let mut parts = Vec::with_capacity(entries.len());
                for (k, v) in &entries {
                    parts.push(format!("{}: {}", vm.repr(k)?, vm.repr(v)?));
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }),
            Shape::Instance => {
                let ty = self.type_of(value);
                match self.lookup_type_attr(ty, "__repr__") {
                    Some(method) => {
                        let result = self.call(&method, &[value.clone()])?;
                        match result {
                            Value::Str(s) => Ok(s.to_string()),
                            other => Err(ScriptError::type_error(format!(
                                "__repr__ returned non-string (type {})",
                                self.type_name(&other)
                            ))
                            .into()),
                        }
                    }
                    None => Ok(format!("<{} object>", self.qualified_type_name(ty))),
                }
            }
        }
    }

    fn with_repr_guard(
        &mut self,
        handle: memory_manager::ObjRef,
        placeholder: &str,
        f: impl FnOnce(&mut Vm) -> VmResult<String>,
    ) -> VmResult<String> {
        if self.repr_guard.contains(&handle) {
            return Ok(placeholder.to_string());
        }
        self.repr_guard.push(handle);
        let result = f(self);
        self.repr_guard.pop();
        result
    }

    fn qualified_type_name(&self, ty: memory_manager::ObjRef) -> String {
        self.type_object(ty)
            .map(|t| match &t.module {
                Some(_) => t.qualified_name(),
                None => format!("__main__.{}", t.name),
            })
            .unwrap_or_else(|| "object".to_string())
    }

    fn describe(&self, handle: memory_manager::ObjRef, object: &Object) -> String {
        match object {
            Object::Function(f) => format!("<function {}>", f.name),
            Object::Native(f) => format!("<built-in function {}>", f.name),
            Object::BoundMethod { receiver, function } => {
                let name = function
                    .as_object()
                    .and_then(|h| self.object(h))
                    .map(|o| match o {
                        Object::Function(f) => f.name.to_string(),
                        Object::Native(f) => f.name.to_string(),
                        other => other.kind_name().to_string(),
                    })
                    .unwrap_or_default();
                format!("<bound method {} of {} object>", name, self.type_name(receiver))
            }
            Object::Module(m) => format!("<module '{}'>", m.name),
            Object::Type(t) => format!("<class '{}'>", t.qualified_name()),
            Object::Generator(g) => format!("<generator object {}>", g.name),
            Object::Exception(e) => {
                let name = self
                    .type_object(e.class)
                    .map(|t| t.name.to_string())
                    .unwrap_or_else(|| e.error.kind.name().to_string());
                if e.error.message.is_empty() {
                    format!("{}()", name)
                } else {
                    format!("{}({})", name, str_repr(&e.error.message))
                }
            }
            other => format!("<{} object at {:#x}>", other.kind_name(), handle.index()),
        }
    }

    /// `repr` that never runs script code
    pub(crate) fn repr_lossy(&self, value: &Value) -> String {
        match value {
            Value::Object(handle) => match self.object(*handle) {
                Some(Object::Instance(_)) | None => format!("<{} object>", self.type_name(value)),
                Some(Object::List(_)) => "[...]".to_string(),
                Some(Object::Dict(_)) => "{...}".to_string(),
                Some(other) => self.describe(*handle, other),
            },
            scalar => scalar_repr(scalar),
        }
    }

    /// `str(value)`
    pub fn to_str(&mut self, value: &Value) -> VmResult<String> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Object(handle) => match self.get_object(*handle)? {
                Object::Exception(e) => Ok(e.error.message.clone()),
                Object::Instance(_) => {
                    match self.lookup_type_attr(self.type_of(value), "__str__") {
                        Some(method) => match self.call(&method, &[value.clone()])? {
                            Value::Str(s) => Ok(s.to_string()),
                            other => Err(ScriptError::type_error(format!(
                                "__str__ returned non-string (type {})",
                                self.type_name(&other)
                            ))
                            .into()),
                        },
                        None => self.repr(value),
                    }
                }
                _ => self.repr(value),
            },
            other => self.repr(other),
        }
    }
}

fn scalar_repr(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => float_repr(*f),
        Value::Str(s) => str_repr(s),
        Value::Bytes(b) => bytes_repr(b),
        Value::Object(_) => "<object>".to_string(),
    }
}
