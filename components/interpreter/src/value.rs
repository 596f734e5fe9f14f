//! Script values
//!
//! Scalars live inline; everything else is an [`ObjRef`] into the VM heap.

use std::fmt;
use std::rc::Rc;

use memory_manager::ObjRef;

/// A script value
///
/// Cloning is cheap: strings and byte buffers are reference counted and
/// objects are plain handles. An `Object` handle is only valid while the
/// object is reachable from a GC root.
#[derive(Clone)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Double precision float
    Float(f64),
    /// Immutable string
    Str(Rc<str>),
    /// Immutable byte string
    Bytes(Rc<[u8]>),
    /// Heap object
    Object(ObjRef),
}

impl Value {
    /// Build a string value
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Returns true for `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The heap handle, if this is an object
    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    /// The integer payload; booleans are not integers here
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity comparison (`is`)
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Bytes(a), Value::Bytes(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(n) => write!(f, "Float({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
            Value::Object(handle) => write!(f, "Object({:?})", handle),
        }
    }
}

/// Shallow equality: scalars by value, objects by identity.
///
/// Script-level `==` on containers compares contents and needs the heap; see
/// [`crate::Vm::values_equal`].
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => self.is(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<ObjRef> for Value {
    fn from(handle: ObjRef) -> Self {
        Value::Object(handle)
    }
}

/// Hashable projection of a value used as a dict key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// `None`
    None,
    /// Integers, booleans and integral floats (`1 == 1.0 == True`)
    Int(i64),
    /// Non-integral floats by bit pattern
    Float(u64),
    /// Strings
    Str(Rc<str>),
    /// Byte strings
    Bytes(Rc<[u8]>),
    /// Objects by identity
    Object(ObjRef),
}

/// Formats a float the way `repr(float)` does.
///
/// Shortest round-trip digits come from `ryu`; the layout switches to
/// exponent form below `1e-4` and from `1e16` upward.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let mut buffer = ryu::Buffer::new();
    let formatted = buffer.format_finite(f);
    let (negative, body) = match formatted.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, formatted),
    };
    let (mantissa, exponent) = match body.split_once(|c| c == 'e' || c == 'E') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (body, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let all_digits = format!("{}{}", int_part, frac_part);
    let mut point = int_part.len() as i32 + exponent;
    let trimmed = all_digits.trim_start_matches('0');
    point -= (all_digits.len() - trimmed.len()) as i32;
    let digits = trimmed.trim_end_matches('0');

    let sign = if negative { "-" } else { "" };
    if digits.is_empty() {
        return format!("{}0.0", sign);
    }

    let exp10 = point - 1;
    let len = digits.len() as i32;
    let body = if (-4..16).contains(&exp10) {
        if point <= 0 {
            format!("0.{}{}", "0".repeat((-point) as usize), digits)
        } else if point >= len {
            format!("{}{}.0", digits, "0".repeat((point - len) as usize))
        } else {
            let (a, b) = digits.split_at(point as usize);
            format!("{}.{}", a, b)
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let mantissa = if rest.is_empty() {
            first.to_string()
        } else {
            format!("{}.{}", first, rest)
        };
        let exp_sign = if exp10 < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, exp_sign, exp10.abs())
    };
    format!("{}{}", sign, body)
}

/// Quotes a string the way `repr(str)` does
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Quotes a byte string the way `repr(bytes)` does
pub fn bytes_repr(bytes: &[u8]) -> String {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    let mut out = String::from("b");
    out.push(quote as char);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b == quote => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            b => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push(quote as char);
    out
}
