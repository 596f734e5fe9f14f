//! Compile-time constants stored in a chunk's constant pool.

use std::fmt;
use std::rc::Rc;

use crate::BytecodeChunk;

/// A literal value known at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(Rc<str>),
    /// Bytes literal
    Bytes(Rc<[u8]>),
    /// Nested function body
    Code(Rc<BytecodeChunk>),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(n) => write!(f, "{:?}", n),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Bytes(b) => write!(f, "b<{} bytes>", b.len()),
            Constant::Code(code) => write!(f, "<code {}>", code.name),
        }
    }
}
