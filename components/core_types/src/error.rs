//! Script exception kinds and the error value raised across the runtime.
//!
//! [`ErrorKind`] mirrors the exception classes visible to scripts. The
//! iterator-exhausted signal used by generators is deliberately absent: it is
//! a control signal of the interpreter, not an exception kind.

use std::fmt;

use thiserror::Error;

use crate::{SourcePosition, StackFrame};

/// Result alias for operations that can raise a script exception.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// The kind of a script exception.
///
/// Each kind corresponds to a builtin exception class of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Base class of every script exception
    Exception,
    /// Source failed to compile
    SyntaxError,
    /// Arity or type mismatch
    TypeError,
    /// Malformed value or too few arguments for a variadic minimum
    ValueError,
    /// Unresolved attribute lookup
    AttributeError,
    /// Unresolved name lookup
    NameError,
    /// Missing mapping key
    KeyError,
    /// Sequence index out of range
    IndexError,
    /// Opaque failure with no more specific kind
    RuntimeError,
    /// Module could not be imported
    ImportError,
    /// Failed `assert` statement
    AssertionError,
    /// Division or modulo by zero
    ZeroDivisionError,
    /// Operating system or IO failure
    OSError,
    /// Operation not implemented
    NotImplementedError,
    /// Call depth exceeded
    RecursionError,
    /// Local variable read before assignment
    UnboundLocalError,
}

impl ErrorKind {
    /// Every kind, base class first.
    pub const ALL: [ErrorKind; 16] = [
        ErrorKind::Exception,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::ValueError,
        ErrorKind::AttributeError,
        ErrorKind::NameError,
        ErrorKind::KeyError,
        ErrorKind::IndexError,
        ErrorKind::RuntimeError,
        ErrorKind::ImportError,
        ErrorKind::AssertionError,
        ErrorKind::ZeroDivisionError,
        ErrorKind::OSError,
        ErrorKind::NotImplementedError,
        ErrorKind::RecursionError,
        ErrorKind::UnboundLocalError,
    ];

    /// Returns the script-visible class name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Exception => "Exception",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::NameError => "NameError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::RuntimeError => "RuntimeError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::AssertionError => "AssertionError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::OSError => "OSError",
            ErrorKind::NotImplementedError => "NotImplementedError",
            ErrorKind::RecursionError => "RecursionError",
            ErrorKind::UnboundLocalError => "UnboundLocalError",
        }
    }

    /// Looks up a kind by its class name.
    ///
    /// # Example
    ///
    /// ```
    /// use core_types::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::from_name("KeyError"), Some(ErrorKind::KeyError));
    /// assert_eq!(ErrorKind::from_name("StopIteration"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<ErrorKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Returns the parent class of this kind, `None` for [`ErrorKind::Exception`].
    pub fn base(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Exception => None,
            ErrorKind::UnboundLocalError => Some(ErrorKind::NameError),
            ErrorKind::NotImplementedError | ErrorKind::RecursionError => {
                Some(ErrorKind::RuntimeError)
            }
            _ => Some(ErrorKind::Exception),
        }
    }

    /// Returns true if `self` is `other` or derives from it.
    pub fn is_subclass_of(self, other: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.base();
        }
        false
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raised script exception with traceback.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, ScriptError, SourcePosition};
///
/// let error = ScriptError::new(ErrorKind::SyntaxError, "invalid syntax")
///     .with_position(SourcePosition::new(3, 7, 40));
///
/// assert_eq!(error.summary(), "SyntaxError: invalid syntax");
/// assert_eq!(error.source_position.map(|p| p.line), Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    /// The exception class
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Traceback, outermost frame first
    pub traceback: Vec<StackFrame>,
    /// Source position where the error occurred, if known
    pub source_position: Option<SourcePosition>,
}

impl ScriptError {
    /// Creates an error without traceback.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceback: Vec::new(),
            source_position: None,
        }
    }

    /// Attaches a source position.
    pub fn with_position(mut self, position: SourcePosition) -> Self {
        self.source_position = Some(position);
        self
    }

    /// Shorthand for a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Shorthand for a `ValueError`.
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    /// Shorthand for a `RuntimeError`.
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }

    /// Shorthand for a `NameError` about an undefined name.
    pub fn name_error(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
    }

    /// Shorthand for an `AttributeError`.
    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            ErrorKind::AttributeError,
            format!("'{}' object has no attribute '{}'", type_name, attr),
        )
    }

    /// Records a frame on the way out of a call.
    ///
    /// Frames are pushed innermost first while unwinding and stored outermost
    /// first.
    pub fn push_frame(&mut self, frame: StackFrame) {
        self.traceback.insert(0, frame);
    }

    /// Returns `Kind: message`.
    pub fn summary(&self) -> String {
        self.to_string()
    }

    /// Renders the full traceback the way the REPL prints it.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.traceback.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for frame in &self.traceback {
                out.push_str(&frame.to_string());
                out.push('\n');
            }
        }
        out.push_str(&self.summary());
        out
    }
}
