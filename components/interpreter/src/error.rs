//! Errors raised while executing bytecode

use core_types::{ErrorKind, ScriptError};
use thiserror::Error;

use crate::value::Value;

/// Result alias for VM operations
pub type VmResult<T> = Result<T, VmError>;

/// Why an operation did not produce a value
#[derive(Debug, Clone, Error)]
pub enum VmError {
    /// A script exception
    #[error(transparent)]
    Exception(#[from] ScriptError),
    /// Iterator exhausted, carrying the generator's return value
    #[error("StopIteration")]
    StopIteration(Value),
}

impl VmError {
    /// Shorthand for an exception of `kind`
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        VmError::Exception(ScriptError::new(kind, message))
    }

    /// The exception kind; `None` for StopIteration
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            VmError::Exception(e) => Some(e.kind),
            VmError::StopIteration(_) => None,
        }
    }

    /// Copy out as a host-level error
    ///
    /// A StopIteration escaping to the host becomes a RuntimeError.
    pub fn to_script_error(&self) -> ScriptError {
        match self {
            VmError::Exception(e) => e.clone(),
            VmError::StopIteration(_) => {
                ScriptError::runtime_error("StopIteration escaped to the host")
            }
        }
    }

    /// Convert into a host-level error
    pub fn into_script_error(self) -> ScriptError {
        match self {
            VmError::Exception(e) => e,
            other => other.to_script_error(),
        }
    }
}
