//! Bridge and host error types

use std::num::{ParseFloatError, ParseIntError};

use core_types::{ErrorKind, ScriptError};
use interpreter::{Value, VmError};
use thiserror::Error;

/// Result alias for registration
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Result alias for host closures
pub type HostResult<T> = Result<T, HostError>;

/// Failure to make a host type or function visible to scripts
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// A signature did not fit the host closure it describes
    #[error("cannot register {owner}.{operation}: {reason}")]
    Registration {
        /// Type or module being registered
        owner: String,
        /// Operation that failed
        operation: String,
        /// What was wrong, naming the offending parameter
        reason: String,
    },
    /// The VM rejected an operation during registration
    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl BridgeError {
    pub(crate) fn registration(
        owner: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BridgeError::Registration {
            owner: owner.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl From<VmError> for BridgeError {
    fn from(error: VmError) -> Self {
        BridgeError::Script(error.into_script_error())
    }
}

impl From<BridgeError> for ScriptError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Script(e) => e,
            other => ScriptError::runtime_error(other.to_string()),
        }
    }
}

impl From<BridgeError> for VmError {
    fn from(error: BridgeError) -> Self {
        VmError::Exception(error.into())
    }
}

/// Error returned by a host closure
///
/// Translated into the nearest script exception when it crosses back into
/// the VM; the display text becomes the exception message.
#[derive(Debug, Error)]
pub enum HostError {
    /// Raise a specific exception kind
    #[error("{1}")]
    Script(ErrorKind, String),
    /// Filesystem or OS failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Malformed integer text
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    /// Malformed float text
    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),
    /// Invalid UTF-8 in borrowed bytes
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
    /// Invalid UTF-8 in owned bytes
    #[error(transparent)]
    FromUtf8(#[from] std::string::FromUtf8Error),
    /// Iterator exhausted, carrying its final value
    #[error("StopIteration")]
    Exhausted(Value),
    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl HostError {
    /// Raise `kind` with `message`
    pub fn script(kind: ErrorKind, message: impl Into<String>) -> Self {
        HostError::Script(kind, message.into())
    }

    /// Opaque failure, raised as RuntimeError
    pub fn msg(message: impl std::fmt::Display) -> Self {
        HostError::Other(message.to_string())
    }

    /// Exception kind this error is raised as
    pub fn kind(&self) -> ErrorKind {
        match self {
            HostError::Script(kind, _) => *kind,
            HostError::Io(_) => ErrorKind::OSError,
            HostError::ParseInt(_)
            | HostError::ParseFloat(_)
            | HostError::Utf8(_)
            | HostError::FromUtf8(_) => ErrorKind::ValueError,
            HostError::Exhausted(_) | HostError::Other(_) => ErrorKind::RuntimeError,
        }
    }

    /// Convert for return from a native entry point
    pub fn into_vm_error(self) -> VmError {
        match self {
            HostError::Exhausted(value) => VmError::StopIteration(value),
            other => VmError::new(other.kind(), other.to_string()),
        }
    }
}

impl From<ScriptError> for HostError {
    fn from(error: ScriptError) -> Self {
        HostError::Script(error.kind, error.message)
    }
}

impl From<VmError> for HostError {
    fn from(error: VmError) -> Self {
        match error {
            VmError::Exception(e) => e.into(),
            VmError::StopIteration(value) => HostError::Exhausted(value),
        }
    }
}

impl From<BridgeError> for HostError {
    fn from(error: BridgeError) -> Self {
        ScriptError::from(error).into()
    }
}
