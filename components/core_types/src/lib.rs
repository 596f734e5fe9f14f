//! Core error taxonomy and source location types for the script runtime.
//!
//! This crate provides the foundational types shared by every component:
//! the script exception kinds, the error value carried across the host
//! boundary, and source location tracking for tracebacks.
//!
//! # Overview
//!
//! - [`ErrorKind`] - Script exception kinds (`TypeError`, `ValueError`, ...)
//! - [`ScriptError`] - A raised script exception with traceback
//! - [`ScriptResult`] - Result alias used across the workspace
//! - [`SourcePosition`] - Source code location
//! - [`StackFrame`] - Traceback frame information
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, ScriptError};
//!
//! let error = ScriptError::new(ErrorKind::TypeError, "expected int at position 0, got str");
//! assert_eq!(error.kind, ErrorKind::TypeError);
//! assert_eq!(error.to_string(), "TypeError: expected int at position 0, got str");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod source;

pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use source::{SourcePosition, StackFrame};
