//! Parser error types and helpers

use core_types::{ErrorKind, ScriptError, SourcePosition};

/// Create a syntax error at a given position
pub fn syntax_error(message: impl Into<String>, position: SourcePosition) -> ScriptError {
    ScriptError::new(ErrorKind::SyntaxError, message).with_position(position)
}

/// Create an unexpected token error
pub fn unexpected_token(expected: &str, got: &str, position: SourcePosition) -> ScriptError {
    syntax_error(format!("expected {}, got {}", expected, got), position)
}

/// Create an unexpected end of input error
///
/// The message is stable: interactive front ends use it to detect that more
/// input is needed.
pub fn unexpected_eof(position: SourcePosition) -> ScriptError {
    syntax_error(UNEXPECTED_EOF, position)
}

/// Message carried by [`unexpected_eof`] errors
pub const UNEXPECTED_EOF: &str = "unexpected EOF while parsing";
