//! Source position and traceback frame types.
//!
//! This module provides types for tracking source locations and call stacks
//! in script execution.

use std::fmt;

/// Represents a position in source code.
///
/// Lines and columns are 1-indexed; `offset` is the byte offset from the
/// start of the compiled unit.
///
/// # Examples
///
/// ```
/// use core_types::SourcePosition;
///
/// let pos = SourcePosition::new(10, 5, 150);
/// assert_eq!(pos.line, 10);
/// assert_eq!(pos.to_string(), "line 10, column 5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
    /// Byte offset from the start of the source unit
    pub offset: usize,
}

impl SourcePosition {
    /// Creates a new source position.
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Represents a single frame in a script traceback.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame {
///     function_name: Some("compute".to_string()),
///     filename: "main.py".to_string(),
///     line: 25,
/// };
///
/// assert_eq!(frame.to_string(), "  File \"main.py\", line 25, in compute");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the function, or None for module level code
    pub function_name: Option<String>,
    /// Filename the code was compiled from
    pub filename: String,
    /// Line number being executed in this frame
    pub line: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  File \"{}\", line {}, in {}",
            self.filename,
            self.line,
            self.function_name.as_deref().unwrap_or("<module>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_position_creation() {
        let pos = SourcePosition::new(10, 5, 150);
        assert_eq!(pos.line, 10);
        assert_eq!(pos.column, 5);
        assert_eq!(pos.offset, 150);
    }

    #[test]
    fn test_module_frame_display() {
        let frame = StackFrame {
            function_name: None,
            filename: "<string>".to_string(),
            line: 1,
        };
        assert_eq!(frame.to_string(), "  File \"<string>\", line 1, in <module>");
    }
}
