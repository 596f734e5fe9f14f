//! Unit tests for SourcePosition and StackFrame

use core_types::{SourcePosition, StackFrame};

#[test]
fn test_source_position_default() {
    let pos = SourcePosition::default();
    assert_eq!(pos.line, 0);
    assert_eq!(pos.offset, 0);
}

#[test]
fn test_source_position_display() {
    assert_eq!(SourcePosition::new(4, 2, 30).to_string(), "line 4, column 2");
}

#[test]
fn test_stack_frame_function_display() {
    let frame = StackFrame {
        function_name: Some("handler".to_string()),
        filename: "<repl>".to_string(),
        line: 3,
    };
    assert_eq!(frame.to_string(), "  File \"<repl>\", line 3, in handler");
}
