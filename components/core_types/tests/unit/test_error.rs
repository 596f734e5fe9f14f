//! Unit tests for ScriptError and ErrorKind

use core_types::{ErrorKind, ScriptError, SourcePosition, StackFrame};

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_error_kind_display_matches_class_name() {
        assert_eq!(ErrorKind::ZeroDivisionError.to_string(), "ZeroDivisionError");
        assert_eq!(ErrorKind::OSError.to_string(), "OSError");
    }

    #[test]
    fn test_error_kind_unknown_name() {
        assert_eq!(ErrorKind::from_name("Warning"), None);
    }

    #[test]
    fn test_every_kind_derives_from_exception() {
        for kind in ErrorKind::ALL {
            assert!(kind.is_subclass_of(ErrorKind::Exception), "{}", kind);
        }
    }

    #[test]
    fn test_exception_has_no_base() {
        assert_eq!(ErrorKind::Exception.base(), None);
    }
}

#[cfg(test)]
mod script_error_tests {
    use super::*;

    #[test]
    fn test_shorthand_constructors() {
        assert_eq!(ScriptError::type_error("x").kind, ErrorKind::TypeError);
        assert_eq!(ScriptError::value_error("x").kind, ErrorKind::ValueError);
        assert_eq!(ScriptError::runtime_error("x").kind, ErrorKind::RuntimeError);
    }

    #[test]
    fn test_name_error_message() {
        let error = ScriptError::name_error("spam");
        assert_eq!(error.summary(), "NameError: name 'spam' is not defined");
    }

    #[test]
    fn test_attribute_error_message() {
        let error = ScriptError::attribute_error("int", "upper");
        assert_eq!(error.message, "'int' object has no attribute 'upper'");
    }

    #[test]
    fn test_render_without_traceback_is_summary() {
        let error = ScriptError::new(ErrorKind::KeyError, "'missing'");
        assert_eq!(error.render(), "KeyError: 'missing'");
    }

    #[test]
    fn test_with_position() {
        let error = ScriptError::new(ErrorKind::SyntaxError, "invalid syntax")
            .with_position(SourcePosition::new(2, 4, 12));
        assert_eq!(error.source_position, Some(SourcePosition::new(2, 4, 12)));
    }

    #[test]
    fn test_push_frame_keeps_outermost_first() {
        let mut error = ScriptError::runtime_error("boom");
        error.push_frame(StackFrame {
            function_name: Some("leaf".to_string()),
            filename: "a.py".to_string(),
            line: 9,
        });
        error.push_frame(StackFrame {
            function_name: Some("root".to_string()),
            filename: "a.py".to_string(),
            line: 1,
        });
        assert_eq!(error.traceback[0].function_name.as_deref(), Some("root"));
        assert_eq!(error.traceback[1].function_name.as_deref(), Some("leaf"));
    }

    #[test]
    fn test_is_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&ScriptError::runtime_error("x"));
    }
}
