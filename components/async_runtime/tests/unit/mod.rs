//! Unit tests for async runtime components

use async_runtime::{match_await, Rewrite, SchedulerConfig};
use std::time::Duration;

#[test]
fn test_rewrite_with_result_name() {
    let rewrite = Rewrite::parse("result = await f(1, 2)\nprint(result)");
    assert!(rewrite.is_match());
    assert_eq!(rewrite.prefix(), "f(1, 2)");
    assert_eq!(rewrite.continuation.as_deref(), Some("print(result)"));
    assert_eq!(rewrite.result_name.as_deref(), Some("result"));
}

#[test]
fn test_rewrite_dotted_call_without_name() {
    let rewrite = Rewrite::parse("await URL.download()\nprint('finished')");
    assert_eq!(rewrite.prefix(), "URL.download()");
    assert_eq!(rewrite.continuation.as_deref(), Some("print('finished')"));
    assert_eq!(rewrite.result_name, None);
}

#[test]
fn test_rewrite_keeps_lines_verbatim() {
    let source = "a = 1\nif a:\n    b = 2\nc = await load(a)  # slow\n\nfor i in range(3):\n    print(i)";
    let rewrite = Rewrite::parse(source);
    assert_eq!(rewrite.preamble, "a = 1\nif a:\n    b = 2");
    assert_eq!(rewrite.call.as_deref(), Some("load(a)"));
    assert_eq!(rewrite.continuation.as_deref(), Some("\nfor i in range(3):\n    print(i)"));
}

#[test]
fn test_rewrite_ignores_indented_await() {
    let source = "def g():\n    x = await f()\n    return x";
    let rewrite = Rewrite::parse(source);
    assert!(!rewrite.is_match());
    assert_eq!(rewrite.prefix(), source);
}

#[test]
fn test_rewrite_empty_source() {
    let rewrite = Rewrite::parse("");
    assert!(!rewrite.is_match());
    assert_eq!(rewrite.prefix(), "");
    assert_eq!(rewrite.continuation, None);
}

#[test]
fn test_match_strings_with_brackets_and_escapes() {
    let line = match_await(r#"x = await fetch("a)b", 'it\'s (')"#).unwrap();
    assert_eq!(line.call, r#"fetch("a)b", 'it\'s (')"#);
}

#[test]
fn test_match_spacing_variants() {
    let line = match_await("x=await  f ()").unwrap();
    assert_eq!(line.name, Some("x"));
    assert_eq!(line.call, "f ()");
    assert!(match_await("x =\tawait f()").is_some());
}

#[test]
fn test_match_rejects_attribute_targets() {
    assert_eq!(match_await("obj.x = await f()"), None);
    assert_eq!(match_await("x[0] = await f()"), None);
    assert_eq!(match_await("x += await f()"), None);
}

#[test]
fn test_scheduler_config_default() {
    let config = SchedulerConfig::default();
    assert_eq!(config.poll_interval, Duration::from_millis(1));
    let config = config.with_poll_interval(Duration::from_millis(5));
    assert_eq!(config.poll_interval, Duration::from_millis(5));
}
