//! Await rewriting
//!
//! A unit of source is split at its first top-level line of the form
//!
//! ```text
//! [name =] await dotted.call(args...)   [# comment]
//! ```
//!
//! Lines before it plus the bare call form the prefix that runs now. The
//! lines after it are the continuation that runs once the awaited task
//! completes, with `name` bound to the result. Argument lists may nest
//! brackets and contain string literals; a call spanning several lines or
//! an `await` inside an indented block is not matched.

/// Result of scanning one unit of source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Lines before the await line, verbatim; the whole unit when nothing matched
    pub preamble: String,
    /// The awaited call expression, without `await` and the binding
    pub call: Option<String>,
    /// Lines after the await line, verbatim
    pub continuation: Option<String>,
    /// Name the awaited result is bound to
    pub result_name: Option<String>,
}

impl Rewrite {
    /// Split `source` at its first await line
    pub fn parse(source: &str) -> Rewrite {
        let lines: Vec<&str> = source.lines().collect();
        for (index, line) in lines.iter().enumerate() {
            if let Some(found) = match_await(line) {
                let rest = &lines[index + 1..];
                return Rewrite {
                    preamble: lines[..index].join("\n"),
                    call: Some(found.call.to_string()),
                    continuation: (!rest.is_empty()).then(|| rest.join("\n")),
                    result_name: found.name.map(str::to_string),
                };
            }
        }
        Rewrite {
            preamble: source.to_string(),
            call: None,
            continuation: None,
            result_name: None,
        }
    }

    /// Whether an await line was found
    pub fn is_match(&self) -> bool {
        self.call.is_some()
    }

    /// Everything that runs before suspending: the preamble and the bare call
    pub fn prefix(&self) -> String {
        match &self.call {
            Some(call) if self.preamble.is_empty() => call.clone(),
            Some(call) => format!("{}\n{}", self.preamble, call),
            None => self.preamble.clone(),
        }
    }
}

/// An await line split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitLine<'a> {
    /// Binding target
    pub name: Option<&'a str>,
    /// Call expression
    pub call: &'a str,
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_spaces(&mut self) -> usize {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches([' ', '\t']);
        let skipped = rest.len() - trimmed.len();
        self.pos += skipped;
        skipped
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        if !rest.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            return None;
        }
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        Some(&rest[..len])
    }

    fn eat(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consume a bracketed argument list starting at `(`
    fn arguments(&mut self) -> Option<()> {
        let mut depth: Vec<char> = Vec::new();
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for (offset, c) in self.rest().char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth.push(c),
                ')' | ']' | '}' => {
                    let open = depth.pop()?;
                    let expected = match open {
                        '(' => ')',
                        '[' => ']',
                        _ => '}',
                    };
                    if c != expected {
                        return None;
                    }
                    if depth.is_empty() {
                        self.pos += offset + 1;
                        return Some(());
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Only trailing whitespace or a comment remains
    fn at_line_end(&mut self) -> bool {
        self.skip_spaces();
        let rest = self.rest();
        rest.is_empty() || rest.starts_with('#') || rest.trim().is_empty()
    }
}

/// Match one line against `[name =] await call(...)`
///
/// Indented lines never match.
pub fn match_await(line: &str) -> Option<AwaitLine<'_>> {
    let mut scanner = Scanner { text: line, pos: 0 };

    let first = scanner.ident()?;
    let name = if first == "await" {
        None
    } else {
        scanner.skip_spaces();
        if !scanner.eat('=') || scanner.rest().starts_with('=') {
            return None;
        }
        scanner.skip_spaces();
        if scanner.ident()? != "await" {
            return None;
        }
        Some(first)
    };
    if scanner.skip_spaces() == 0 {
        return None;
    }

    let start = scanner.pos;
    scanner.ident()?;
    while scanner.eat('.') {
        scanner.ident()?;
    }
    scanner.skip_spaces();
    if !scanner.rest().starts_with('(') {
        return None;
    }
    scanner.arguments()?;
    let call = &line[start..scanner.pos];
    if !scanner.at_line_end() {
        return None;
    }
    Some(AwaitLine { name, call })
}
