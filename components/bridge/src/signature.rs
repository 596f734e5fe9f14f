//! Signature strings
//!
//! Every bound operation is declared with a signature of the form
//! `name(param: Type, other: Type = default) -> Return`. Lines after the
//! first are the operation's docstring. Properties use `name -> Type`.

use std::fmt;

use interpreter::value::{float_repr, str_repr};
use interpreter::Value;
use thiserror::Error;

/// Why a signature string was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Unexpected text
    #[error("expected {expected} at offset {offset}")]
    Expected {
        /// What the parser was looking for
        expected: &'static str,
        /// Byte offset into the first line
        offset: usize,
    },
    /// An annotation that is not a type expression
    #[error("unsupported annotation '{annotation}' on parameter '{param}'")]
    UnsupportedAnnotation {
        /// Parameter name, or `return`
        param: String,
        /// Annotation text
        annotation: String,
    },
    /// A default that is not a literal
    #[error("unsupported default '{default}' on parameter '{param}'")]
    UnsupportedDefault {
        /// Parameter name
        param: String,
        /// Default text
        default: String,
    },
    /// A required parameter after a defaulted one
    #[error("parameter '{0}' without a default follows a parameter with one")]
    DefaultOrder(String),
    /// Two parameters share a name
    #[error("duplicate parameter '{0}'")]
    Duplicate(String),
}

/// Literal default value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Quoted string
    Str(String),
}

impl Literal {
    /// The script value
    pub fn to_value(&self) -> Value {
        match self {
            Literal::None => Value::None,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::str(s),
        }
    }

    fn parse(text: &str) -> Option<Literal> {
        match text {
            "None" => return Some(Literal::None),
            "True" => return Some(Literal::Bool(true)),
            "False" => return Some(Literal::Bool(false)),
            _ => {}
        }
        if let Some(quote) = text.chars().next().filter(|c| *c == '\'' || *c == '"') {
            let inner = text.strip_prefix(quote)?.strip_suffix(quote)?;
            return unescape(inner, quote).map(Literal::Str);
        }
        if let Ok(n) = text.parse::<i64>() {
            return Some(Literal::Int(n));
        }
        let numeric = text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
        if numeric {
            return text.parse::<f64>().ok().map(Literal::Float);
        }
        None
    }
}

fn unescape(inner: &str, quote: char) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                _ => return None,
            },
            c if c == quote => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(x) => f.write_str(&float_repr(*x)),
            Literal::Str(s) => f.write_str(&str_repr(s)),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name
    pub name: String,
    /// Type annotation, whitespace removed
    pub annotation: Option<String>,
    /// Literal default
    pub default: Option<Literal>,
}

/// Parsed operation signature
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Operation name
    pub name: String,
    /// Declared parameters, receiver excluded
    pub params: Vec<Param>,
    /// Return annotation
    pub returns: Option<String>,
    /// Docstring from the lines after the signature
    pub doc: Option<String>,
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &'static str) -> Result<(), SignatureError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(token))
        }
    }

    fn error(&self, expected: &'static str) -> SignatureError {
        SignatureError::Expected {
            expected,
            offset: self.pos,
        }
    }

    fn ident(&mut self) -> Result<&'a str, SignatureError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(i, c)| !(c.is_alphanumeric() || *c == '_') || (*i == 0 && c.is_ascii_digit()))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// Text up to the next top-level `,` `)` or `=`, honouring brackets and
    /// string literals
    fn segment(&mut self, stops: &[char]) -> &'a str {
        self.skip_ws();
        let rest = self.rest();
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut end = rest.len();
        for (i, c) in rest.char_indices() {
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
                '[' | '(' => depth += 1,
                ']' | ')' if depth > 0 => depth -= 1,
                c if depth == 0 && stops.contains(&c) => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }
        self.pos += end;
        rest[..end].trim_end()
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.rest().is_empty()
    }
}

/// Whether `text` is a type expression: dotted names with optional
/// bracketed arguments, e.g. `int`, `list[str]`, `dict[str, list[int]]`
pub fn is_type_expression(text: &str) -> bool {
    fn parse(mut s: &str) -> Option<&str> {
        loop {
            let len = s
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(s.len());
            if len == 0 || s.starts_with(|c: char| c.is_ascii_digit()) {
                return None;
            }
            s = &s[len..];
            match s.strip_prefix('.') {
                Some(after) => s = after,
                None => break,
            }
        }
        if let Some(mut inner) = s.strip_prefix('[') {
            loop {
                inner = parse(inner.trim_start())?.trim_start();
                if let Some(after) = inner.strip_prefix(',') {
                    inner = after;
                } else {
                    return inner.strip_prefix(']');
                }
            }
        }
        Some(s)
    }
    parse(text.trim()).map(str::trim).is_some_and(str::is_empty)
}

/// Annotation text with whitespace removed
pub fn normalize(annotation: &str) -> String {
    annotation.chars().filter(|c| !c.is_whitespace()).collect()
}

fn checked_annotation(param: &str, text: &str) -> Result<String, SignatureError> {
    if is_type_expression(text) {
        Ok(normalize(text))
    } else {
        Err(SignatureError::UnsupportedAnnotation {
            param: param.to_string(),
            annotation: text.to_string(),
        })
    }
}

fn split_doc(text: &str) -> (&str, Option<String>) {
    let text = text.trim();
    match text.split_once('\n') {
        Some((header, doc)) => {
            let doc = doc
                .lines()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            (header.trim(), (!doc.is_empty()).then_some(doc))
        }
        None => (text, None),
    }
}

impl Signature {
    /// Parse `name(params) -> Return`, with an optional docstring on the
    /// following lines
    ///
    /// A leading unannotated `self` parameter is dropped.
    pub fn parse(text: &str) -> Result<Signature, SignatureError> {
        let (header, doc) = split_doc(text);
        let mut cursor = Cursor::new(header);
        let name = cursor.ident()?.to_string();
        cursor.expect("(")?;

        let mut params: Vec<Param> = Vec::new();
        if !cursor.eat(")") {
            loop {
                let param_name = cursor.ident()?.to_string();
                let annotation = if cursor.eat(":") {
                    let text = cursor.segment(&[',', ')', '=']);
                    Some(checked_annotation(&param_name, text)?)
                } else {
                    None
                };
                let default = if cursor.eat("=") {
                    let text = cursor.segment(&[',', ')']);
                    Some(Literal::parse(text).ok_or_else(|| SignatureError::UnsupportedDefault {
                        param: param_name.clone(),
                        default: text.to_string(),
                    })?)
                } else {
                    None
                };

                let receiver = params.is_empty() && param_name == "self" && annotation.is_none();
                if !receiver {
                    if params.iter().any(|p| p.name == param_name) {
                        return Err(SignatureError::Duplicate(param_name));
                    }
                    if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                        return Err(SignatureError::DefaultOrder(param_name));
                    }
                    params.push(Param {
                        name: param_name,
                        annotation,
                        default,
                    });
                }

                if cursor.eat(")") {
                    break;
                }
                cursor.expect(",")?;
                if cursor.eat(")") {
                    break;
                }
            }
        }

        let returns = if cursor.eat("->") {
            let text = cursor.segment(&[]);
            Some(checked_annotation("return", text)?)
        } else {
            None
        };
        if !cursor.at_end() {
            return Err(cursor.error("end of signature"));
        }

        Ok(Signature {
            name,
            params,
            returns,
            doc,
        })
    }

    /// Parse a property declaration `name -> Type`
    pub fn parse_property(text: &str) -> Result<Signature, SignatureError> {
        let (header, doc) = split_doc(text);
        let mut cursor = Cursor::new(header);
        let name = cursor.ident()?.to_string();
        cursor.expect("->")?;
        let text = cursor.segment(&[]);
        let returns = Some(checked_annotation("return", text)?);
        if !cursor.at_end() {
            return Err(cursor.error("end of property"));
        }
        Ok(Signature {
            name,
            params: Vec::new(),
            returns,
            doc,
        })
    }

    /// Number of parameters without a default
    pub fn min_arity(&self) -> usize {
        self.params.iter().take_while(|p| p.default.is_none()).count()
    }

    /// Defaults of the trailing optional parameters, in order
    pub fn defaults(&self) -> Vec<Value> {
        self.params
            .iter()
            .filter_map(|p| p.default.as_ref().map(Literal::to_value))
            .collect()
    }

    fn params_text(&self, receiver: bool) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.params.len() + 1);
        if receiver {
            parts.push("self".to_string());
        }
        for p in &self.params {
            let mut text = p.name.clone();
            if let Some(annotation) = &p.annotation {
                text.push_str(": ");
                text.push_str(&annotation.replace(',', ", "));
            }
            if let Some(default) = &p.default {
                text.push_str(" = ");
                text.push_str(&default.to_string());
            }
            parts.push(text);
        }
        parts.join(", ")
    }

    fn returns_text(&self) -> String {
        match &self.returns {
            Some(r) => format!(" -> {}", r.replace(',', ", ")),
            None => String::new(),
        }
    }

    /// `def name(...) -> R: ...`, or with the docstring as the body
    pub fn interface(&self, receiver: bool) -> String {
        let head = format!(
            "def {}({}){}:",
            self.name,
            self.params_text(receiver),
            self.returns_text()
        );
        match &self.doc {
            Some(doc) => format!("{}\n    \"\"\"{}\"\"\"", head, doc.replace('\n', "\n    ")),
            None => format!("{} ...", head),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}){}", self.name, self.params_text(false), self.returns_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_signature() {
        let sig = Signature::parse("scale(x: float, factor: float = 2.0, label: str = 'n') -> list[float]")
            .unwrap();
        assert_eq!(sig.name, "scale");
        assert_eq!(sig.params.len(), 3);
        assert_eq!(sig.params[0].annotation.as_deref(), Some("float"));
        assert_eq!(sig.params[1].default, Some(Literal::Float(2.0)));
        assert_eq!(sig.params[2].default, Some(Literal::Str("n".into())));
        assert_eq!(sig.returns.as_deref(), Some("list[float]"));
        assert_eq!(sig.min_arity(), 1);
        assert_eq!(sig.defaults(), vec![Value::Float(2.0), Value::str("n")]);
    }

    #[test]
    fn test_parse_drops_receiver() {
        let sig = Signature::parse("incr(self, by: int = 1) -> int").unwrap();
        assert_eq!(sig.params.len(), 1);
        assert_eq!(sig.params[0].name, "by");
        assert_eq!(sig.params[0].default, Some(Literal::Int(1)));
    }

    #[test]
    fn test_parse_nested_annotation() {
        let sig = Signature::parse("load(data: dict[str, list[int]], flag: Optional[bool] = None)").unwrap();
        assert_eq!(sig.params[0].annotation.as_deref(), Some("dict[str,list[int]]"));
        assert_eq!(sig.params[1].default, Some(Literal::None));
        assert!(sig.returns.is_none());
    }

    #[test]
    fn test_parse_docstring() {
        let sig = Signature::parse("greet(name: str) -> str\n    Say hello.\n    Twice.").unwrap();
        assert_eq!(sig.doc.as_deref(), Some("Say hello.\nTwice."));
        assert_eq!(
            sig.interface(false),
            "def greet(name: str) -> str:\n    \"\"\"Say hello.\n    Twice.\"\"\""
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Signature::parse("f(x: int?)"),
            Err(SignatureError::UnsupportedAnnotation { .. })
        ));
        assert!(matches!(
            Signature::parse("f(x: int = foo)"),
            Err(SignatureError::UnsupportedDefault { .. })
        ));
        assert!(matches!(
            Signature::parse("f(x: int = 1, y: int)"),
            Err(SignatureError::DefaultOrder(name)) if name == "y"
        ));
        assert!(matches!(
            Signature::parse("f(x, x)"),
            Err(SignatureError::Duplicate(_))
        ));
        assert!(matches!(
            Signature::parse("f(x: int"),
            Err(SignatureError::Expected { .. })
        ));
        assert!(Signature::parse("f() -> int extra").is_err());
    }

    #[test]
    fn test_parse_property() {
        let sig = Signature::parse_property("count -> int").unwrap();
        assert_eq!(sig.name, "count");
        assert_eq!(sig.returns.as_deref(), Some("int"));
        assert!(Signature::parse_property("count").is_err());
    }

    #[test]
    fn test_render() {
        let sig = Signature::parse("f(a:int,b : str='x') -> dict[str,int]").unwrap();
        assert_eq!(sig.to_string(), "f(a: int, b: str = 'x') -> dict[str, int]");
        assert_eq!(sig.interface(true), "def f(self, a: int, b: str = 'x') -> dict[str, int]: ...");
    }

    #[test]
    fn test_type_expressions() {
        assert!(is_type_expression("int"));
        assert!(is_type_expression("pathlib.Path"));
        assert!(is_type_expression("dict[str, Optional[int]]"));
        assert!(!is_type_expression("list[int"));
        assert!(!is_type_expression("1int"));
        assert!(!is_type_expression("int | None"));
        assert!(!is_type_expression(""));
    }
}
