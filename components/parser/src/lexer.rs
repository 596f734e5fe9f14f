//! Script lexer - tokenizes source code into tokens
//!
//! Indentation is significant: the lexer tracks an indent stack and emits
//! [`Token::Indent`] / [`Token::Dedent`] at the start of logical lines.
//! Newlines inside brackets and after a trailing backslash do not end a
//! logical line.

use core_types::{ScriptResult, SourcePosition};

use crate::error::{syntax_error, unexpected_eof};

/// Reserved words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `False`
    False,
    /// `None`
    None,
    /// `True`
    True,
    /// `and`
    And,
    /// `as`
    As,
    /// `assert`
    Assert,
    /// `await`
    Await,
    /// `break`
    Break,
    /// `class`
    Class,
    /// `continue`
    Continue,
    /// `def`
    Def,
    /// `del`
    Del,
    /// `elif`
    Elif,
    /// `else`
    Else,
    /// `except`
    Except,
    /// `finally`
    Finally,
    /// `for`
    For,
    /// `from`
    From,
    /// `global`
    Global,
    /// `if`
    If,
    /// `import`
    Import,
    /// `in`
    In,
    /// `is`
    Is,
    /// `lambda`
    Lambda,
    /// `not`
    Not,
    /// `or`
    Or,
    /// `pass`
    Pass,
    /// `raise`
    Raise,
    /// `return`
    Return,
    /// `try`
    Try,
    /// `while`
    While,
    /// `with`
    With,
    /// `yield`
    Yield,
}

impl Keyword {
    fn from_str(word: &str) -> Option<Keyword> {
        Some(match word {
            "False" => Keyword::False,
            "None" => Keyword::None,
            "True" => Keyword::True,
            "and" => Keyword::And,
            "as" => Keyword::As,
            "assert" => Keyword::Assert,
            "await" => Keyword::Await,
            "break" => Keyword::Break,
            "class" => Keyword::Class,
            "continue" => Keyword::Continue,
            "def" => Keyword::Def,
            "del" => Keyword::Del,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "except" => Keyword::Except,
            "finally" => Keyword::Finally,
            "for" => Keyword::For,
            "from" => Keyword::From,
            "global" => Keyword::Global,
            "if" => Keyword::If,
            "import" => Keyword::Import,
            "in" => Keyword::In,
            "is" => Keyword::Is,
            "lambda" => Keyword::Lambda,
            "not" => Keyword::Not,
            "or" => Keyword::Or,
            "pass" => Keyword::Pass,
            "raise" => Keyword::Raise,
            "return" => Keyword::Return,
            "try" => Keyword::Try,
            "while" => Keyword::While,
            "with" => Keyword::With,
            "yield" => Keyword::Yield,
            _ => return None,
        })
    }
}

/// Operators and delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuator {
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `.`
    Dot,
    /// `->`
    Arrow,
    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `**`
    StarStar,
    /// `/`
    Slash,
    /// `//`
    SlashSlash,
    /// `%`
    Percent,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+=`
    PlusEq,
    /// `-=`
    MinusEq,
    /// `*=`
    StarEq,
    /// `/=`
    SlashEq,
    /// `//=`
    SlashSlashEq,
    /// `%=`
    PercentEq,
}

/// Token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier
    Name(String),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal (escapes resolved)
    Str(String),
    /// Bytes literal
    Bytes(Vec<u8>),
    /// Reserved word
    Keyword(Keyword),
    /// Operator or delimiter
    Punct(Punctuator),
    /// End of a logical line
    Newline,
    /// Indentation increased
    Indent,
    /// Indentation decreased
    Dedent,
    /// End of input
    Eof,
}

impl Token {
    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Name(name) => format!("name '{}'", name),
            Token::Int(n) => format!("number {}", n),
            Token::Float(n) => format!("number {}", n),
            Token::Str(_) => "string".to_string(),
            Token::Bytes(_) => "bytes".to_string(),
            Token::Keyword(k) => format!("keyword {:?}", k).to_lowercase(),
            Token::Punct(p) => format!("{:?}", p),
            Token::Newline => "newline".to_string(),
            Token::Indent => "indent".to_string(),
            Token::Dedent => "dedent".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// A token with the position it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    /// The token
    pub token: Token,
    /// Where it starts
    pub position: SourcePosition,
}

/// Script lexer
pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    offset: usize,
    line: u32,
    column: u32,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<SpannedToken>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `source`
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
            offset: 0,
            line: 1,
            column: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole source
    pub fn tokenize(mut self) -> ScriptResult<Vec<SpannedToken>> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.depth == 0 {
                self.at_line_start = false;
                if self.handle_indentation()? {
                    continue;
                }
            }

            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '\n' => {
                    let position = self.position();
                    self.advance();
                    if self.depth == 0 {
                        self.push_newline(position);
                        self.at_line_start = true;
                    }
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.advance();
                    self.advance();
                }
                '0'..='9' => self.lex_number()?,
                '.' if self.peek(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number()?,
                '"' | '\'' => self.lex_string(false)?,
                'b' | 'B' if matches!(self.peek(1), Some('"') | Some('\'')) => {
                    self.advance();
                    self.lex_string(true)?;
                }
                c if c == '_' || c.is_alphabetic() => self.lex_word(),
                _ => self.lex_punct()?,
            }
        }

        let end = self.position();
        if self.depth > 0 {
            return Err(unexpected_eof(end));
        }
        self.push_newline(end);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Token::Dedent, end);
        }
        self.push(Token::Eof, end);
        Ok(self.tokens)
    }

    fn position(&self) -> SourcePosition {
        SourcePosition::new(self.line, self.column, self.offset)
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, token: Token, position: SourcePosition) {
        self.tokens.push(SpannedToken { token, position });
    }

    fn push_newline(&mut self, position: SourcePosition) {
        let needs = matches!(
            self.tokens.last().map(|t| &t.token),
            Some(tok) if !matches!(tok, Token::Newline | Token::Indent | Token::Dedent)
        );
        if needs {
            self.push(Token::Newline, position);
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Measures the indentation of a new logical line. Returns true if the
    /// line was blank or a comment and has been consumed.
    fn handle_indentation(&mut self) -> ScriptResult<bool> {
        let mut width = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                _ => break,
            }
            self.advance();
        }

        match self.peek(0) {
            None => return Ok(true),
            Some('\n') => {
                self.advance();
                self.at_line_start = true;
                return Ok(true);
            }
            Some('\r') if self.peek(1) == Some('\n') => {
                self.advance();
                self.advance();
                self.at_line_start = true;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek(0) == Some('\n') {
                    self.advance();
                }
                self.at_line_start = true;
                return Ok(true);
            }
            _ => {}
        }

        let position = self.position();
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Token::Indent, position);
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.push(Token::Dedent, position);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(syntax_error(
                    "unindent does not match any outer indentation level",
                    position,
                ));
            }
        }
        Ok(false)
    }

    fn lex_word(&mut self) {
        let position = self.position();
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c == '_' || c.is_alphanumeric())
        {
            self.advance();
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let token = match Keyword::from_str(&word) {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Name(word),
        };
        self.push(token, position);
    }

    fn lex_number(&mut self) -> ScriptResult<()> {
        let position = self.position();

        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek(0) {
                if c.is_ascii_hexdigit() {
                    digits.push(c);
                } else if c != '_' {
                    break;
                }
                self.advance();
            }
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| syntax_error("invalid hexadecimal literal", position))?;
            self.push(Token::Int(value), position);
            return Ok(());
        }

        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek(0) {
            match c {
                '0'..='9' => text.push(c),
                '_' => {}
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.advance();
                    if let Some(sign @ ('+' | '-')) = self.peek(0) {
                        text.push(sign);
                        self.advance();
                    }
                    continue;
                }
                _ => break,
            }
            self.advance();
        }

        let token = if is_float {
            Token::Float(
                text.parse()
                    .map_err(|_| syntax_error("invalid float literal", position))?,
            )
        } else {
            Token::Int(
                text.parse()
                    .map_err(|_| syntax_error("integer literal too large", position))?,
            )
        };
        self.push(token, position);
        Ok(())
    }

    fn lex_string(&mut self, bytes: bool) -> ScriptResult<()> {
        let position = self.position();
        let quote = self.advance().unwrap_or('"');
        let triple = self.peek(0) == Some(quote) && self.peek(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(unexpected_eof(position));
            };
            match c {
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek(0) == Some(quote) && self.peek(1) == Some(quote) {
                        self.advance();
                        self.advance();
                        break;
                    }
                    value.push(c);
                }
                '\n' if !triple => {
                    return Err(syntax_error("unterminated string literal", position));
                }
                '\\' => {
                    let Some(escaped) = self.advance() else {
                        return Err(unexpected_eof(position));
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        '\n' => {}
                        'x' => {
                            let hex: String = [self.advance(), self.advance()]
                                .iter()
                                .flatten()
                                .collect();
                            let code = u32::from_str_radix(&hex, 16)
                                .map_err(|_| syntax_error("invalid \\x escape", position))?;
                            value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c => value.push(c),
            }
        }

        let token = if bytes {
            if !value.is_ascii() && value.chars().any(|c| c as u32 > 0xff) {
                return Err(syntax_error(
                    "bytes can only contain ASCII literal characters",
                    position,
                ));
            }
            Token::Bytes(value.chars().map(|c| c as u32 as u8).collect())
        } else {
            Token::Str(value)
        };
        self.push(token, position);
        Ok(())
    }

    fn lex_punct(&mut self) -> ScriptResult<()> {
        let position = self.position();
        let c = self.chars[self.pos];
        let next = self.peek(1);
        let third = self.peek(2);

        let (punct, len) = match (c, next, third) {
            ('/', Some('/'), Some('=')) => (Punctuator::SlashSlashEq, 3),
            ('*', Some('*'), _) => (Punctuator::StarStar, 2),
            ('/', Some('/'), _) => (Punctuator::SlashSlash, 2),
            ('-', Some('>'), _) => (Punctuator::Arrow, 2),
            ('=', Some('='), _) => (Punctuator::EqEq, 2),
            ('!', Some('='), _) => (Punctuator::NotEq, 2),
            ('<', Some('='), _) => (Punctuator::LtEq, 2),
            ('>', Some('='), _) => (Punctuator::GtEq, 2),
            ('+', Some('='), _) => (Punctuator::PlusEq, 2),
            ('-', Some('='), _) => (Punctuator::MinusEq, 2),
            ('*', Some('='), _) => (Punctuator::StarEq, 2),
            ('/', Some('='), _) => (Punctuator::SlashEq, 2),
            ('%', Some('='), _) => (Punctuator::PercentEq, 2),
            ('(', _, _) => (Punctuator::LParen, 1),
            (')', _, _) => (Punctuator::RParen, 1),
            ('[', _, _) => (Punctuator::LBracket, 1),
            (']', _, _) => (Punctuator::RBracket, 1),
            ('{', _, _) => (Punctuator::LBrace, 1),
            ('}', _, _) => (Punctuator::RBrace, 1),
            (',', _, _) => (Punctuator::Comma, 1),
            (':', _, _) => (Punctuator::Colon, 1),
            (';', _, _) => (Punctuator::Semicolon, 1),
            ('.', _, _) => (Punctuator::Dot, 1),
            ('=', _, _) => (Punctuator::Assign, 1),
            ('+', _, _) => (Punctuator::Plus, 1),
            ('-', _, _) => (Punctuator::Minus, 1),
            ('*', _, _) => (Punctuator::Star, 1),
            ('/', _, _) => (Punctuator::Slash, 1),
            ('%', _, _) => (Punctuator::Percent, 1),
            ('<', _, _) => (Punctuator::Lt, 1),
            ('>', _, _) => (Punctuator::Gt, 1),
            _ => {
                return Err(syntax_error(
                    format!("invalid character '{}'", c),
                    position,
                ))
            }
        };

        match punct {
            Punctuator::LParen | Punctuator::LBracket | Punctuator::LBrace => self.depth += 1,
            Punctuator::RParen | Punctuator::RBracket | Punctuator::RBrace => {
                self.depth = self.depth.saturating_sub(1)
            }
            _ => {}
        }
        for _ in 0..len {
            self.advance();
        }
        self.push(Token::Punct(punct), position);
        Ok(())
    }

    /// The source being tokenized
    pub fn source(&self) -> &str {
        self.source
    }
}

/// Tokenize `source`
pub fn tokenize(source: &str) -> ScriptResult<Vec<SpannedToken>> {
    Lexer::new(source).tokenize()
}
