//! Recursive descent parser for the script dialect

use bytecode_system::{BinaryOp, CompareOp, UnaryOp};
use core_types::{ScriptError, ScriptResult, SourcePosition};

use crate::ast::*;
use crate::error::{syntax_error, unexpected_eof, unexpected_token};
use crate::lexer::{tokenize, Keyword, Punctuator, SpannedToken, Token};

/// Script parser
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    /// Track loop depth for break/continue validation
    loop_depth: usize,
    /// Track function depth for return/yield validation
    function_depth: usize,
}

impl Parser {
    /// Create a new parser for the given source code
    pub fn new(source: &str) -> ScriptResult<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            loop_depth: 0,
            function_depth: 0,
        })
    }

    /// Parse a sequence of statements
    pub fn parse(&mut self) -> ScriptResult<ASTNode> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.check(&Token::Eof) {
            statements.extend(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(ASTNode::Program(statements))
    }

    /// Parse input that must be exactly one expression
    pub fn parse_expression_input(&mut self) -> ScriptResult<ASTNode> {
        self.skip_newlines();
        if self.check(&Token::Eof) {
            return Err(unexpected_eof(self.position()));
        }
        let expr = self.parse_expression()?;
        self.skip_newlines();
        if !self.check(&Token::Eof) {
            return Err(self.error_here("invalid syntax"));
        }
        Ok(ASTNode::Expression(expr))
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn position(&self) -> SourcePosition {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.position)
            .unwrap_or_default()
    }

    fn line(&self) -> u32 {
        self.position().line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn check_punct(&self, punct: Punctuator) -> bool {
        matches!(self.peek(), Token::Punct(p) if *p == punct)
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek(), Token::Keyword(k) if *k == keyword)
    }

    fn eat_punct(&mut self, punct: Punctuator) -> bool {
        if self.check_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: &str) -> ScriptError {
        if self.check(&Token::Eof) {
            unexpected_eof(self.position())
        } else {
            syntax_error(message, self.position())
        }
    }

    fn expected(&self, what: &str) -> ScriptError {
        if self.check(&Token::Eof) {
            unexpected_eof(self.position())
        } else {
            unexpected_token(what, &self.peek().describe(), self.position())
        }
    }

    fn expect_punct(&mut self, punct: Punctuator, what: &str) -> ScriptResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.expected(what))
        }
    }

    fn expect_name(&mut self) -> ScriptResult<String> {
        match self.peek().clone() {
            Token::Name(name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.expected("identifier")),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn expect_line_end(&mut self) -> ScriptResult<()> {
        match self.peek() {
            Token::Newline => {
                self.pos += 1;
                Ok(())
            }
            Token::Eof | Token::Dedent => Ok(()),
            _ => Err(self.error_here("invalid syntax")),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> ScriptResult<Vec<Statement>> {
        let line = self.line();
        let compound = match self.peek() {
            Token::Keyword(Keyword::If) => Some(self.parse_if()?),
            Token::Keyword(Keyword::While) => Some(self.parse_while()?),
            Token::Keyword(Keyword::For) => Some(self.parse_for()?),
            Token::Keyword(Keyword::Def) => Some(self.parse_def()?),
            Token::Keyword(Keyword::Try) => Some(self.parse_try()?),
            Token::Keyword(Keyword::Class) => Some(self.parse_class()?),
            Token::Keyword(Keyword::With) => {
                return Err(self.error_here("'with' statements are not supported"))
            }
            Token::Indent => return Err(self.error_here("unexpected indent")),
            _ => None,
        };
        if let Some(kind) = compound {
            return Ok(vec![Statement { kind, line }]);
        }

        let mut statements = Vec::new();
        loop {
            let line = self.line();
            let kind = self.parse_simple_statement()?;
            statements.push(Statement { kind, line });
            if !self.eat_punct(Punctuator::Semicolon) {
                break;
            }
            if matches!(self.peek(), Token::Newline | Token::Eof) {
                break;
            }
        }
        self.expect_line_end()?;
        Ok(statements)
    }

    fn parse_block(&mut self) -> ScriptResult<Vec<Statement>> {
        self.expect_punct(Punctuator::Colon, "':'")?;
        if !self.check(&Token::Newline) {
            // `if x: y` on one line
            let mut statements = Vec::new();
            loop {
                let line = self.line();
                let kind = self.parse_simple_statement()?;
                statements.push(Statement { kind, line });
                if !self.eat_punct(Punctuator::Semicolon) || self.check(&Token::Newline) {
                    break;
                }
            }
            self.expect_line_end()?;
            return Ok(statements);
        }

        self.pos += 1;
        if !self.check(&Token::Indent) {
            return Err(self.expected("an indented block"));
        }
        self.pos += 1;

        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Token::Dedent => {
                    self.pos += 1;
                    break;
                }
                Token::Eof => break,
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> ScriptResult<StatementKind> {
        self.advance();
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        let orelse = if self.check_keyword(Keyword::Elif) {
            let line = self.line();
            let kind = self.parse_if()?;
            vec![Statement { kind, line }]
        } else if self.eat_keyword(Keyword::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(StatementKind::If { test, body, orelse })
    }

    fn parse_while(&mut self) -> ScriptResult<StatementKind> {
        self.advance();
        let test = self.parse_expression()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Ok(StatementKind::While { test, body: body? })
    }

    fn parse_for(&mut self) -> ScriptResult<StatementKind> {
        self.advance();
        let target = self.expect_name()?;
        if self.check_punct(Punctuator::Comma) {
            return Err(self.error_here("only simple names are supported as for-loop targets"));
        }
        if !self.eat_keyword(Keyword::In) {
            return Err(self.expected("'in'"));
        }
        let iter = self.parse_expression()?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Ok(StatementKind::For {
            target,
            iter,
            body: body?,
        })
    }

    fn parse_def(&mut self) -> ScriptResult<StatementKind> {
        self.advance();
        let name = self.expect_name()?;
        self.expect_punct(Punctuator::LParen, "'('")?;

        let mut params: Vec<Parameter> = Vec::new();
        while !self.check_punct(Punctuator::RParen) {
            if self.check_punct(Punctuator::Star) || self.check_punct(Punctuator::StarStar) {
                return Err(self.error_here("variadic parameters are not supported"));
            }
            let param = self.expect_name()?;
            if params.iter().any(|p| p.name == param) {
                return Err(self.error_here(&format!(
                    "duplicate argument '{}' in function definition",
                    param
                )));
            }
            if self.eat_punct(Punctuator::Colon) {
                // annotations are accepted and ignored
                self.parse_expression()?;
            }
            let default = if self.eat_punct(Punctuator::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.error_here("non-default argument follows default argument"));
            }
            params.push(Parameter {
                name: param,
                default,
            });
            if !self.eat_punct(Punctuator::Comma) {
                break;
            }
        }
        self.expect_punct(Punctuator::RParen, "')'")?;
        if self.eat_punct(Punctuator::Arrow) {
            self.parse_expression()?;
        }

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;

        Ok(StatementKind::FunctionDef {
            name,
            params,
            body: body?,
        })
    }

    fn parse_class(&mut self) -> ScriptResult<StatementKind> {
        self.advance();
        let name = self.expect_name()?;
        let mut base = None;
        if self.eat_punct(Punctuator::LParen) {
            if !self.check_punct(Punctuator::RParen) {
                base = Some(self.parse_expression()?);
                if self.eat_punct(Punctuator::Comma) && !self.check_punct(Punctuator::RParen) {
                    return Err(self.error_here("only single inheritance is supported"));
                }
            }
            self.expect_punct(Punctuator::RParen, "')'")?;
        }

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let saved_functions = std::mem::replace(&mut self.function_depth, 0);
        let body = self.parse_block();
        self.function_depth = saved_functions;
        self.loop_depth = saved_loops;

        Ok(StatementKind::ClassDef {
            name,
            base,
            body: body?,
        })
    }

    fn parse_try(&mut self) -> ScriptResult<StatementKind> {
        self.advance();
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        self.skip_newlines();
        while self.check_keyword(Keyword::Except) {
            let line = self.line();
            self.advance();
            let (class, name) = if self.check_punct(Punctuator::Colon) {
                (None, None)
            } else {
                let class = self.parse_expression()?;
                let name = if self.eat_keyword(Keyword::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(class), name)
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                class,
                name,
                body,
                line,
            });
        }
        if self.check_keyword(Keyword::Finally) || self.check_keyword(Keyword::Else) {
            return Err(self.error_here("only 'except' clauses are supported after 'try'"));
        }
        if handlers.is_empty() {
            return Err(self.expected("'except'"));
        }
        Ok(StatementKind::Try { body, handlers })
    }

    fn parse_simple_statement(&mut self) -> ScriptResult<StatementKind> {
        match self.peek().clone() {
            Token::Keyword(Keyword::Pass) => {
                self.advance();
                Ok(StatementKind::Pass)
            }
            Token::Keyword(Keyword::Break) => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'break' outside loop"));
                }
                self.advance();
                Ok(StatementKind::Break)
            }
            Token::Keyword(Keyword::Continue) => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'continue' not properly in loop"));
                }
                self.advance();
                Ok(StatementKind::Continue)
            }
            Token::Keyword(Keyword::Return) => {
                if self.function_depth == 0 {
                    return Err(self.error_here("'return' outside function"));
                }
                self.advance();
                if matches!(self.peek(), Token::Newline | Token::Eof | Token::Dedent)
                    || self.check_punct(Punctuator::Semicolon)
                {
                    Ok(StatementKind::Return(None))
                } else {
                    Ok(StatementKind::Return(Some(self.parse_expr_or_yield()?)))
                }
            }
            Token::Keyword(Keyword::Global) => {
                self.advance();
                let mut names = vec![self.expect_name()?];
                while self.eat_punct(Punctuator::Comma) {
                    names.push(self.expect_name()?);
                }
                Ok(StatementKind::Global(names))
            }
            Token::Keyword(Keyword::Import) => {
                self.advance();
                let module = self.parse_module_name()?;
                let alias = if self.eat_keyword(Keyword::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                Ok(StatementKind::Import { module, alias })
            }
            Token::Keyword(Keyword::From) => {
                self.advance();
                let module = self.parse_module_name()?;
                if !self.eat_keyword(Keyword::Import) {
                    return Err(self.expected("'import'"));
                }
                let parens = self.eat_punct(Punctuator::LParen);
                let mut names = Vec::new();
                loop {
                    let name = self.expect_name()?;
                    let alias = if self.eat_keyword(Keyword::As) {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.eat_punct(Punctuator::Comma) || (parens && self.check_punct(Punctuator::RParen)) {
                        break;
                    }
                }
                if parens {
                    self.expect_punct(Punctuator::RParen, "')'")?;
                }
                Ok(StatementKind::FromImport { module, names })
            }
            Token::Keyword(Keyword::Raise) => {
                self.advance();
                if matches!(self.peek(), Token::Newline | Token::Eof | Token::Dedent) {
                    Ok(StatementKind::Raise(None))
                } else {
                    Ok(StatementKind::Raise(Some(self.parse_expression()?)))
                }
            }
            Token::Keyword(Keyword::Assert) => {
                self.advance();
                let test = self.parse_expression()?;
                let message = if self.eat_punct(Punctuator::Comma) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                Ok(StatementKind::Assert { test, message })
            }
            Token::Keyword(Keyword::Del) => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let target = self.parse_expression()?;
                    if !target.is_assignable() {
                        return Err(self.error_here("cannot delete expression"));
                    }
                    targets.push(target);
                    if !self.eat_punct(Punctuator::Comma) {
                        break;
                    }
                }
                Ok(StatementKind::Delete(targets))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_module_name(&mut self) -> ScriptResult<String> {
        let mut name = self.expect_name()?;
        while self.eat_punct(Punctuator::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_expression_statement(&mut self) -> ScriptResult<StatementKind> {
        let first = self.parse_expr_or_yield()?;

        if self.check_punct(Punctuator::Comma) {
            return Err(self.error_here("tuples are not supported"));
        }

        let aug = match self.peek() {
            Token::Punct(Punctuator::PlusEq) => Some(BinaryOp::Add),
            Token::Punct(Punctuator::MinusEq) => Some(BinaryOp::Sub),
            Token::Punct(Punctuator::StarEq) => Some(BinaryOp::Mul),
            Token::Punct(Punctuator::SlashEq) => Some(BinaryOp::Div),
            Token::Punct(Punctuator::SlashSlashEq) => Some(BinaryOp::FloorDiv),
            Token::Punct(Punctuator::PercentEq) => Some(BinaryOp::Mod),
            _ => None,
        };
        if let Some(op) = aug {
            if !first.is_assignable() {
                return Err(self.error_here("illegal expression for augmented assignment"));
            }
            self.advance();
            let value = self.parse_expr_or_yield()?;
            return Ok(StatementKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.check_punct(Punctuator::Assign) {
            return Ok(StatementKind::Expression(first));
        }

        let mut targets = vec![first];
        let mut value;
        loop {
            self.advance();
            value = self.parse_expr_or_yield()?;
            if !self.check_punct(Punctuator::Assign) {
                break;
            }
            targets.push(value);
        }
        if let Some(bad) = targets.iter().find(|t| !t.is_assignable()) {
            let what = match bad {
                Expression::Call { .. } => "function call",
                _ => "expression",
            };
            return Err(self.error_here(&format!("cannot assign to {}", what)));
        }
        if self.check_punct(Punctuator::Comma) {
            return Err(self.error_here("tuples are not supported"));
        }
        Ok(StatementKind::Assign { targets, value })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr_or_yield(&mut self) -> ScriptResult<Expression> {
        if !self.check_keyword(Keyword::Yield) {
            return self.parse_expression();
        }
        if self.function_depth == 0 {
            return Err(self.error_here("'yield' outside function"));
        }
        self.advance();
        if self.eat_keyword(Keyword::From) {
            return Ok(Expression::YieldFrom(Box::new(self.parse_expression()?)));
        }
        if matches!(self.peek(), Token::Newline | Token::Eof | Token::Dedent)
            || self.check_punct(Punctuator::RParen)
        {
            return Ok(Expression::Yield(None));
        }
        Ok(Expression::Yield(Some(Box::new(self.parse_expression()?))))
    }

    /// Parse a full expression including the conditional form
    pub fn parse_expression(&mut self) -> ScriptResult<Expression> {
        if self.check_keyword(Keyword::Lambda) {
            return Err(self.error_here("lambda expressions are not supported"));
        }
        let body = self.parse_or()?;
        if !self.eat_keyword(Keyword::If) {
            return Ok(body);
        }
        let test = self.parse_or()?;
        if !self.eat_keyword(Keyword::Else) {
            return Err(self.expected("'else'"));
        }
        let orelse = self.parse_expression()?;
        Ok(Expression::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn parse_or(&mut self) -> ScriptResult<Expression> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expression::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ScriptResult<Expression> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expression::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ScriptResult<Expression> {
        if self.eat_keyword(Keyword::Not) {
            let operand = self.parse_not()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek() {
            Token::Punct(Punctuator::EqEq) => CompareOp::Eq,
            Token::Punct(Punctuator::NotEq) => CompareOp::Ne,
            Token::Punct(Punctuator::Lt) => CompareOp::Lt,
            Token::Punct(Punctuator::LtEq) => CompareOp::Le,
            Token::Punct(Punctuator::Gt) => CompareOp::Gt,
            Token::Punct(Punctuator::GtEq) => CompareOp::Ge,
            Token::Keyword(Keyword::In) => CompareOp::In,
            Token::Keyword(Keyword::Not)
                if matches!(self.peek_at(1), Token::Keyword(Keyword::In)) =>
            {
                self.pos += 1;
                CompareOp::NotIn
            }
            Token::Keyword(Keyword::Is) => {
                if matches!(self.peek_at(1), Token::Keyword(Keyword::Not)) {
                    self.pos += 1;
                    CompareOp::IsNot
                } else {
                    CompareOp::Is
                }
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn parse_comparison(&mut self) -> ScriptResult<Expression> {
        let first = self.parse_arith()?;
        let mut result: Option<Expression> = None;
        let mut left = first.clone();
        while let Some(op) = self.comparison_op() {
            let right = self.parse_arith()?;
            let compare = Expression::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right.clone()),
            };
            result = Some(match result {
                None => compare,
                Some(prev) => Expression::BoolOp {
                    op: BoolOp::And,
                    left: Box::new(prev),
                    right: Box::new(compare),
                },
            });
            left = right;
        }
        Ok(result.unwrap_or(first))
    }

    fn parse_arith(&mut self) -> ScriptResult<Expression> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Punct(Punctuator::Plus) => BinaryOp::Add,
                Token::Punct(Punctuator::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ScriptResult<Expression> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Punct(Punctuator::Star) => BinaryOp::Mul,
                Token::Punct(Punctuator::Slash) => BinaryOp::Div,
                Token::Punct(Punctuator::SlashSlash) => BinaryOp::FloorDiv,
                Token::Punct(Punctuator::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> ScriptResult<Expression> {
        let op = match self.peek() {
            Token::Punct(Punctuator::Minus) => UnaryOp::Neg,
            Token::Punct(Punctuator::Plus) => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        // fold negative literals so `-9223372036854775808`-style bounds and
        // constant tables stay simple
        Ok(match (op, operand) {
            (UnaryOp::Neg, Expression::Int(n)) => Expression::Int(-n),
            (UnaryOp::Neg, Expression::Float(n)) => Expression::Float(-n),
            (op, operand) => Expression::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_power(&mut self) -> ScriptResult<Expression> {
        let base = self.parse_primary()?;
        if self.eat_punct(Punctuator::StarStar) {
            let exponent = self.parse_factor()?;
            return Ok(Expression::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> ScriptResult<Expression> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_punct(Punctuator::LParen) {
                let mut args = Vec::new();
                while !self.check_punct(Punctuator::RParen) {
                    if matches!(self.peek(), Token::Name(_))
                        && matches!(self.peek_at(1), Token::Punct(Punctuator::Assign))
                    {
                        return Err(self.error_here("keyword arguments are not supported"));
                    }
                    if self.check_punct(Punctuator::Star) || self.check_punct(Punctuator::StarStar) {
                        return Err(self.error_here("argument unpacking is not supported"));
                    }
                    args.push(self.parse_expression()?);
                    if !self.eat_punct(Punctuator::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punctuator::RParen, "')'")?;
                expr = Expression::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat_punct(Punctuator::LBracket) {
                let index = self.parse_expression()?;
                if self.check_punct(Punctuator::Colon) {
                    return Err(self.error_here("slices are not supported"));
                }
                self.expect_punct(Punctuator::RBracket, "']'")?;
                expr = Expression::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_punct(Punctuator::Dot) {
                let attr = self.expect_name()?;
                expr = Expression::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> ScriptResult<Expression> {
        let token = self.peek().clone();
        match token {
            Token::Name(name) => {
                self.advance();
                Ok(Expression::Name(name))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Expression::Int(n))
            }
            Token::Float(n) => {
                self.advance();
                Ok(Expression::Float(n))
            }
            Token::Str(s) => {
                self.advance();
                let mut value = s;
                while let Token::Str(next) = self.peek().clone() {
                    self.advance();
                    value.push_str(&next);
                }
                Ok(Expression::Str(value))
            }
            Token::Bytes(b) => {
                self.advance();
                let mut value = b;
                while let Token::Bytes(next) = self.peek().clone() {
                    self.advance();
                    value.extend(next);
                }
                Ok(Expression::Bytes(value))
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expression::Bool(true))
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expression::Bool(false))
            }
            Token::Keyword(Keyword::None) => {
                self.advance();
                Ok(Expression::None)
            }
            Token::Keyword(Keyword::Await) => Err(self.error_here(
                "'await' is only supported as a top-level statement 'name = await call(...)'",
            )),
            Token::Punct(Punctuator::LParen) => {
                self.advance();
                if self.check_punct(Punctuator::RParen) {
                    return Err(self.error_here("tuples are not supported"));
                }
                let inner = self.parse_expr_or_yield()?;
                if self.check_punct(Punctuator::Comma) {
                    return Err(self.error_here("tuples are not supported"));
                }
                self.expect_punct(Punctuator::RParen, "')'")?;
                Ok(inner)
            }
            Token::Punct(Punctuator::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                while !self.check_punct(Punctuator::RBracket) {
                    items.push(self.parse_expression()?);
                    if self.check_keyword(Keyword::For) {
                        return Err(self.error_here("comprehensions are not supported"));
                    }
                    if !self.eat_punct(Punctuator::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punctuator::RBracket, "']'")?;
                Ok(Expression::List(items))
            }
            Token::Punct(Punctuator::LBrace) => {
                self.advance();
                let mut pairs = Vec::new();
                while !self.check_punct(Punctuator::RBrace) {
                    let key = self.parse_expression()?;
                    if !self.eat_punct(Punctuator::Colon) {
                        return Err(self.error_here("set literals are not supported"));
                    }
                    let value = self.parse_expression()?;
                    pairs.push((key, value));
                    if !self.eat_punct(Punctuator::Comma) {
                        break;
                    }
                }
                self.expect_punct(Punctuator::RBrace, "'}'")?;
                Ok(Expression::Dict(pairs))
            }
            _ => Err(self.error_here("invalid syntax")),
        }
    }
}
