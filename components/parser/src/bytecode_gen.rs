//! Bytecode generation from AST

use std::rc::Rc;

use crate::ast::*;
use crate::error::syntax_error;
use crate::scope::{ScopeAnalyzer, ScopeInfo};
use bytecode_system::{BytecodeChunk, ChunkKind, Constant, Opcode};
use core_types::{ScriptResult, SourcePosition};

/// How compiled source is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Statements; the chunk returns `None`
    #[default]
    Exec,
    /// A single expression; the chunk returns its value
    Eval,
    /// Interactive statements; expression results are echoed
    Single,
}

struct LoopContext {
    /// Jump target for `continue`
    start: u32,
    /// `break` jumps patched to the loop exit
    breaks: Vec<usize>,
    /// Handler depth when the loop was entered
    handler_depth: usize,
    /// `for` loops keep their iterator on the stack
    has_iterator: bool,
}

/// Bytecode generator that converts AST to bytecode
pub struct BytecodeGenerator {
    chunk: BytecodeChunk,
    mode: CompileMode,
    scope: Option<ScopeInfo>,
    loops: Vec<LoopContext>,
    handler_depth: usize,
    line: u32,
}

impl BytecodeGenerator {
    /// Create a generator for a module-level chunk
    pub fn new(filename: &str, mode: CompileMode) -> Self {
        Self {
            chunk: BytecodeChunk::new("<module>", filename, ChunkKind::Module),
            mode,
            scope: None,
            loops: Vec::new(),
            handler_depth: 0,
            line: 1,
        }
    }

    fn for_function(name: &str, filename: &str, scope: ScopeInfo) -> Self {
        let mut chunk = BytecodeChunk::new(name, filename, ChunkKind::Function);
        chunk.is_generator = scope.is_generator;
        for local in &scope.locals {
            chunk.add_local(local);
        }
        Self {
            chunk,
            mode: CompileMode::Exec,
            scope: Some(scope),
            loops: Vec::new(),
            handler_depth: 0,
            line: 1,
        }
    }

    /// Generate bytecode from AST
    pub fn generate(mut self, ast: &ASTNode) -> ScriptResult<BytecodeChunk> {
        match ast {
            ASTNode::Program(statements) => {
                self.chunk.docstring = docstring(statements);
                self.visit_block(statements)?;
                self.emit(Opcode::LoadNone);
                self.emit(Opcode::Return);
            }
            ASTNode::Expression(expr) => {
                self.visit_expression(expr)?;
                self.emit(Opcode::Return);
            }
        }
        Ok(self.chunk)
    }

    fn emit(&mut self, opcode: Opcode) -> usize {
        self.chunk.emit(opcode, self.line)
    }

    fn error(&self, message: &str) -> core_types::ScriptError {
        syntax_error(message, SourcePosition::new(self.line, 1, 0))
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn load_name(&mut self, name: &str) {
        let op = match &self.scope {
            None => Opcode::LoadName(self.chunk.add_name(name)),
            Some(scope) if scope.is_local(name) => match self.chunk.local_index(name) {
                Some(slot) => Opcode::LoadFast(slot),
                None => Opcode::LoadGlobal(self.chunk.add_name(name)),
            },
            Some(_) => Opcode::LoadGlobal(self.chunk.add_name(name)),
        };
        self.emit(op);
    }

    fn store_name(&mut self, name: &str) {
        let op = match &self.scope {
            None => Opcode::StoreName(self.chunk.add_name(name)),
            Some(_) => match self.chunk.local_index(name) {
                Some(slot) => Opcode::StoreFast(slot),
                None => Opcode::StoreGlobal(self.chunk.add_name(name)),
            },
        };
        self.emit(op);
    }

    fn delete_name(&mut self, name: &str) {
        let op = match &self.scope {
            None => Opcode::DeleteName(self.chunk.add_name(name)),
            Some(_) => match self.chunk.local_index(name) {
                Some(slot) => Opcode::DeleteFast(slot),
                None => Opcode::DeleteGlobal(self.chunk.add_name(name)),
            },
        };
        self.emit(op);
    }

    /// Store TOS into an assignment target
    fn store_target(&mut self, target: &Expression) -> ScriptResult<()> {
        match target {
            Expression::Name(name) => self.store_name(name),
            Expression::Attribute { value, attr } => {
                self.visit_expression(value)?;
                let idx = self.chunk.add_name(attr);
                self.emit(Opcode::StoreAttr(idx));
            }
            Expression::Subscript { value, index } => {
                self.visit_expression(value)?;
                self.visit_expression(index)?;
                self.emit(Opcode::StoreSubscript);
            }
            _ => return Err(self.error("cannot assign to expression")),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn visit_block(&mut self, statements: &[Statement]) -> ScriptResult<()> {
        for stmt in statements {
            self.visit_statement(stmt)?;
        }
        Ok(())
    }

    fn visit_statement(&mut self, stmt: &Statement) -> ScriptResult<()> {
        self.line = stmt.line;
        match &stmt.kind {
            StatementKind::Expression(expr) => {
                self.visit_expression(expr)?;
                if self.mode == CompileMode::Single && self.scope.is_none() {
                    self.emit(Opcode::PrintExpr);
                } else {
                    self.emit(Opcode::Pop);
                }
            }
            StatementKind::Assign { targets, value } => {
                self.visit_expression(value)?;
                for (i, target) in targets.iter().enumerate() {
                    if i + 1 < targets.len() {
                        self.emit(Opcode::Dup);
                    }
                    self.store_target(target)?;
                }
            }
            StatementKind::AugAssign { target, op, value } => match target {
                Expression::Name(name) => {
                    self.load_name(name);
                    self.visit_expression(value)?;
                    self.emit(Opcode::Binary(*op));
                    self.store_name(name);
                }
                Expression::Attribute { value: object, attr } => {
                    let idx = self.chunk.add_name(attr);
                    self.visit_expression(object)?;
                    self.emit(Opcode::Dup);
                    self.emit(Opcode::LoadAttr(idx));
                    self.visit_expression(value)?;
                    self.emit(Opcode::Binary(*op));
                    self.emit(Opcode::Rot2);
                    self.emit(Opcode::StoreAttr(idx));
                }
                Expression::Subscript {
                    value: container,
                    index,
                } => {
                    self.visit_expression(container)?;
                    self.visit_expression(index)?;
                    self.emit(Opcode::Dup2);
                    self.emit(Opcode::LoadSubscript);
                    self.visit_expression(value)?;
                    self.emit(Opcode::Binary(*op));
                    self.emit(Opcode::Rot3);
                    self.emit(Opcode::StoreSubscript);
                }
                _ => return Err(self.error("illegal expression for augmented assignment")),
            },
            StatementKind::If { test, body, orelse } => {
                self.visit_expression(test)?;
                let else_jump = self.emit(Opcode::JumpIfFalse(0));
                self.visit_block(body)?;
                if orelse.is_empty() {
                    self.chunk.patch_jump(else_jump);
                } else {
                    let end_jump = self.emit(Opcode::Jump(0));
                    self.chunk.patch_jump(else_jump);
                    self.visit_block(orelse)?;
                    self.chunk.patch_jump(end_jump);
                }
            }
            StatementKind::While { test, body } => {
                let start = self.chunk.current_offset();
                self.visit_expression(test)?;
                let exit_jump = self.emit(Opcode::JumpIfFalse(0));
                self.push_loop(start, false);
                self.visit_block(body)?;
                self.emit(Opcode::Jump(start));
                self.chunk.patch_jump(exit_jump);
                self.pop_loop();
            }
            StatementKind::For { target, iter, body } => {
                self.visit_expression(iter)?;
                self.line = stmt.line;
                self.emit(Opcode::GetIter);
                let start = self.chunk.current_offset();
                let exit_jump = self.emit(Opcode::ForIter(0));
                self.store_name(target);
                self.push_loop(start, true);
                self.visit_block(body)?;
                self.emit(Opcode::Jump(start));
                self.chunk.patch_jump(exit_jump);
                self.pop_loop();
            }
            StatementKind::FunctionDef { name, params, body } => {
                self.visit_function(name, params, body)?;
                self.line = stmt.line;
                self.store_name(name);
            }
            StatementKind::ClassDef { name, base, body } => {
                self.visit_class(name, base.as_ref(), body)?;
                self.line = stmt.line;
                self.store_name(name);
            }
            StatementKind::Return(value) => {
                match value {
                    Some(value) => self.visit_expression(value)?,
                    None => {
                        self.emit(Opcode::LoadNone);
                    }
                }
                self.emit(Opcode::Return);
            }
            StatementKind::Break => {
                let ctx = self
                    .loops
                    .last()
                    .ok_or_else(|| self.error("'break' outside loop"))?;
                let (pops, has_iterator) = (self.handler_depth - ctx.handler_depth, ctx.has_iterator);
                for _ in 0..pops {
                    self.emit(Opcode::PopExcept);
                }
                if has_iterator {
                    self.emit(Opcode::Pop);
                }
                let jump = self.emit(Opcode::Jump(0));
                if let Some(ctx) = self.loops.last_mut() {
                    ctx.breaks.push(jump);
                }
            }
            StatementKind::Continue => {
                let ctx = self
                    .loops
                    .last()
                    .ok_or_else(|| self.error("'continue' not properly in loop"))?;
                let (pops, start) = (self.handler_depth - ctx.handler_depth, ctx.start);
                for _ in 0..pops {
                    self.emit(Opcode::PopExcept);
                }
                self.emit(Opcode::Jump(start));
            }
            StatementKind::Pass | StatementKind::Global(_) => {}
            StatementKind::Import { module, alias } => {
                let idx = self.chunk.add_name(module);
                self.emit(Opcode::ImportName(idx));
                let bound = alias
                    .as_deref()
                    .unwrap_or_else(|| module.rsplit('.').next().unwrap_or(module));
                self.store_name(bound);
            }
            StatementKind::FromImport { module, names } => {
                let idx = self.chunk.add_name(module);
                self.emit(Opcode::ImportName(idx));
                for (name, alias) in names {
                    let idx = self.chunk.add_name(name);
                    self.emit(Opcode::ImportFrom(idx));
                    self.store_name(alias.as_deref().unwrap_or(name));
                }
                self.emit(Opcode::Pop);
            }
            StatementKind::Raise(value) => match value {
                Some(value) => {
                    self.visit_expression(value)?;
                    self.emit(Opcode::Raise(1));
                }
                None => {
                    self.emit(Opcode::Raise(0));
                }
            },
            StatementKind::Try { body, handlers } => self.visit_try(body, handlers)?,
            StatementKind::Assert { test, message } => {
                self.visit_expression(test)?;
                let ok_jump = self.emit(Opcode::JumpIfTrue(0));
                self.load_name("AssertionError");
                if let Some(message) = message {
                    self.visit_expression(message)?;
                    self.emit(Opcode::Call(1));
                }
                self.emit(Opcode::Raise(1));
                self.chunk.patch_jump(ok_jump);
            }
            StatementKind::Delete(targets) => {
                for target in targets {
                    match target {
                        Expression::Name(name) => self.delete_name(name),
                        Expression::Attribute { value, attr } => {
                            self.visit_expression(value)?;
                            let idx = self.chunk.add_name(attr);
                            self.emit(Opcode::DeleteAttr(idx));
                        }
                        Expression::Subscript { value, index } => {
                            self.visit_expression(value)?;
                            self.visit_expression(index)?;
                            self.emit(Opcode::DeleteSubscript);
                        }
                        _ => return Err(self.error("cannot delete expression")),
                    }
                }
            }
        }
        Ok(())
    }

    fn push_loop(&mut self, start: u32, has_iterator: bool) {
        self.loops.push(LoopContext {
            start,
            breaks: Vec::new(),
            handler_depth: self.handler_depth,
            has_iterator,
        });
    }

    fn pop_loop(&mut self) {
        if let Some(ctx) = self.loops.pop() {
            for jump in ctx.breaks {
                self.chunk.patch_jump(jump);
            }
        }
    }

    /// Layout:
    ///
    /// ```text
    ///     SetupExcept handler
    ///     <body>
    ///     PopExcept
    ///     Jump end
    /// handler:                 ; exception on the stack
    ///     Dup; <class>; ExceptionMatches; JumpIfFalse next
    ///     StoreName name | Pop
    ///     <handler body>
    ///     Jump end
    /// next:
    ///     ...
    ///     Raise 0              ; nothing matched
    /// end:
    /// ```
    fn visit_try(&mut self, body: &[Statement], handlers: &[ExceptHandler]) -> ScriptResult<()> {
        let setup = self.emit(Opcode::SetupExcept(0));
        self.handler_depth += 1;
        let result = self.visit_block(body);
        self.handler_depth -= 1;
        result?;
        self.emit(Opcode::PopExcept);
        let mut end_jumps = vec![self.emit(Opcode::Jump(0))];
        self.chunk.patch_jump(setup);

        let mut caught_all = false;
        for handler in handlers {
            if caught_all {
                return Err(syntax_error(
                    "default 'except:' must be last",
                    SourcePosition::new(handler.line, 1, 0),
                ));
            }
            self.line = handler.line;
            let next_jump = match &handler.class {
                Some(class) => {
                    self.emit(Opcode::Dup);
                    self.visit_expression(class)?;
                    self.emit(Opcode::ExceptionMatches);
                    Some(self.emit(Opcode::JumpIfFalse(0)))
                }
                None => {
                    caught_all = true;
                    None
                }
            };
            match &handler.name {
                Some(name) => self.store_name(name),
                None => {
                    self.emit(Opcode::Pop);
                }
            }
            self.visit_block(&handler.body)?;
            end_jumps.push(self.emit(Opcode::Jump(0)));
            if let Some(jump) = next_jump {
                self.chunk.patch_jump(jump);
            }
        }
        if !caught_all {
            self.emit(Opcode::Raise(0));
        }
        for jump in end_jumps {
            self.chunk.patch_jump(jump);
        }
        Ok(())
    }

    fn visit_function(
        &mut self,
        name: &str,
        params: &[Parameter],
        body: &[Statement],
    ) -> ScriptResult<()> {
        for param in params {
            if let Some(default) = &param.default {
                self.visit_expression(default)?;
            }
        }
        let defaults = params.iter().filter(|p| p.default.is_some()).count() as u32;

        let scope = ScopeAnalyzer::new()
            .analyze(params, body)
            .map_err(|e| e.with_position(SourcePosition::new(self.line, 1, 0)))?;
        let mut inner = BytecodeGenerator::for_function(name, &self.chunk.filename, scope);
        inner.line = self.line;
        inner.chunk.params = params.iter().map(|p| p.name.clone()).collect();
        inner.chunk.docstring = docstring(body);
        inner.visit_block(body)?;
        inner.emit(Opcode::LoadNone);
        inner.emit(Opcode::Return);

        let code = self
            .chunk
            .add_constant(Constant::Code(Rc::new(inner.chunk)));
        self.emit(Opcode::MakeFunction { code, defaults });
        Ok(())
    }

    /// Layout:
    ///
    /// ```text
    ///     <base> | LoadNone
    ///     LoadConst "member"; <value>      ; once per member
    ///     BuildClass name, members
    /// ```
    fn visit_class(
        &mut self,
        name: &str,
        base: Option<&Expression>,
        body: &[Statement],
    ) -> ScriptResult<()> {
        match base {
            Some(base) => self.visit_expression(base)?,
            None => {
                self.emit(Opcode::LoadNone);
            }
        }
        let mut members = 0;
        if let Some(doc) = docstring(body) {
            self.push_member_name("__doc__");
            let idx = self.chunk.add_constant(Constant::Str(Rc::from(doc.as_str())));
            self.emit(Opcode::LoadConst(idx));
            members += 1;
        }
        for member in body {
            self.line = member.line;
            match &member.kind {
                StatementKind::FunctionDef { name, params, body } => {
                    self.push_member_name(name);
                    self.visit_function(name, params, body)?;
                }
                StatementKind::Assign { targets, value } => match targets.as_slice() {
                    [Expression::Name(target)] => {
                        self.push_member_name(target);
                        self.visit_expression(value)?;
                    }
                    _ => return Err(self.error("class attributes must be assigned to a single name")),
                },
                StatementKind::Pass | StatementKind::Expression(Expression::Str(_)) => continue,
                _ => {
                    return Err(self.error(
                        "class bodies may only contain method definitions and attribute assignments",
                    ))
                }
            }
            members += 1;
        }
        let name = self.chunk.add_name(name);
        self.emit(Opcode::BuildClass { name, members });
        Ok(())
    }

    fn push_member_name(&mut self, name: &str) {
        let idx = self.chunk.add_constant(Constant::Str(Rc::from(name)));
        self.emit(Opcode::LoadConst(idx));
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn visit_expression(&mut self, expr: &Expression) -> ScriptResult<()> {
        match expr {
            Expression::None => {
                self.emit(Opcode::LoadNone);
            }
            Expression::Bool(true) => {
                self.emit(Opcode::LoadTrue);
            }
            Expression::Bool(false) => {
                self.emit(Opcode::LoadFalse);
            }
            Expression::Int(n) => {
                let idx = self.chunk.add_constant(Constant::Int(*n));
                self.emit(Opcode::LoadConst(idx));
            }
            Expression::Float(n) => {
                let idx = self.chunk.add_constant(Constant::Float(*n));
                self.emit(Opcode::LoadConst(idx));
            }
            Expression::Str(s) => {
                let idx = self.chunk.add_constant(Constant::Str(Rc::from(s.as_str())));
                self.emit(Opcode::LoadConst(idx));
            }
            Expression::Bytes(b) => {
                let idx = self.chunk.add_constant(Constant::Bytes(Rc::from(b.as_slice())));
                self.emit(Opcode::LoadConst(idx));
            }
            Expression::Name(name) => self.load_name(name),
            Expression::List(items) => {
                for item in items {
                    self.visit_expression(item)?;
                }
                self.emit(Opcode::BuildList(items.len() as u32));
            }
            Expression::Dict(pairs) => {
                for (key, value) in pairs {
                    self.visit_expression(key)?;
                    self.visit_expression(value)?;
                }
                self.emit(Opcode::BuildDict(pairs.len() as u32));
            }
            Expression::Attribute { value, attr } => {
                let idx = self.chunk.add_name(attr);
                if is_super_call(value) {
                    if self.scope.is_none() {
                        return Err(self.error("super() is only valid inside a method"));
                    }
                    self.emit(Opcode::LoadSuperAttr(idx));
                } else {
                    self.visit_expression(value)?;
                    self.emit(Opcode::LoadAttr(idx));
                }
            }
            Expression::Subscript { value, index } => {
                self.visit_expression(value)?;
                self.visit_expression(index)?;
                self.emit(Opcode::LoadSubscript);
            }
            Expression::Call { func, args } => {
                if is_super_call(expr) {
                    return Err(self.error("super() is only supported as super().name"));
                }
                self.visit_expression(func)?;
                for arg in args {
                    self.visit_expression(arg)?;
                }
                self.emit(Opcode::Call(args.len() as u32));
            }
            Expression::Binary { op, left, right } => {
                self.visit_expression(left)?;
                self.visit_expression(right)?;
                self.emit(Opcode::Binary(*op));
            }
            Expression::Unary { op, operand } => {
                self.visit_expression(operand)?;
                self.emit(Opcode::Unary(*op));
            }
            Expression::Compare { op, left, right } => {
                self.visit_expression(left)?;
                self.visit_expression(right)?;
                self.emit(Opcode::Compare(*op));
            }
            Expression::BoolOp { op, left, right } => {
                self.visit_expression(left)?;
                let jump = match op {
                    BoolOp::And => self.emit(Opcode::JumpIfFalseOrPop(0)),
                    BoolOp::Or => self.emit(Opcode::JumpIfTrueOrPop(0)),
                };
                self.visit_expression(right)?;
                self.chunk.patch_jump(jump);
            }
            Expression::IfExp { test, body, orelse } => {
                self.visit_expression(test)?;
                let else_jump = self.emit(Opcode::JumpIfFalse(0));
                self.visit_expression(body)?;
                let end_jump = self.emit(Opcode::Jump(0));
                self.chunk.patch_jump(else_jump);
                self.visit_expression(orelse)?;
                self.chunk.patch_jump(end_jump);
            }
            Expression::Yield(value) => {
                self.require_generator("'yield' outside function")?;
                match value {
                    Some(value) => self.visit_expression(value)?,
                    None => {
                        self.emit(Opcode::LoadNone);
                    }
                }
                self.emit(Opcode::Yield);
            }
            Expression::YieldFrom(iterable) => {
                self.require_generator("'yield from' outside function")?;
                self.visit_expression(iterable)?;
                self.emit(Opcode::GetYieldFromIter);
                self.emit(Opcode::LoadNone);
                self.emit(Opcode::YieldFrom);
            }
        }
        Ok(())
    }

    fn require_generator(&self, message: &str) -> ScriptResult<()> {
        if self.chunk.is_generator {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }
}

/// `super()` with no arguments
fn is_super_call(expr: &Expression) -> bool {
    match expr {
        Expression::Call { func, args } => {
            args.is_empty() && matches!(&**func, Expression::Name(name) if name == "super")
        }
        _ => false,
    }
}

fn docstring(body: &[Statement]) -> Option<String> {
    match body.first().map(|s| &s.kind) {
        Some(StatementKind::Expression(Expression::Str(doc))) => Some(doc.clone()),
        _ => None,
    }
}
