//! Scope analysis for function bodies
//!
//! Module code resolves every name through the namespace at run time. Function
//! code splits names into fast locals and globals ahead of time: a name is
//! local if the body binds it and does not declare it `global`.

use crate::ast::*;
use crate::error::syntax_error;
use core_types::{ScriptResult, SourcePosition};
use std::collections::HashSet;

/// Result of analysing one function body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeInfo {
    /// Local slot names: parameters first, then other bindings in order of appearance
    pub locals: Vec<String>,
    /// Names declared `global`
    pub globals: HashSet<String>,
    /// True if the body contains `yield` or `yield from`
    pub is_generator: bool,
}

impl ScopeInfo {
    /// True if `name` lives in a fast local slot
    pub fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|l| l == name)
    }
}

/// Collects bindings for a single function scope
///
/// Nested function definitions bind their name in the enclosing scope but
/// their bodies are analysed separately.
#[derive(Debug, Default)]
pub struct ScopeAnalyzer {
    info: ScopeInfo,
    assigned: Vec<String>,
}

impl ScopeAnalyzer {
    /// Create an analyzer
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyse a function with the given parameters and body
    pub fn analyze(mut self, params: &[Parameter], body: &[Statement]) -> ScriptResult<ScopeInfo> {
        self.collect_globals(body);
        for param in params {
            if self.info.globals.contains(&param.name) {
                return Err(syntax_error(
                    format!("name '{}' is parameter and global", param.name),
                    SourcePosition::default(),
                ));
            }
            self.info.locals.push(param.name.clone());
        }
        for stmt in body {
            self.visit_statement(stmt);
        }
        for name in std::mem::take(&mut self.assigned) {
            if !self.info.globals.contains(&name) && !self.info.is_local(&name) {
                self.info.locals.push(name);
            }
        }
        Ok(self.info)
    }

    fn collect_globals(&mut self, body: &[Statement]) {
        for stmt in body {
            match &stmt.kind {
                StatementKind::Global(names) => self.info.globals.extend(names.iter().cloned()),
                StatementKind::If { body, orelse, .. } => {
                    self.collect_globals(body);
                    self.collect_globals(orelse);
                }
                StatementKind::While { body, .. } | StatementKind::For { body, .. } => {
                    self.collect_globals(body)
                }
                StatementKind::Try { body, handlers } => {
                    self.collect_globals(body);
                    for handler in handlers {
                        self.collect_globals(&handler.body);
                    }
                }
                _ => {}
            }
        }
    }

    fn bind(&mut self, name: &str) {
        if !self.assigned.iter().any(|n| n == name) {
            self.assigned.push(name.to_string());
        }
    }

    fn bind_target(&mut self, target: &Expression) {
        if let Expression::Name(name) = target {
            self.bind(name);
        }
    }

    fn visit_block(&mut self, body: &[Statement]) {
        for stmt in body {
            self.visit_statement(stmt);
        }
    }

    fn visit_statement(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::Expression(expr) => self.visit_expression(expr),
            StatementKind::Assign { targets, value } => {
                self.visit_expression(value);
                for target in targets {
                    self.visit_expression(target);
                    self.bind_target(target);
                }
            }
            StatementKind::AugAssign { target, value, .. } => {
                self.visit_expression(value);
                self.visit_expression(target);
                self.bind_target(target);
            }
            StatementKind::If { test, body, orelse } => {
                self.visit_expression(test);
                self.visit_block(body);
                self.visit_block(orelse);
            }
            StatementKind::While { test, body } => {
                self.visit_expression(test);
                self.visit_block(body);
            }
            StatementKind::For { target, iter, body } => {
                self.visit_expression(iter);
                self.bind(target);
                self.visit_block(body);
            }
            StatementKind::FunctionDef { name, params, .. } => {
                for param in params {
                    if let Some(default) = &param.default {
                        self.visit_expression(default);
                    }
                }
                self.bind(name);
            }
            StatementKind::ClassDef { name, base, body } => {
                if let Some(base) = base {
                    self.visit_expression(base);
                }
                // members land in the class namespace, not in this scope
                for member in body {
                    match &member.kind {
                        StatementKind::FunctionDef { params, .. } => {
                            for default in params.iter().filter_map(|p| p.default.as_ref()) {
                                self.visit_expression(default);
                            }
                        }
                        StatementKind::Assign { value, .. } => self.visit_expression(value),
                        _ => {}
                    }
                }
                self.bind(name);
            }
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.visit_expression(value);
                }
            }
            StatementKind::Import { module, alias } => {
                let bound = alias
                    .as_deref()
                    .unwrap_or_else(|| module.rsplit('.').next().unwrap_or(module));
                self.bind(bound);
            }
            StatementKind::FromImport { names, .. } => {
                for (name, alias) in names {
                    self.bind(alias.as_deref().unwrap_or(name));
                }
            }
            StatementKind::Raise(value) => {
                if let Some(value) = value {
                    self.visit_expression(value);
                }
            }
            StatementKind::Try { body, handlers } => {
                self.visit_block(body);
                for handler in handlers {
                    if let Some(class) = &handler.class {
                        self.visit_expression(class);
                    }
                    if let Some(name) = &handler.name {
                        self.bind(name);
                    }
                    self.visit_block(&handler.body);
                }
            }
            StatementKind::Assert { test, message } => {
                self.visit_expression(test);
                if let Some(message) = message {
                    self.visit_expression(message);
                }
            }
            StatementKind::Delete(targets) => {
                for target in targets {
                    self.visit_expression(target);
                    self.bind_target(target);
                }
            }
            StatementKind::Break
            | StatementKind::Continue
            | StatementKind::Pass
            | StatementKind::Global(_) => {}
        }
    }

    fn visit_expression(&mut self, expr: &Expression) {
        if expr.contains_yield() {
            self.info.is_generator = true;
        }
    }
}
