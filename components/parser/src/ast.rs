//! Abstract Syntax Tree node definitions

use bytecode_system::{BinaryOp, CompareOp, UnaryOp};

/// A parsed compilation unit
#[derive(Debug, Clone, PartialEq)]
pub enum ASTNode {
    /// Sequence of statements (exec and single modes)
    Program(Vec<Statement>),
    /// Single expression (eval mode)
    Expression(Expression),
}

/// A statement together with the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// What the statement does
    pub kind: StatementKind,
    /// Source line (1-based)
    pub line: u32,
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// Expression evaluated for its effect
    Expression(Expression),
    /// `t1 = t2 = value`
    Assign {
        /// Assignment targets, left to right
        targets: Vec<Expression>,
        /// Assigned value
        value: Expression,
    },
    /// `target op= value`
    AugAssign {
        /// Name, attribute or subscript target
        target: Expression,
        /// Operator
        op: BinaryOp,
        /// Right operand
        value: Expression,
    },
    /// `if` / `elif` / `else`
    If {
        /// Condition
        test: Expression,
        /// Taken branch
        body: Vec<Statement>,
        /// `elif`/`else` branch
        orelse: Vec<Statement>,
    },
    /// `while` loop
    While {
        /// Condition
        test: Expression,
        /// Loop body
        body: Vec<Statement>,
    },
    /// `for name in iterable`
    For {
        /// Loop variable
        target: String,
        /// Iterated value
        iter: Expression,
        /// Loop body
        body: Vec<Statement>,
    },
    /// Function definition
    FunctionDef {
        /// Function name
        name: String,
        /// Parameters in order
        params: Vec<Parameter>,
        /// Function body
        body: Vec<Statement>,
    },
    /// `class Name[(Base)]:`
    ClassDef {
        /// Class name
        name: String,
        /// Single base class; `object` when absent
        base: Option<Expression>,
        /// Class body
        body: Vec<Statement>,
    },
    /// `return [value]`
    Return(Option<Expression>),
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `pass`
    Pass,
    /// `global a, b`
    Global(Vec<String>),
    /// `import module [as alias]`
    Import {
        /// Module name
        module: String,
        /// Binding name if different from the module name
        alias: Option<String>,
    },
    /// `from module import a [as b], ...`
    FromImport {
        /// Module name
        module: String,
        /// Imported names with optional aliases
        names: Vec<(String, Option<String>)>,
    },
    /// `raise [exception]`
    Raise(Option<Expression>),
    /// `try` with `except` clauses
    Try {
        /// Protected body
        body: Vec<Statement>,
        /// Handlers in order
        handlers: Vec<ExceptHandler>,
    },
    /// `assert test[, message]`
    Assert {
        /// Checked condition
        test: Expression,
        /// Optional message
        message: Option<Expression>,
    },
    /// `del target, ...`
    Delete(Vec<Expression>),
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Default value, evaluated at definition time
    pub default: Option<Expression>,
}

/// `except [Class] [as name]:` clause
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Matched exception class; `None` catches everything
    pub class: Option<Expression>,
    /// Name bound to the caught exception
    pub name: Option<String>,
    /// Handler body
    pub body: Vec<Statement>,
    /// Line of the `except` keyword
    pub line: u32,
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// Bytes literal
    Bytes(Vec<u8>),
    /// Name reference
    Name(String),
    /// `[a, b]`
    List(Vec<Expression>),
    /// `{k: v}`
    Dict(Vec<(Expression, Expression)>),
    /// `value.attr`
    Attribute {
        /// Object
        value: Box<Expression>,
        /// Attribute name
        attr: String,
    },
    /// `value[index]`
    Subscript {
        /// Container
        value: Box<Expression>,
        /// Key or index
        index: Box<Expression>,
    },
    /// `func(args...)`
    Call {
        /// Callee
        func: Box<Expression>,
        /// Positional arguments
        args: Vec<Expression>,
    },
    /// Arithmetic
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// Unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expression>,
    },
    /// Single comparison (chains are desugared into `and`)
    Compare {
        /// Operator
        op: CompareOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// `and` / `or`
    BoolOp {
        /// Operator
        op: BoolOp,
        /// Left operand
        left: Box<Expression>,
        /// Right operand
        right: Box<Expression>,
    },
    /// `body if test else orelse`
    IfExp {
        /// Condition
        test: Box<Expression>,
        /// Value when true
        body: Box<Expression>,
        /// Value when false
        orelse: Box<Expression>,
    },
    /// `yield [value]`
    Yield(Option<Box<Expression>>),
    /// `yield from iterable`
    YieldFrom(Box<Expression>),
}

impl Expression {
    /// True for expressions that may appear on the left of `=`
    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expression::Name(_) | Expression::Attribute { .. } | Expression::Subscript { .. }
        )
    }

    /// True if this expression contains `yield` outside nested functions
    pub fn contains_yield(&self) -> bool {
        match self {
            Expression::Yield(_) | Expression::YieldFrom(_) => true,
            Expression::List(items) => items.iter().any(Expression::contains_yield),
            Expression::Dict(pairs) => pairs
                .iter()
                .any(|(k, v)| k.contains_yield() || v.contains_yield()),
            Expression::Attribute { value, .. } => value.contains_yield(),
            Expression::Subscript { value, index } => {
                value.contains_yield() || index.contains_yield()
            }
            Expression::Call { func, args } => {
                func.contains_yield() || args.iter().any(Expression::contains_yield)
            }
            Expression::Binary { left, right, .. }
            | Expression::Compare { left, right, .. }
            | Expression::BoolOp { left, right, .. } => {
                left.contains_yield() || right.contains_yield()
            }
            Expression::Unary { operand, .. } => operand.contains_yield(),
            Expression::IfExp { test, body, orelse } => {
                test.contains_yield() || body.contains_yield() || orelse.contains_yield()
            }
            _ => false,
        }
    }
}
