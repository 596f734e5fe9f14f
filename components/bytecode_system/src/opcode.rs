//! Bytecode opcodes for the script runtime
//!
//! Defines every instruction of the stack-based VM. Operands index into the
//! owning chunk's constant, name or local tables, or are absolute jump
//! targets.

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinaryOp {
    /// Operator text as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}

impl CompareOp {
    /// Operator text as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Pos,
    /// `not x`
    Not,
}

/// Bytecode opcodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    // Literals
    /// Push constant at the given pool index
    LoadConst(u32),
    /// Push `None`
    LoadNone,
    /// Push `True`
    LoadTrue,
    /// Push `False`
    LoadFalse,

    // Names
    /// Module-level lookup: namespace, then builtins
    LoadName(u32),
    /// Module-level store into the namespace
    StoreName(u32),
    /// Module-level delete from the namespace
    DeleteName(u32),
    /// Load a function local slot
    LoadFast(u32),
    /// Store a function local slot
    StoreFast(u32),
    /// Clear a function local slot
    DeleteFast(u32),
    /// Function-level global lookup: module namespace, then builtins
    LoadGlobal(u32),
    /// Function-level global store
    StoreGlobal(u32),
    /// Function-level global delete
    DeleteGlobal(u32),

    // Attributes and items
    /// `TOS.name`
    LoadAttr(u32),
    /// `TOS.name = TOS1`
    StoreAttr(u32),
    /// `del TOS.name`
    DeleteAttr(u32),
    /// `super().name` inside a method
    LoadSuperAttr(u32),
    /// `TOS1[TOS]`
    LoadSubscript,
    /// `TOS1[TOS] = TOS2`
    StoreSubscript,
    /// `del TOS1[TOS]`
    DeleteSubscript,

    // Operators
    /// Binary operator on TOS1, TOS
    Binary(BinaryOp),
    /// Comparison on TOS1, TOS
    Compare(CompareOp),
    /// Unary operator on TOS
    Unary(UnaryOp),

    // Control flow
    /// Unconditional jump
    Jump(u32),
    /// Pop TOS and jump if falsy
    JumpIfFalse(u32),
    /// Pop TOS and jump if truthy
    JumpIfTrue(u32),
    /// Jump if TOS is falsy, otherwise pop it
    JumpIfFalseOrPop(u32),
    /// Jump if TOS is truthy, otherwise pop it
    JumpIfTrueOrPop(u32),

    // Construction
    /// Build a list from the top N values
    BuildList(u32),
    /// Build a dict from the top 2N values (key, value pairs)
    BuildDict(u32),
    /// Build a function from a code constant and N default values
    MakeFunction {
        /// Constant pool index of the code object
        code: u32,
        /// Number of default values on the stack
        defaults: u32,
    },
    /// Build a class from a base and N (name, value) member pairs
    BuildClass {
        /// Name index of the class name
        name: u32,
        /// Number of member pairs on the stack
        members: u32,
    },

    // Calls
    /// Call TOS-N with the top N values as positional arguments
    Call(u32),
    /// Return TOS to the caller
    Return,

    // Stack
    /// Discard TOS
    Pop,
    /// Duplicate TOS
    Dup,
    /// Duplicate the top two values
    Dup2,
    /// Swap the top two values
    Rot2,
    /// Move TOS below the next two values
    Rot3,
    /// Echo TOS through the display hook and pop it (single mode)
    PrintExpr,

    // Iteration and generators
    /// Replace TOS with its iterator
    GetIter,
    /// Push the next item of the iterator at TOS, or pop it and jump
    ForIter(u32),
    /// Suspend the generator, handing TOS to the caller
    Yield,
    /// Prepare TOS for delegation with `yield from`
    GetYieldFromIter,
    /// Delegate to the iterator at TOS until it is exhausted
    YieldFrom,

    // Exceptions
    /// Install a handler jumping to the target
    SetupExcept(u32),
    /// Remove the innermost handler
    PopExcept,
    /// Raise TOS (1) or re-raise the handled exception (0)
    Raise(u32),
    /// Test whether exception TOS1 matches class TOS
    ExceptionMatches,

    // Modules
    /// Import the named module and push it
    ImportName(u32),
    /// Push attribute `name` of the module at TOS
    ImportFrom(u32),
}

impl Opcode {
    /// Returns the jump target if this is a jump instruction
    pub fn jump_target(&self) -> Option<u32> {
        match self {
            Opcode::Jump(t)
            | Opcode::JumpIfFalse(t)
            | Opcode::JumpIfTrue(t)
            | Opcode::JumpIfFalseOrPop(t)
            | Opcode::JumpIfTrueOrPop(t)
            | Opcode::ForIter(t)
            | Opcode::SetupExcept(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns a copy with the jump target replaced
    pub fn with_jump_target(self, target: u32) -> Opcode {
        match self {
            Opcode::Jump(_) => Opcode::Jump(target),
            Opcode::JumpIfFalse(_) => Opcode::JumpIfFalse(target),
            Opcode::JumpIfTrue(_) => Opcode::JumpIfTrue(target),
            Opcode::JumpIfFalseOrPop(_) => Opcode::JumpIfFalseOrPop(target),
            Opcode::JumpIfTrueOrPop(_) => Opcode::JumpIfTrueOrPop(target),
            Opcode::ForIter(_) => Opcode::ForIter(target),
            Opcode::SetupExcept(_) => Opcode::SetupExcept(target),
            other => other,
        }
    }

    /// Check if this opcode ends the current frame's execution
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Return | Opcode::Raise(_))
    }
}
