//! Bytecode instruction representation
//!
//! Contains the instruction structure with its source line.

use crate::opcode::Opcode;

/// A single bytecode instruction with the source line it was compiled from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    /// The opcode for this instruction
    pub opcode: Opcode,
    /// Source line (1-based), used for tracebacks
    pub line: u32,
}

impl Instruction {
    /// Create a new instruction
    pub fn new(opcode: Opcode, line: u32) -> Self {
        Self { opcode, line }
    }
}
