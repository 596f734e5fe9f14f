//! Bytecode system for the script runtime
//!
//! This crate provides the instruction set, the compiled code container and
//! a disassembler for the stack-based VM.
//!
//! # Features
//!
//! - Compact `Copy` opcodes with `u32` operands
//! - Per-code-object name, local and constant tables
//! - Jump patching helpers for the compiler
//! - Human-readable disassembly
//!
//! # Example
//!
//! ```
//! use bytecode_system::{BytecodeChunk, ChunkKind, Constant, Opcode};
//!
//! let mut chunk = BytecodeChunk::new("<module>", "<string>", ChunkKind::Module);
//!
//! let idx = chunk.add_constant(Constant::Int(42));
//! chunk.emit(Opcode::LoadConst(idx), 1);
//! chunk.emit(Opcode::Return, 1);
//!
//! assert!(chunk.disassemble().contains("LoadConst"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod constant;
pub mod instruction;
pub mod opcode;

// Re-export main types at crate root
pub use chunk::{BytecodeChunk, ChunkKind};
pub use constant::Constant;
pub use instruction::Instruction;
pub use opcode::{BinaryOp, CompareOp, Opcode, UnaryOp};
