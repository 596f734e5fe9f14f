//! Contract compliance tests for bytecode_system
//! Verifies the API the compiler and VM rely on

use std::rc::Rc;

use bytecode_system::{BytecodeChunk, ChunkKind, Constant, Instruction, Opcode};

/// Verify the opcode groups the compiler emits exist
#[test]
fn test_contract_opcode_variants() {
    let _ = Opcode::LoadConst(0);
    let _ = Opcode::LoadName(0);
    let _ = Opcode::LoadFast(0);
    let _ = Opcode::LoadGlobal(0);
    let _ = Opcode::LoadAttr(0);
    let _ = Opcode::MakeFunction {
        code: 0,
        defaults: 0,
    };
    let _ = Opcode::YieldFrom;
    let _ = Opcode::SetupExcept(0);
    let _ = Opcode::ImportName(0);
    let _ = Opcode::PrintExpr;
}

/// Verify constants cover the literal kinds of the language
#[test]
fn test_contract_constant_variants() {
    let _ = Constant::Int(1);
    let _ = Constant::Float(1.0);
    let _ = Constant::Str(Rc::from("s"));
    let _ = Constant::Bytes(Rc::from(&b"b"[..]));
    let _ = Constant::Code(Rc::new(BytecodeChunk::new(
        "f",
        "<string>",
        ChunkKind::Function,
    )));
}

/// Verify chunks record the line of every instruction
#[test]
fn test_contract_instruction_lines() {
    let mut chunk = BytecodeChunk::new("<module>", "<string>", ChunkKind::Module);
    chunk.emit(Opcode::LoadNone, 4);
    assert_eq!(chunk.instructions[0], Instruction::new(Opcode::LoadNone, 4));
    assert_eq!(chunk.line_at(0), 4);
}
