//! Tests for Instruction

use bytecode_system::{Instruction, Opcode};

#[test]
fn test_instruction_keeps_line() {
    let inst = Instruction::new(Opcode::Call(2), 14);
    assert_eq!(inst.line, 14);
    assert_eq!(inst.opcode, Opcode::Call(2));
}

#[test]
fn test_instruction_is_copy() {
    let inst = Instruction::new(Opcode::Yield, 1);
    let copy = inst;
    assert_eq!(inst, copy);
}
