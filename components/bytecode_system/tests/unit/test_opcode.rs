//! Tests for Opcode helpers

use bytecode_system::{BinaryOp, CompareOp, Opcode, UnaryOp};

#[test]
fn test_every_jump_reports_target() {
    let jumps = [
        Opcode::Jump(3),
        Opcode::JumpIfFalse(3),
        Opcode::JumpIfTrue(3),
        Opcode::JumpIfFalseOrPop(3),
        Opcode::JumpIfTrueOrPop(3),
        Opcode::ForIter(3),
        Opcode::SetupExcept(3),
    ];
    for jump in jumps {
        assert_eq!(jump.jump_target(), Some(3));
        assert_eq!(jump.with_jump_target(8).jump_target(), Some(8));
    }
}

#[test]
fn test_non_jumps_are_unchanged() {
    let op = Opcode::Binary(BinaryOp::Mul);
    assert_eq!(op.with_jump_target(1), op);
    assert_eq!(Opcode::Unary(UnaryOp::Neg).jump_target(), None);
}

#[test]
fn test_compare_symbols() {
    assert_eq!(CompareOp::IsNot.symbol(), "is not");
    assert_eq!(CompareOp::Le.symbol(), "<=");
}
