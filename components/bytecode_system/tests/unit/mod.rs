//! Unit test runner for bytecode_system

#[path = "test_chunk.rs"]
mod test_chunk;

#[path = "test_instruction.rs"]
mod test_instruction;

#[path = "test_opcode.rs"]
mod test_opcode;
