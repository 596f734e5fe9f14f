//! Tests for BytecodeChunk

use std::rc::Rc;

use bytecode_system::{BytecodeChunk, ChunkKind, Constant, Opcode};

fn module_chunk() -> BytecodeChunk {
    BytecodeChunk::new("<module>", "test.py", ChunkKind::Module)
}

#[test]
fn test_chunk_creation() {
    let chunk = module_chunk();
    assert_eq!(chunk.instructions.len(), 0);
    assert_eq!(chunk.constants.len(), 0);
    assert!(!chunk.is_generator);
    assert_eq!(chunk.kind, ChunkKind::Module);
}

#[test]
fn test_chunk_emit_returns_index() {
    let mut chunk = module_chunk();
    assert_eq!(chunk.emit(Opcode::LoadNone, 1), 0);
    assert_eq!(chunk.emit(Opcode::Return, 1), 1);
    assert_eq!(chunk.instruction_count(), 2);
    assert_eq!(chunk.current_offset(), 2);
}

#[test]
fn test_chunk_names_are_interned() {
    let mut chunk = module_chunk();
    let a = chunk.add_name("print");
    let b = chunk.add_name("len");
    let c = chunk.add_name("print");
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(&*chunk.names[b as usize], "len");
}

#[test]
fn test_chunk_locals() {
    let mut chunk = BytecodeChunk::new("f", "test.py", ChunkKind::Function);
    assert_eq!(chunk.add_local("x"), 0);
    assert_eq!(chunk.add_local("y"), 1);
    assert_eq!(chunk.add_local("x"), 0);
    assert_eq!(chunk.local_index("y"), Some(1));
    assert_eq!(chunk.local_index("z"), None);
}

#[test]
fn test_code_constants_are_not_deduplicated() {
    let mut chunk = module_chunk();
    let body = Rc::new(BytecodeChunk::new("f", "test.py", ChunkKind::Function));
    let a = chunk.add_constant(Constant::Code(body.clone()));
    let b = chunk.add_constant(Constant::Code(body));
    assert_ne!(a, b);
}

#[test]
fn test_patch_jump_to_explicit_target() {
    let mut chunk = module_chunk();
    let jump = chunk.emit(Opcode::Jump(0), 1);
    chunk.patch_jump_to(jump, 7);
    assert_eq!(chunk.instructions[jump].opcode, Opcode::Jump(7));
}

#[test]
fn test_disassemble_includes_nested_functions() {
    let mut inner = BytecodeChunk::new("helper", "test.py", ChunkKind::Function);
    inner.emit(Opcode::LoadNone, 2);
    inner.emit(Opcode::Return, 2);

    let mut chunk = module_chunk();
    let code = chunk.add_constant(Constant::Code(Rc::new(inner)));
    chunk.emit(Opcode::MakeFunction { code, defaults: 0 }, 1);
    let name = chunk.add_name("helper");
    chunk.emit(Opcode::StoreName(name), 1);

    let listing = chunk.disassemble();
    assert!(listing.contains("== <module> (test.py) =="));
    assert!(listing.contains("== helper (test.py) =="));
    assert!(listing.contains("StoreName"));
}
