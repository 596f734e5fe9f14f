//! Execution context for VM

use std::rc::Rc;

use bytecode_system::{BytecodeChunk, ChunkKind, Instruction};
use core_types::StackFrame;
use memory_manager::ObjRef;

use crate::value::Value;

/// Installed `except` handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    /// Instruction to jump to
    pub target: usize,
    /// Operand stack height above the frame base when installed
    pub depth: usize,
}

/// Execution context for one activation of a code object
///
/// The operand stack is shared by all frames; a frame owns the slice above
/// `stack_base`. A suspended generator frame moves that slice into
/// `saved_stack`.
pub struct ExecutionContext {
    /// The bytecode being executed
    pub code: Rc<BytecodeChunk>,
    /// Current instruction pointer
    pub instruction_pointer: usize,
    /// Fast local slots; `None` means unbound
    pub locals: Vec<Option<Value>>,
    /// Module providing globals
    pub module: ObjRef,
    /// Class that defined the running method
    pub owner: Option<ObjRef>,
    /// Stack height when the frame was entered
    pub stack_base: usize,
    /// Operand stack of a suspended frame
    pub saved_stack: Vec<Value>,
    /// Active `except` handlers, innermost last
    pub handlers: Vec<Handler>,
    /// Exception being handled, for bare `raise`
    pub current_exception: Option<Value>,
    /// Set while a bare `raise` leaves the frame; its traceback entry
    /// was recorded when the exception first passed through
    pub reraising: bool,
}

impl ExecutionContext {
    /// Create a new execution context
    pub fn new(
        code: Rc<BytecodeChunk>,
        module: ObjRef,
        locals: Vec<Option<Value>>,
        stack_base: usize,
    ) -> Self {
        Self {
            code,
            instruction_pointer: 0,
            locals,
            module,
            owner: None,
            stack_base,
            saved_stack: Vec::new(),
            handlers: Vec::new(),
            current_exception: None,
            reraising: false,
        }
    }

    /// Advance instruction pointer and return current instruction
    pub fn fetch(&mut self) -> Option<Instruction> {
        let inst = self.code.instructions.get(self.instruction_pointer).copied()?;
        self.instruction_pointer += 1;
        Some(inst)
    }

    /// Traceback entry for the instruction being executed
    pub fn stack_frame(&self) -> StackFrame {
        StackFrame {
            function_name: match self.code.kind {
                ChunkKind::Function => Some(self.code.name.clone()),
                ChunkKind::Module => None,
            },
            filename: self.code.filename.clone(),
            line: self
                .code
                .line_at(self.instruction_pointer.saturating_sub(1)),
        }
    }

    /// Push every handle this frame keeps alive
    pub fn trace(&self, out: &mut Vec<ObjRef>) {
        out.push(self.module);
        out.extend(self.owner);
        out.extend(self.locals.iter().flatten().filter_map(Value::as_object));
        out.extend(self.saved_stack.iter().filter_map(Value::as_object));
        out.extend(self.current_exception.iter().filter_map(Value::as_object));
    }
}
