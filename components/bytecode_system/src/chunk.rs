//! Bytecode chunk - compiled bytecode container
//!
//! Contains instructions, constants, names, local slots and metadata for one
//! module body, function body or expression.

use std::fmt::Write;
use std::rc::Rc;

use crate::constant::Constant;
use crate::instruction::Instruction;
use crate::opcode::Opcode;

/// What kind of code a chunk holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Module level statements; names resolve through the namespace
    Module,
    /// Function body; locals live in frame slots
    Function,
}

/// A compiled bytecode chunk
#[derive(Debug, Clone, PartialEq)]
pub struct BytecodeChunk {
    /// Function name, or `<module>`
    pub name: String,
    /// Filename the source was compiled from
    pub filename: String,
    /// Module or function body
    pub kind: ChunkKind,
    /// Parameter names, in order; they occupy the first local slots
    pub params: Vec<String>,
    /// All local slot names (function chunks only)
    pub locals: Vec<String>,
    /// Interned names used by name, attribute and import instructions
    pub names: Vec<Rc<str>>,
    /// Constant pool for literal values
    pub constants: Vec<Constant>,
    /// Sequence of bytecode instructions
    pub instructions: Vec<Instruction>,
    /// True if the body contains `yield`
    pub is_generator: bool,
    /// Leading string literal of a function body
    pub docstring: Option<String>,
}

impl BytecodeChunk {
    /// Create a new empty chunk
    pub fn new(name: impl Into<String>, filename: impl Into<String>, kind: ChunkKind) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            kind,
            params: Vec::new(),
            locals: Vec::new(),
            names: Vec::new(),
            constants: Vec::new(),
            instructions: Vec::new(),
            is_generator: false,
            docstring: None,
        }
    }

    /// Emit an instruction and return its index
    pub fn emit(&mut self, opcode: Opcode, line: u32) -> usize {
        self.instructions.push(Instruction::new(opcode, line));
        self.instructions.len() - 1
    }

    /// Point the jump at `index` to the next instruction to be emitted
    pub fn patch_jump(&mut self, index: usize) {
        let target = self.instructions.len() as u32;
        self.patch_jump_to(index, target);
    }

    /// Point the jump at `index` to `target`
    pub fn patch_jump_to(&mut self, index: usize, target: u32) {
        if let Some(inst) = self.instructions.get_mut(index) {
            inst.opcode = inst.opcode.with_jump_target(target);
        }
    }

    /// Index the next emitted instruction will get
    pub fn current_offset(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Add a constant to the constant pool and return its index
    pub fn add_constant(&mut self, value: Constant) -> u32 {
        if !matches!(value, Constant::Code(_)) {
            if let Some(idx) = self.constants.iter().position(|c| c == &value) {
                return idx as u32;
            }
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Intern a name and return its index
    pub fn add_name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.names.iter().position(|n| &**n == name) {
            return idx as u32;
        }
        self.names.push(Rc::from(name));
        (self.names.len() - 1) as u32
    }

    /// Slot of a local, declaring it if new
    pub fn add_local(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.local_index(name) {
            return idx;
        }
        self.locals.push(name.to_string());
        (self.locals.len() - 1) as u32
    }

    /// Slot of an existing local
    pub fn local_index(&self, name: &str) -> Option<u32> {
        self.locals.iter().position(|n| n == name).map(|i| i as u32)
    }

    /// Source line of the instruction at `ip`
    pub fn line_at(&self, ip: usize) -> u32 {
        self.instructions.get(ip).map(|inst| inst.line).unwrap_or(0)
    }

    /// Get the number of instructions
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Render a listing of this chunk and every nested function
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        let _ = writeln!(out, "== {} ({}) ==", self.name, self.filename);
        for (idx, inst) in self.instructions.iter().enumerate() {
            let detail = match inst.opcode {
                Opcode::LoadConst(i) => self
                    .constants
                    .get(i as usize)
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
                Opcode::LoadName(i)
                | Opcode::StoreName(i)
                | Opcode::DeleteName(i)
                | Opcode::LoadGlobal(i)
                | Opcode::StoreGlobal(i)
                | Opcode::DeleteGlobal(i)
                | Opcode::LoadAttr(i)
                | Opcode::StoreAttr(i)
                | Opcode::DeleteAttr(i)
                | Opcode::LoadSuperAttr(i)
                | Opcode::BuildClass { name: i, .. }
                | Opcode::ImportName(i)
                | Opcode::ImportFrom(i) => self
                    .names
                    .get(i as usize)
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                Opcode::LoadFast(i) | Opcode::StoreFast(i) | Opcode::DeleteFast(i) => {
                    self.locals.get(i as usize).cloned().unwrap_or_default()
                }
                _ => String::new(),
            };
            let _ = writeln!(
                out,
                "{:>4} {:>4}  {:<28} {}",
                inst.line,
                idx,
                format!("{:?}", inst.opcode),
                detail
            );
        }
        for constant in &self.constants {
            if let Constant::Code(code) = constant {
                out.push('\n');
                code.disassemble_into(out);
            }
        }
    }
}
