//! Script Parser Component
//!
//! Provides lexer, parser, AST construction, scope analysis, and bytecode generation
//! for the embedded script dialect.
//!
//! # Overview
//!
//! - [`Lexer`] - Tokenizes source code, including indentation
//! - [`Token`] - Token types including identifiers, literals, keywords
//! - [`Parser`] - Recursive descent parser producing AST
//! - [`ASTNode`] - Abstract Syntax Tree node types
//! - [`BytecodeGenerator`] - Converts AST to bytecode
//! - [`ScopeAnalyzer`] - Splits function names into locals and globals
//!
//! # Example
//!
//! ```
//! use parser::{compile, CompileMode};
//!
//! let chunk = compile("x = 40 + 2", "<example>", CompileMode::Exec).unwrap();
//! assert!(chunk.instruction_count() > 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod bytecode_gen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;

use std::rc::Rc;

use bytecode_system::BytecodeChunk;
use core_types::ScriptResult;

pub use ast::{ASTNode, Expression, Statement, StatementKind};
pub use bytecode_gen::{BytecodeGenerator, CompileMode};
pub use error::UNEXPECTED_EOF;
pub use lexer::{Keyword, Lexer, Punctuator, Token};
pub use parser::Parser;
pub use scope::{ScopeAnalyzer, ScopeInfo};

/// Parse and compile source text into a module chunk
pub fn compile(source: &str, filename: &str, mode: CompileMode) -> ScriptResult<Rc<BytecodeChunk>> {
    let mut parser = Parser::new(source)?;
    let ast = match mode {
        CompileMode::Eval => parser.parse_expression_input()?,
        CompileMode::Exec | CompileMode::Single => parser.parse()?,
    };
    let chunk = BytecodeGenerator::new(filename, mode).generate(&ast)?;
    Ok(Rc::new(chunk))
}

/// True if the error means the source ended before a construct was complete
pub fn is_incomplete_input(error: &core_types::ScriptError) -> bool {
    error.kind == core_types::ErrorKind::SyntaxError && error.message == UNEXPECTED_EOF
}
