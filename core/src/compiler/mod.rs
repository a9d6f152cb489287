//! Bytecode compiler for fibril modules.
//!
//! Lowers a typed [`crate::ast::Module`] into a [`crate::bytecode::Module`]:
//! function bodies go to the main code stream, class registration goes to the
//! init stream and literals are pooled.
//!
//! ## Design
//!
//! - Single pass over each function body, with forward jumps resolved by the
//!   label [`emitter`] once the module is finished
//! - Tracks stack depth precisely for debugging
//! - Locals are frame slots; lambdas get their own frame and capture outer
//!   slots as upvalues on first mention
//! - Structured blocks (`seq`, `paral`, `paral_all`, `defer`) compile to a
//!   `Block` instruction that carries the offset of the block end

mod bytecode;
mod emitter;
mod error;

#[cfg(test)]
mod bytecode_test;

pub use bytecode::BytecodeCompiler;
pub use error::{CompileError, CompileErrorKind};
