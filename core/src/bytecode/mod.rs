//! Bytecode format: operand codec, instruction set, constant pool and the
//! compiled [`Module`].

pub mod assembler;
pub mod codec;
mod constants;
pub mod members;
mod module;
mod opcode;

pub use assembler::{Assembler, Decoded, Listing, assemble, decode_at, disassemble};
pub use codec::DecodeError;
pub use constants::{Const, ConstPool};
pub use module::{Module, ParamLayout};
pub use opcode::{BlockKind, CallKind, FuncArgsInfo, Opcode};
