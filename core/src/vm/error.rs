//! Runtime faults.

use ecow::EcoString;
use thiserror::Error;

use crate::bytecode::{DecodeError, Opcode};
use crate::symbols::Symbol;
use crate::values::ValKind;

use super::FiberId;

/// A fault raised while executing bytecode.
///
/// Every variant except [`VmError::Fiber`] describes the fault itself;
/// `VM::tick` wraps those with the id of the fiber that raised them. The
/// faulting fiber is removed, the others keep running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("bytecode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("value stack underflow at {op:?}")]
    StackUnderflow { op: Opcode },

    #[error("value stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    #[error("call depth limit {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("local slot {slot} is out of range")]
    BadSlot { slot: u32 },

    #[error("constant {idx} is out of range")]
    BadConstant { idx: u32 },

    #[error("malformed {what} at offset {offset}")]
    Malformed { what: &'static str, offset: usize },

    #[error("no native function with index {idx}")]
    UnknownNative { idx: u32 },

    #[error("native function `{name}` failed: {message}")]
    Native { name: EcoString, message: EcoString },

    #[error("function at offset {offset} takes {min} to {max} arguments, got {found}")]
    ArgCount {
        offset: u32,
        min: u32,
        max: u32,
        found: u32,
    },

    #[error("no function named `{name}`")]
    UnknownFunction { name: EcoString },

    #[error("function `{name}` is defined by more than one module")]
    DuplicateFunction { name: EcoString },

    #[error("class {class:?} is not registered")]
    UnknownClass { class: Symbol },

    #[error("class {class:?} is registered twice")]
    DuplicateClass { class: Symbol },

    #[error("class {class:?} has no member {idx}")]
    UnknownMember { class: Symbol, idx: u32 },

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: ValKind },

    #[error("cannot cast {found} to {target:?}")]
    BadCast { found: ValKind, target: Symbol },

    #[error("index {idx} is out of bounds for length {len}")]
    IndexOutOfBounds { idx: f64, len: usize },

    #[error("key {key} is not in the dict")]
    KeyNotFound { key: EcoString },

    #[error("closure upvalues can only be bound right after `Lambda`")]
    BadUpvalue,

    #[error("a deferred block suspended; defer bodies must finish in one go")]
    DeferSuspended,

    #[error("no live fiber {0:?}")]
    UnknownFiber(FiberId),

    #[error("fiber {id:?} faulted: {source}")]
    Fiber {
        id: FiberId,
        #[source]
        source: alloc::boxed::Box<VmError>,
    },
}

impl VmError {
    pub fn native(name: impl Into<EcoString>, message: impl Into<EcoString>) -> Self {
        VmError::Native {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The underlying fault, looking through the fiber wrapper.
    pub fn root(&self) -> &VmError {
        match self {
            VmError::Fiber { source, .. } => source.root(),
            other => other,
        }
    }
}
