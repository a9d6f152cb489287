use thiserror::Error;

use crate::bindings::BindError;
use crate::compiler::CompileError;
use crate::vm::VmError;

/// Any failure surfaced by the crate: compiling a module, binding host
/// natives or running fibers.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] VmError),

    #[error(transparent)]
    Bind(#[from] BindError),
}

impl Error {
    /// The innermost runtime fault, looking through the fiber wrapper.
    pub fn runtime_root(&self) -> Option<&VmError> {
        match self {
            Error::Runtime(err) => Some(err.root()),
            _ => None,
        }
    }
}
