//! Cooperative fiber VM.
//!
//! ## Design
//!
//! - Each fiber owns an [`Exec`](exec::Exec): a stack of frames, each frame
//!   with its own operand stack and a shared handle to its locals
//! - A `paral` block forks one branch `Exec` per child; branches share the
//!   parent frame's locals and are ticked in declaration order
//! - Deferred blocks are recorded per cleanup scope and run innermost-first
//!   when the scope ends, the frame returns or the branch is aborted
//! - Natives that need several ticks hand back a
//!   [`Coroutine`](crate::bindings::Coroutine) that the frame keeps ticking

mod block;
mod error;
mod exec;
mod fiber;
mod frame;
mod ops;
mod runtime;
mod stack;

#[cfg(test)]
mod block_test;

pub use error::VmError;
pub use fiber::FiberId;
pub use runtime::{VM, VmOptions};
pub use stack::Stack;

/// Progress of a fiber, a native coroutine or the VM as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Finished; nothing left to run.
    Success,
    /// Waiting for the next tick.
    Running,
}
