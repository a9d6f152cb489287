use core::fmt;

use ecow::EcoString;

use crate::Vec;
use crate::values::Val;

use super::exec::{Exec, Exit, Step};
use super::runtime::Runtime;
use super::{Status, VmError};

/// Handle of a fiber started with [`VM::start`](super::VM::start).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(pub(crate) u32);

impl FiberId {
    /// Rebuilds a handle from [`FiberId::id`]. Ids are never reused by a VM.
    pub const fn from_raw(id: u32) -> Self {
        FiberId(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct Fiber {
    pub id: FiberId,
    pub func: EcoString,
    pub exec: Exec,
}

impl Fiber {
    /// Runs the fiber until it yields or completes. A returned value is
    /// appended to `results`.
    pub fn tick(&mut self, rt: &Runtime, results: &mut Vec<Val>) -> Result<Status, VmError> {
        tracing::trace!(fiber = ?self.id, func = %self.func, depth = self.exec.depth(), "tick");
        match self.exec.run(rt)? {
            Step::Running => Ok(Status::Running),
            Step::Done(Exit::Returned(Some(value))) => {
                results.push(value);
                Ok(Status::Success)
            }
            Step::Done(_) => Ok(Status::Success),
        }
    }
}
