//! `paral` and `paral_all` blocks.
//!
//! The body of a parallel block is a sequence of child blocks. Every non-defer
//! child becomes a branch: an [`Exec`] rooted at the child's own `Block`
//! instruction and sharing the parent frame's locals. Defer children belong to
//! the parallel block itself and run, latest first, once it completes or is
//! abandoned.

use alloc::rc::Rc;

use tracing::debug;

use crate::Vec;
use crate::bytecode::{BlockKind, Opcode, decode_at};

use super::VmError;
use super::exec::{Exec, Exit, Step, run_defers};
use super::frame::{DeferSpan, Frame, Locals};
use super::runtime::Runtime;

pub(crate) struct Paral {
    /// `paral_all`: wait for every branch instead of the first.
    all: bool,
    module: usize,
    locals: Rc<Locals>,
    /// `None` once a branch has finished.
    branches: Vec<Option<Exec>>,
    defers: Vec<DeferSpan>,
}

impl Paral {
    /// Splits the body `[start, end)` of a parallel block into branches.
    pub fn fork(
        rt: &Runtime,
        parent: &Frame,
        all: bool,
        start: usize,
        end: usize,
    ) -> Result<Self, VmError> {
        let code = &rt.module(parent.module)?.code;
        let mut branches = Vec::new();
        let mut defers = Vec::new();

        let mut offset = start;
        while offset < end {
            let inst = decode_at(code, offset)?;
            let kind = match inst.op {
                Opcode::Block => BlockKind::from_operand(inst.operands[0]),
                _ => None,
            };
            let Some(kind) = kind else {
                return Err(VmError::Malformed {
                    what: "parallel block child",
                    offset,
                });
            };
            let child_end = inst.end() + inst.operands[1] as usize;
            if kind == BlockKind::Defer {
                defers.push(DeferSpan {
                    start: inst.end(),
                    end: child_end,
                });
            } else {
                let root = Frame::branch(
                    parent.module,
                    offset,
                    child_end,
                    parent.locals.clone(),
                    rt.options.max_stack_size,
                );
                branches.push(Some(Exec::new(root)));
            }
            offset = child_end;
        }
        debug!(
            branches = branches.len(),
            defers = defers.len(),
            all,
            "fork"
        );

        Ok(Self {
            all,
            module: parent.module,
            locals: parent.locals.clone(),
            branches,
            defers,
        })
    }

    /// Ticks every live branch once, in declaration order.
    pub fn tick(&mut self, rt: &Runtime) -> Result<Step, VmError> {
        for idx in 0..self.branches.len() {
            let Some(exec) = self.branches[idx].as_mut() else {
                continue;
            };
            match exec.run(rt)? {
                Step::Running => {}
                Step::Done(Exit::Finished) => {
                    self.branches[idx] = None;
                    if !self.all {
                        self.abort(rt)?;
                        return Ok(Step::Done(Exit::Finished));
                    }
                }
                Step::Done(Exit::Returned(value)) => {
                    self.branches[idx] = None;
                    self.abort(rt)?;
                    return Ok(Step::Done(Exit::Returned(value)));
                }
            }
        }

        if self.branches.iter().all(Option::is_none) {
            self.abort(rt)?;
            return Ok(Step::Done(Exit::Finished));
        }
        Ok(Step::Running)
    }

    /// Abandons the remaining branches, then runs the block's own defers.
    pub fn abort(&mut self, rt: &Runtime) -> Result<(), VmError> {
        for mut exec in self.branches.iter_mut().filter_map(Option::take) {
            exec.abort(rt)?;
        }
        let defers = core::mem::take(&mut self.defers);
        run_defers(rt, self.module, &self.locals, defers.into_iter().rev())
    }
}
