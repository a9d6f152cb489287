//! Call frames, local cells and cleanup scopes.

use alloc::rc::Rc;
use core::cell::RefCell;

use smallvec::SmallVec;

use crate::Vec;
use crate::bindings::Coroutine;
use crate::bytecode::FuncArgsInfo;
use crate::values::{Pools, Val, ValCell};
use crate::{Box, vec};

use super::block::Paral;
use super::{Stack, VmError};

/// Local variable cells of one function activation.
///
/// Shared by the frame, by the branches of any `paral` block running in it
/// and by deferred blocks; closures share individual cells.
pub(crate) struct Locals {
    cells: RefCell<Vec<ValCell>>,
    pools: Pools,
}

impl Locals {
    pub fn new(pools: &Pools) -> Rc<Self> {
        Rc::new(Self {
            cells: RefCell::new(Vec::new()),
            pools: pools.clone(),
        })
    }

    /// `slots` fresh cells, except where a closure binds a captured one.
    pub fn for_closure(pools: &Pools, slots: u32, upvals: &[(u32, ValCell)]) -> Rc<Self> {
        let cells = (0..slots)
            .map(|slot| match upvals.iter().find(|(dst, _)| *dst == slot) {
                Some((_, cell)) => cell.clone(),
                None => pools.cell(),
            })
            .collect();
        Rc::new(Self {
            cells: RefCell::new(cells),
            pools: pools.clone(),
        })
    }

    /// Grows the frame to at least `count` cells.
    pub fn reserve(&self, count: u32) {
        let mut cells = self.cells.borrow_mut();
        while cells.len() < count as usize {
            cells.push(self.pools.cell());
        }
    }

    pub fn cell(&self, slot: u32) -> Result<ValCell, VmError> {
        self.cells
            .borrow()
            .get(slot as usize)
            .cloned()
            .ok_or(VmError::BadSlot { slot })
    }

    pub fn get(&self, slot: u32) -> Result<Val, VmError> {
        Ok(self.cell(slot)?.borrow().clone())
    }

    pub fn set(&self, slot: u32, value: Val) -> Result<(), VmError> {
        let cell = self.cell(slot)?;
        let old = cell.replace(value);
        drop(old);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }
}

impl Drop for Locals {
    fn drop(&mut self) {
        for cell in self.cells.get_mut().drain(..) {
            self.pools.release_cell(cell);
        }
    }
}

/// Code range of a deferred block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeferSpan {
    pub start: usize,
    pub end: usize,
}

/// A cleanup scope: ends when the frame's ip reaches `end`.
#[derive(Debug)]
pub(crate) struct Scope {
    pub end: usize,
    pub defers: SmallVec<[DeferSpan; 2]>,
}

impl Scope {
    pub fn new(end: usize) -> Self {
        Self {
            end,
            defers: SmallVec::new(),
        }
    }
}

/// Native coroutine owned by a frame. Dropping an unfinished one runs its
/// cleanup hook.
pub(crate) struct NativeTask(Option<Box<dyn Coroutine>>);

impl NativeTask {
    pub fn new(co: Box<dyn Coroutine>) -> Self {
        Self(Some(co))
    }

    pub fn coroutine(&mut self) -> Option<&mut Box<dyn Coroutine>> {
        self.0.as_mut()
    }

    /// Drops the coroutine without cleanup.
    pub fn finish(mut self) {
        self.0 = None;
    }
}

impl Drop for NativeTask {
    fn drop(&mut self) {
        if let Some(co) = self.0.as_mut() {
            co.cleanup();
        }
    }
}

/// Work a frame waits on before it can continue.
pub(crate) enum Pending {
    Native(NativeTask),
    Paral(Box<Paral>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// A function activation. Its root scope lasts until it returns.
    Func,
    /// A `paral` branch or a deferred block: runs `[start, end)` of its
    /// module over borrowed locals and finishes at `end`.
    Branch { end: usize },
}

pub(crate) struct Frame {
    pub module: usize,
    pub ip: usize,
    pub kind: FrameKind,
    pub locals: Rc<Locals>,
    pub stack: Stack<Val>,
    pub scopes: Vec<Scope>,
    pub pending: Option<Pending>,
    pub args_info: FuncArgsInfo,
}

impl Frame {
    pub fn call(
        module: usize,
        ip: usize,
        locals: Rc<Locals>,
        max_stack: usize,
        args_info: FuncArgsInfo,
    ) -> Self {
        Self {
            module,
            ip,
            kind: FrameKind::Func,
            locals,
            stack: Stack::new(max_stack),
            scopes: vec![Scope::new(usize::MAX)],
            pending: None,
            args_info,
        }
    }

    pub fn branch(
        module: usize,
        start: usize,
        end: usize,
        locals: Rc<Locals>,
        max_stack: usize,
    ) -> Self {
        Self {
            module,
            ip: start,
            kind: FrameKind::Branch { end },
            locals,
            stack: Stack::new(max_stack),
            scopes: Vec::new(),
            pending: None,
            args_info: FuncArgsInfo::default(),
        }
    }

    /// Scope that a `defer` at the current ip registers with.
    pub fn defer_scope(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            let end = match self.kind {
                FrameKind::Branch { end } => end,
                FrameKind::Func => usize::MAX,
            };
            self.scopes.push(Scope::new(end));
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// All deferred blocks still registered, in the order they must run:
    /// innermost scope first, latest registration first.
    pub fn take_defers(&mut self) -> Vec<DeferSpan> {
        let mut spans = Vec::new();
        while let Some(scope) = self.scopes.pop() {
            spans.extend(scope.defers.into_iter().rev());
        }
        spans
    }
}
