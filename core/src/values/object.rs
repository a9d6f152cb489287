use alloc::boxed::Box;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;

use smallvec::SmallVec;

use super::pool::{Pools, ValCell};
use super::val::Val;
use crate::Vec;
use crate::symbols::Symbol;

/// Instance of a script class. Fields are laid out parent-first.
#[derive(Debug)]
pub struct Instance {
    pub class: Symbol,
    pub fields: Vec<Val>,
}

/// Host object created by a native class allocator.
pub struct NativeObj {
    class: Symbol,
    data: RefCell<Box<dyn Any>>,
}

impl NativeObj {
    pub fn new(class: Symbol, data: Box<dyn Any>) -> Self {
        Self {
            class,
            data: RefCell::new(data),
        }
    }

    pub fn class(&self) -> Symbol {
        self.class
    }

    /// Runs `f` on the payload if it is a `T`.
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.data.borrow().downcast_ref::<T>().map(f)
    }

    pub fn with_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.data.borrow_mut().downcast_mut::<T>().map(f)
    }

    pub(crate) fn data(&self) -> &RefCell<Box<dyn Any>> {
        &self.data
    }
}

impl fmt::Debug for NativeObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {:?}>", self.class)
    }
}

/// Function value: a script function or a closure.
///
/// Closures carry the cells they captured together with the slot each one
/// occupies in the closure's own frame.
pub struct FuncPtr {
    pub(crate) module: usize,
    pub(crate) offset: u32,
    /// Slots to reserve when entering a lambda frame; named functions size
    /// their frame with `InitFrame` instead and use 0.
    pub(crate) slots: u32,
    pub(crate) takes_args_info: bool,
    pub(crate) upvals: SmallVec<[(u32, ValCell); 2]>,
    pools: Pools,
}

impl FuncPtr {
    pub(crate) fn new(
        pools: &Pools,
        module: usize,
        offset: u32,
        slots: u32,
        takes_args_info: bool,
    ) -> Self {
        Self {
            module,
            offset,
            slots,
            takes_args_info,
            upvals: SmallVec::new(),
            pools: pools.clone(),
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn upvalue_count(&self) -> usize {
        self.upvals.len()
    }
}

impl Drop for FuncPtr {
    fn drop(&mut self) {
        for (_, cell) in self.upvals.drain(..) {
            self.pools.release_cell(cell);
        }
    }
}

impl fmt::Debug for FuncPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<func @{}", self.offset)?;
        if !self.upvals.is_empty() {
            write!(f, " +{} upvals", self.upvals.len())?;
        }
        write!(f, ">")
    }
}
