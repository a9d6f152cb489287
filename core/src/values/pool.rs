//! VM-owned free lists.
//!
//! Every VM owns one [`Pools`] handle; values created by that VM keep a clone
//! of it so that storage returns to the right free list when they die. After
//! all fibers are done and every result has been popped, each pool must report
//! as many free entries as it ever allocated.

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::fmt;

use hashbrown::HashMap;

use super::dict::{DictKey, ValDict};
use super::list::ValList;
use super::val::Val;
use crate::Vec;

/// A local-variable cell, shared between a frame and the closures that
/// capture it.
pub type ValCell = Rc<RefCell<Val>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Entries ever created by this pool.
    pub allocated: usize,
    /// Entries currently sitting in the free list.
    pub free: usize,
}

impl PoolStats {
    pub fn in_use(&self) -> usize {
        self.allocated - self.free
    }

    pub fn is_balanced(&self) -> bool {
        self.allocated == self.free
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolsStats {
    pub vals: PoolStats,
    pub lists: PoolStats,
    pub dicts: PoolStats,
}

impl PoolsStats {
    pub fn is_balanced(&self) -> bool {
        self.vals.is_balanced() && self.lists.is_balanced() && self.dicts.is_balanced()
    }
}

struct Pool<T> {
    free: RefCell<Vec<T>>,
    allocated: Cell<usize>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            free: RefCell::new(Vec::new()),
            allocated: Cell::new(0),
        }
    }
}

impl<T> Pool<T> {
    fn take(&self, make: impl FnOnce() -> T) -> T {
        let reused = self.free.borrow_mut().pop();
        match reused {
            Some(item) => item,
            None => {
                self.allocated.set(self.allocated.get() + 1);
                make()
            }
        }
    }

    fn give_back(&self, item: T) {
        self.free.borrow_mut().push(item);
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.get(),
            free: self.free.borrow().len(),
        }
    }
}

#[derive(Default)]
struct PoolsInner {
    vals: Pool<ValCell>,
    lists: Pool<Vec<Val>>,
    dicts: Pool<HashMap<DictKey, Val>>,
}

/// Shared handle to one VM's pools.
#[derive(Clone, Default)]
pub struct Pools(Rc<PoolsInner>);

impl Pools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_list(&self) -> ValList {
        ValList::from_parts(self.0.lists.take(Vec::new), self.clone())
    }

    pub fn new_dict(&self) -> ValDict {
        ValDict::from_parts(self.0.dicts.take(HashMap::new), self.clone())
    }

    pub fn stats(&self) -> PoolsStats {
        PoolsStats {
            vals: self.0.vals.stats(),
            lists: self.0.lists.stats(),
            dicts: self.0.dicts.stats(),
        }
    }

    pub(crate) fn cell(&self) -> ValCell {
        self.0.vals.take(|| Rc::new(RefCell::new(Val::Nil)))
    }

    /// Drops one holder's reference; the last holder returns the cell.
    pub(crate) fn release_cell(&self, cell: ValCell) {
        if Rc::strong_count(&cell) != 1 {
            return;
        }
        // Release the payload before pooling: dropping it may recurse into
        // these pools.
        let payload = cell.replace(Val::Nil);
        drop(payload);
        self.0.vals.give_back(cell);
    }

    pub(crate) fn release_list(&self, mut items: Vec<Val>) {
        items.clear();
        self.0.lists.give_back(items);
    }

    pub(crate) fn release_dict(&self, mut entries: HashMap<DictKey, Val>) {
        entries.clear();
        self.0.dicts.give_back(entries);
    }
}

impl fmt::Debug for Pools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pools").field(&self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_reused() {
        let pools = Pools::new();
        let cell = pools.cell();
        *cell.borrow_mut() = Val::Num(3.0);
        pools.release_cell(cell);
        assert_eq!(pools.stats().vals, PoolStats { allocated: 1, free: 1 });

        let again = pools.cell();
        assert!(again.borrow().is_nil());
        assert_eq!(pools.stats().vals, PoolStats { allocated: 1, free: 0 });
        pools.release_cell(again);
        assert!(pools.stats().is_balanced());
    }

    #[test]
    fn shared_cell_returns_with_last_holder() {
        let pools = Pools::new();
        let cell = pools.cell();
        let captured = cell.clone();
        pools.release_cell(cell);
        assert_eq!(pools.stats().vals.in_use(), 1);
        pools.release_cell(captured);
        assert!(pools.stats().is_balanced());
    }

    #[test]
    fn nested_containers_return_their_storage() {
        let pools = Pools::new();
        {
            let mut outer = pools.new_list();
            let mut inner = pools.new_dict();
            inner.insert(DictKey::Num(1f64.to_bits()), Val::Bool(true));
            outer.push(Val::from(inner));
            outer.push(Val::from(pools.new_list()));
            assert_eq!(pools.stats().lists.in_use(), 2);
        }
        let stats = pools.stats();
        assert_eq!(stats.lists, PoolStats { allocated: 2, free: 2 });
        assert_eq!(stats.dicts, PoolStats { allocated: 1, free: 1 });
    }
}
