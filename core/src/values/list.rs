use core::fmt;
use core::mem;

use super::pool::Pools;
use super::val::Val;
use crate::Vec;

/// Array payload. Its backing vector comes from, and returns to, the VM's
/// list pool.
pub struct ValList {
    items: Vec<Val>,
    pools: Pools,
}

impl ValList {
    pub(crate) fn from_parts(items: Vec<Val>, pools: Pools) -> Self {
        debug_assert!(items.is_empty());
        Self { items, pools }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: Val) {
        self.items.push(value);
    }

    pub fn get(&self, idx: usize) -> Option<&Val> {
        self.items.get(idx)
    }

    /// Replaces the item at `idx`, returning false when out of bounds.
    pub fn set(&mut self, idx: usize, value: Val) -> bool {
        match self.items.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&mut self, idx: usize) -> Option<Val> {
        (idx < self.items.len()).then(|| self.items.remove(idx))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Val> {
        self.items.iter()
    }
}

impl Drop for ValList {
    fn drop(&mut self) {
        self.pools.release_list(mem::take(&mut self.items));
    }
}

impl fmt::Debug for ValList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
