use core::fmt;
use core::mem;

use ecow::EcoString;
use hashbrown::HashMap;

use super::pool::Pools;
use super::val::Val;

/// Hashable projection of a [`Val`] used as a dict key. Numbers key by bit
/// pattern; nil and objects cannot be keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Num(u64),
    Bool(bool),
    Str(EcoString),
}

impl DictKey {
    pub fn from_val(value: &Val) -> Option<DictKey> {
        match value {
            Val::Num(n) => Some(DictKey::Num(n.to_bits())),
            Val::Bool(b) => Some(DictKey::Bool(*b)),
            Val::Str(s) => Some(DictKey::Str(s.clone())),
            Val::Nil | Val::Obj(_) => None,
        }
    }

    pub fn to_val(&self) -> Val {
        match self {
            DictKey::Num(bits) => Val::Num(f64::from_bits(*bits)),
            DictKey::Bool(b) => Val::Bool(*b),
            DictKey::Str(s) => Val::Str(s.clone()),
        }
    }
}

/// Dict payload backed by a pooled map.
pub struct ValDict {
    entries: HashMap<DictKey, Val>,
    pools: Pools,
}

impl ValDict {
    pub(crate) fn from_parts(entries: HashMap<DictKey, Val>, pools: Pools) -> Self {
        debug_assert!(entries.is_empty());
        Self { entries, pools }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: DictKey, value: Val) -> Option<Val> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &DictKey) -> Option<&Val> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &DictKey) -> Option<Val> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &DictKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DictKey, &Val)> {
        self.entries.iter()
    }
}

impl Drop for ValDict {
    fn drop(&mut self) {
        self.pools.release_dict(mem::take(&mut self.entries));
    }
}

impl fmt::Debug for ValDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k.to_val(), v)))
            .finish()
    }
}
