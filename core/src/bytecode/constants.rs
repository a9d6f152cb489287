//! Deduplicated literal table.

use core::fmt;

use ecow::EcoString;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::Vec;

/// One constant-pool entry.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Nil,
    Num(f64),
    Bool(bool),
    Str(EcoString),
}

impl fmt::Debug for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Nil => write!(f, "nil"),
            Const::Num(n) => write!(f, "{n}"),
            Const::Bool(b) => write!(f, "{b}"),
            Const::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Structural identity of a constant: numbers compare by bit pattern so that
/// the key can be hashed.
#[derive(Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Nil,
    Num(u64),
    Bool(bool),
    Str(EcoString),
}

impl From<&Const> for ConstKey {
    fn from(value: &Const) -> Self {
        match value {
            Const::Nil => ConstKey::Nil,
            Const::Num(n) => ConstKey::Num(n.to_bits()),
            Const::Bool(b) => ConstKey::Bool(*b),
            Const::Str(s) => ConstKey::Str(s.clone()),
        }
    }
}

/// Constant pool under construction. Indices are assigned in order of first
/// use; identical literals share one index.
#[derive(Default)]
pub struct ConstPool {
    constants: Vec<Const>,
    index: HashMap<ConstKey, u32>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `value`, adding it if it is new.
    pub fn add(&mut self, value: Const) -> Option<u32> {
        let key = ConstKey::from(&value);
        if let Some(&idx) = self.index.get(&key) {
            return Some(idx);
        }
        let idx = u32::try_from(self.constants.len()).ok()?;
        self.constants.push(value);
        self.index.insert(key, idx);
        Some(idx)
    }

    pub fn get(&self, idx: u32) -> Option<&Const> {
        self.constants.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn into_vec(self) -> Vec<Const> {
        self.constants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_literals_share_an_index() {
        let mut pool = ConstPool::new();
        assert_eq!(pool.add(Const::Num(10.0)), Some(0));
        assert_eq!(pool.add(Const::Num(10.0)), Some(0));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.add(Const::Num(20.0)), Some(1));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut pool = ConstPool::new();
        let one = pool.add(Const::Num(1.0));
        let t = pool.add(Const::Bool(true));
        let s = pool.add(Const::Str("1".into()));
        let nil = pool.add(Const::Nil);
        assert_eq!([one, t, s, nil], [Some(0), Some(1), Some(2), Some(3)]);
        assert_eq!(pool.add(Const::Str("1".into())), Some(2));
        assert_eq!(pool.get(2), Some(&Const::Str("1".into())));
    }
}
