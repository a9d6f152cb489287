//! Symbol ids for class, field and type names.
//!
//! Bytecode never carries names, only [`Symbol`] ids. Ids are derived from the
//! name itself (32-bit FNV-1a), so modules compiled separately agree on them
//! without sharing an interner. Debug builds, or builds with the
//! `symbol-names` feature, additionally keep an id -> name side table in
//! [`SymbolNames`] for listings and error messages.

use alloc::collections::BTreeMap;
use core::fmt;

use ecow::EcoString;
use serde::{Deserialize, Serialize};

/// A single integer id standing for a class, field or type name.
///
/// `Symbol::NONE` (id 0) is reserved for "no symbol", e.g. a class without a
/// parent; no name ever hashes to it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    pub const NONE: Symbol = Symbol(0);

    /// Computes the id for `name`.
    pub const fn new(name: &str) -> Symbol {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0x811c_9dc5;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(0x0100_0193);
            i += 1;
        }
        if hash == 0 { Symbol(1) } else { Symbol(hash) }
    }

    /// Rebuilds a symbol from an operand read out of bytecode.
    pub const fn from_raw(id: u32) -> Symbol {
        Symbol(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

/// Symbols of the built-in types.
pub mod types {
    use super::Symbol;

    pub const INT: Symbol = Symbol::new("int");
    pub const FLOAT: Symbol = Symbol::new("float");
    pub const BOOL: Symbol = Symbol::new("bool");
    pub const STRING: Symbol = Symbol::new("string");
    pub const VOID: Symbol = Symbol::new("void");
    pub const ANY: Symbol = Symbol::new("any");
    pub const FUNC: Symbol = Symbol::new("func");
    /// Every array type, whatever its element type.
    pub const ARRAY: Symbol = Symbol::new("[]");
    /// Every dict type, whatever its key and value types.
    pub const DICT: Symbol = Symbol::new("[:]");

    pub(crate) const BUILTIN: [(Symbol, &str); 9] = [
        (INT, "int"),
        (FLOAT, "float"),
        (BOOL, "bool"),
        (STRING, "string"),
        (VOID, "void"),
        (ANY, "any"),
        (FUNC, "func"),
        (ARRAY, "[]"),
        (DICT, "[:]"),
    ];
}

/// Optional id -> name table.
///
/// When names are not recorded (release builds without `symbol-names`),
/// [`SymbolNames::intern`] still returns the right id but cannot detect two
/// names hashing to the same id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolNames {
    names: BTreeMap<Symbol, EcoString>,
}

impl SymbolNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, recording it when names are kept.
    ///
    /// Fails with the previously recorded name when a different name already
    /// owns the same id.
    pub fn intern(&mut self, name: &str) -> Result<Symbol, EcoString> {
        let sym = Symbol::new(name);
        if cfg!(any(debug_assertions, feature = "symbol-names")) {
            match self.names.get(&sym) {
                Some(existing) if existing.as_str() != name => return Err(existing.clone()),
                Some(_) => {}
                None => {
                    self.names.insert(sym, EcoString::from(name));
                }
            }
        }
        Ok(sym)
    }

    pub fn name(&self, sym: Symbol) -> Option<&str> {
        if let Some(name) = self.names.get(&sym) {
            return Some(name.as_str());
        }
        types::BUILTIN
            .iter()
            .find(|(builtin, _)| *builtin == sym)
            .map(|(_, name)| *name)
    }

    pub fn extend(&mut self, other: &SymbolNames) {
        for (sym, name) in &other.names {
            self.names.entry(*sym).or_insert_with(|| name.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Formats `sym` by name when known, by id otherwise.
    pub fn display(&self, sym: Symbol) -> impl fmt::Display + '_ {
        DisplaySymbol { names: self, sym }
    }
}

struct DisplaySymbol<'a> {
    names: &'a SymbolNames,
    sym: Symbol,
}

impl fmt::Display for DisplaySymbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.names.name(self.sym) {
            Some(name) => f.write_str(name),
            None => write!(f, "{:?}", self.sym),
        }
    }
}
