use alloc::collections::BTreeMap;
use core::fmt;

use ecow::EcoString;
use serde::{Deserialize, Serialize};

use super::assembler::Listing;
use super::constants::Const;
use super::opcode::FuncArgsInfo;
use crate::Vec;
use crate::symbols::SymbolNames;

/// A compiled unit: main code, one-time init code, constants and the
/// function table. Loaded once and shared read-only by every fiber.
#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: EcoString,
    pub code: Vec<u8>,
    /// Class registration, run once by `VM::load_module`.
    pub init_code: Vec<u8>,
    pub constants: Vec<Const>,
    /// Function name -> absolute offset into `code`.
    pub func_offsets: BTreeMap<EcoString, u32>,
    /// Offset -> parameter layout of every named function.
    pub func_params: BTreeMap<u32, ParamLayout>,
    pub symbols: SymbolNames,
}

impl Module {
    pub fn func_offset(&self, name: &str) -> Option<u32> {
        self.func_offsets.get(name).copied()
    }

    pub fn params(&self, offset: u32) -> Option<ParamLayout> {
        self.func_params.get(&offset).copied()
    }

    /// Whether the function at `offset` expects its args info as an extra
    /// argument, which is the case when it has default parameters.
    pub fn takes_args_info(&self, offset: u32) -> bool {
        self.params(offset).is_some_and(|params| params.takes_args_info())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Parameters of a named function: how many there are and which of them
/// have a default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParamLayout {
    pub count: u32,
    /// Bit `i` is set when parameter `i` has a default.
    pub defaults: u64,
}

impl ParamLayout {
    pub fn new(defaults: impl IntoIterator<Item = bool>) -> Self {
        let mut layout = ParamLayout::default();
        for (idx, has_default) in defaults.into_iter().enumerate() {
            if has_default {
                layout.defaults |= 1 << idx;
            }
            layout.count += 1;
        }
        layout
    }

    pub fn default_count(&self) -> u32 {
        self.defaults.count_ones()
    }

    /// Parameters without a default.
    pub fn required(&self) -> u32 {
        self.count - self.default_count()
    }

    pub fn takes_args_info(&self) -> bool {
        self.defaults != 0
    }

    fn has_default(&self, idx: u32) -> bool {
        idx < 64 && self.defaults & (1 << idx) != 0
    }

    /// Args info for a call passing the first `supplied` parameters in
    /// order. Every parameter after them must have a default; `None` when
    /// one does not or when too many arguments are passed.
    pub fn positional(&self, supplied: u32) -> Option<FuncArgsInfo> {
        if supplied > self.count {
            return None;
        }
        let mut info = FuncArgsInfo::new(supplied)?;
        let mut default_idx = 0;
        for idx in 0..self.count {
            let has_default = self.has_default(idx);
            if idx >= supplied {
                if !has_default {
                    return None;
                }
                info.use_default(default_idx);
            }
            if has_default {
                default_idx += 1;
            }
        }
        Some(info)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Module {:?} {{", self.name)?;

        if !self.constants.is_empty() {
            writeln!(f, "  constants: [")?;
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, "    [{}] = {:?}", i, constant)?;
            }
            writeln!(f, "  ]")?;
        } else {
            writeln!(f, "  constants: []")?;
        }

        let mut funcs: Vec<_> = self.func_offsets.iter().collect();
        funcs.sort_by_key(|(_, offset)| **offset);
        writeln!(f, "  functions:")?;
        for (name, offset) in funcs {
            writeln!(f, "    {name} @{offset}")?;
        }

        if !self.init_code.is_empty() {
            writeln!(f, "  init:")?;
            write!(f, "{}", Listing(&self.init_code))?;
        }
        writeln!(f, "  code:")?;
        write!(f, "{}", Listing(&self.code))?;
        write!(f, "}}")
    }
}
