//! Bytecode compilation errors.

use core::fmt;

use ecow::EcoString;
use thiserror::Error;

use crate::bytecode::FuncArgsInfo;

/// A compile error, tagged with the source file when the module has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub file: Option<EcoString>,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(file: Option<&str>, kind: CompileErrorKind) -> Self {
        Self {
            file: file.map(EcoString::from),
            kind,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}: {}", self.kind),
            None => self.kind.fmt(f),
        }
    }
}

impl core::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("unknown variable `{0}`")]
    UnknownSymbol(EcoString),

    #[error("unknown function `{0}`")]
    UnknownFunction(EcoString),

    #[error("unknown class `{0}`")]
    UnknownClass(EcoString),

    #[error("`{class}` has no field `{field}`")]
    UnknownField { class: EcoString, field: EcoString },

    #[error("`{ty}` has no method `{method}`")]
    UnknownMethod { ty: EcoString, method: EcoString },

    #[error("`{name}` has no parameter `{param}`")]
    UnknownParam { name: EcoString, param: EcoString },

    #[error("`{name}` expects {expected} arguments, got {found}")]
    ArgCount {
        name: EcoString,
        expected: usize,
        found: usize,
    },

    #[error("`{name}` is missing required argument `{param}`")]
    MissingArg { name: EcoString, param: EcoString },

    #[error("argument `{param}` of `{name}` is given twice")]
    DuplicateArg { name: EcoString, param: EcoString },

    #[error("`{0}` takes more than {max} arguments", max = FuncArgsInfo::MAX_ARGS)]
    TooManyArgs(EcoString),

    #[error("`{0}` has more than {max} default parameters", max = FuncArgsInfo::MAX_DEFAULT_ARGS)]
    TooManyDefaults(EcoString),

    #[error("function `{0}` is defined twice")]
    DuplicateFunction(EcoString),

    #[error("class `{0}` is defined twice")]
    DuplicateClass(EcoString),

    #[error("variable `{0}` is already declared in this scope")]
    DuplicateVariable(EcoString),

    #[error("class `{0}` inherits from itself")]
    CyclicClass(EcoString),

    #[error("`return` is not allowed inside a defer block")]
    ReturnInDefer,

    #[error("lambda parameter `{0}` cannot have a default value")]
    LambdaDefault(EcoString),

    #[error("`yield while` needs the `yield` builtin")]
    MissingYield,

    #[error("native function `{0}` cannot be used as a value")]
    NativeAsValue(EcoString),

    #[error("`{name}` hashes to the same symbol as `{existing}`")]
    SymbolCollision { name: EcoString, existing: EcoString },

    #[error("too many constants")]
    TooManyConstants,

    #[error("internal error: jump label {0} was never placed")]
    UnresolvedLabel(u32),
}
