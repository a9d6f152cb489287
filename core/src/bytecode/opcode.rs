//! Fibril instruction set.
//!
//! Every instruction is a one-byte opcode followed by a fixed number of
//! variable-length operands (see [`codec`](super::codec)). Jump and block
//! distances are byte counts measured from the end of the instruction that
//! carries them.
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`.
//! Each frame owns its operand stack; `Call` moves the arguments from the
//! caller's stack onto the callee's.

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $byte:literal => $operands:literal,)*) => {
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($(#[$doc])* $name = $byte,)*
        }

        impl Opcode {
            /// Number of operands following the opcode byte.
            pub const fn operand_count(self) -> usize {
                match self {
                    $(Opcode::$name => $operands,)*
                }
            }

            pub const fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($byte => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // ========================================================================
    // Stack & Constants (0x00 - 0x0F)
    // ========================================================================
    /// No operation. Marks the first byte of a lambda body.
    Nop = 0x00 => 0,
    /// Push constant `idx` | Stack: [...] -> [..., value]
    Constant = 0x01 => 1,
    /// Stack: [..., value] -> [...]
    PopValue = 0x02 => 0,

    // ========================================================================
    // Arithmetic, Logic & Bitwise (0x10 - 0x1F)
    // ========================================================================
    /// Numbers add, strings concatenate | Stack: [..., a, b] -> [..., a + b]
    Add = 0x10 => 0,
    Sub = 0x11 => 0,
    Mul = 0x12 => 0,
    Div = 0x13 => 0,
    Mod = 0x14 => 0,
    BitAnd = 0x15 => 0,
    BitOr = 0x16 => 0,
    /// Eager: both sides are already evaluated.
    And = 0x17 => 0,
    /// Eager: both sides are already evaluated.
    Or = 0x18 => 0,
    UnaryNot = 0x19 => 0,
    UnaryNeg = 0x1A => 0,

    // ========================================================================
    // Comparison (0x20 - 0x2F)
    // ========================================================================
    Equal = 0x20 => 0,
    NotEqual = 0x21 => 0,
    Greater = 0x22 => 0,
    GreaterOrEqual = 0x23 => 0,
    Less = 0x24 => 0,
    LessOrEqual = 0x25 => 0,

    // ========================================================================
    // Variables (0x30 - 0x3F)
    // ========================================================================
    /// Size the frame's locals | Operand: slot count
    InitFrame = 0x30 => 1,
    /// Default-initialize a slot | Operands: slot, value kind
    DeclVar = 0x31 => 2,
    /// Pop an argument into a slot | Operand: slot
    ArgVar = 0x32 => 1,
    /// Skip a default-value expression when the caller supplied the argument.
    /// Operands: default index, bytes to skip
    DefArg = 0x33 => 2,
    GetVar = 0x34 => 1,
    SetVar = 0x35 => 1,
    /// Increment a numeric slot in place | Operand: slot
    Inc = 0x36 => 1,

    // ========================================================================
    // Control (0x40 - 0x4F)
    // ========================================================================
    /// Forward jump | Operand: distance
    Jump = 0x40 => 1,
    /// Pop a bool; jump forward when it is false | Operand: distance
    CondJump = 0x41 => 1,
    /// Backward jump | Operand: distance
    LoopJump = 0x42 => 1,
    /// Leave the frame without a value.
    Return = 0x43 => 0,
    /// Pop the result and leave the frame.
    ReturnVal = 0x44 => 0,

    // ========================================================================
    // Calls & Closures (0x50 - 0x5F)
    // ========================================================================
    /// Operands: call kind, target, args info (see [`CallKind`], `FuncArgsInfo`)
    Call = 0x50 => 3,
    /// Push a closure | Operands: absolute body offset, frame slot count
    Lambda = 0x51 => 2,
    /// Bind an enclosing slot into the closure on top of the stack.
    /// Operands: source slot, destination slot
    UseUpval = 0x52 => 2,
    /// Push a named function as a value | Operand: absolute offset
    GetFunc = 0x53 => 1,

    // ========================================================================
    // Objects (0x60 - 0x6F)
    // ========================================================================
    /// Operand: type symbol
    New = 0x60 => 1,
    /// Stack: [..., obj] -> [..., member] | Operands: type symbol, member index
    GetMVar = 0x61 => 2,
    /// Stack: [..., value, obj] -> [...]
    SetMVar = 0x62 => 2,
    /// Stack: [..., obj, value] -> [..., obj]
    SetMVarInplace = 0x63 => 2,
    /// Builtin container method | Operands: type symbol, method index
    MCall = 0x64 => 2,
    /// Operand: target type symbol
    TypeCast = 0x65 => 1,

    // ========================================================================
    // Class Registration, init stream only (0x70 - 0x7F)
    // ========================================================================
    /// Operands: class symbol, parent symbol (0 for none)
    ClassBegin = 0x70 => 2,
    /// Operands: type symbol, field symbol
    ClassMember = 0x71 => 2,
    ClassEnd = 0x72 => 0,

    // ========================================================================
    // Structured Blocks (0x80)
    // ========================================================================
    /// Operands: [`BlockKind`], body length in bytes
    Block = 0x80 => 2,
}

static_assertions::assert_eq_size!(Opcode, u8);

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_byte(byte).ok_or(byte)
    }
}

/// Kind operand of [`Opcode::Block`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Seq = 1,
    Paral = 2,
    ParalAll = 3,
    Defer = 4,
}

impl BlockKind {
    pub const fn from_operand(value: u32) -> Option<BlockKind> {
        match value {
            1 => Some(BlockKind::Seq),
            2 => Some(BlockKind::Paral),
            3 => Some(BlockKind::ParalAll),
            4 => Some(BlockKind::Defer),
            _ => None,
        }
    }
}

/// Kind operand of [`Opcode::Call`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Script function; target is its absolute code offset.
    Func = 0,
    /// Host function; target is its index in the globals table.
    Native = 1,
    /// Function value popped from the stack (pushed after the arguments).
    Stack = 2,
    /// Function value held in a local slot; target is the slot.
    Var = 3,
}

impl CallKind {
    pub const fn from_operand(value: u32) -> Option<CallKind> {
        match value {
            0 => Some(CallKind::Func),
            1 => Some(CallKind::Native),
            2 => Some(CallKind::Stack),
            3 => Some(CallKind::Var),
            _ => None,
        }
    }
}

/// Per-call argument descriptor carried as the third `Call` operand.
///
/// The low six bits hold the number of arguments pushed by the caller. Bit
/// `6 + i` is set when default parameter `i` was not supplied, so the callee
/// must evaluate its default expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FuncArgsInfo(u32);

impl FuncArgsInfo {
    pub const MAX_ARGS: u32 = 63;
    pub const MAX_DEFAULT_ARGS: u32 = 26;
    const COUNT_MASK: u32 = 0x3F;

    pub const fn new(count: u32) -> Option<Self> {
        if count > Self::MAX_ARGS {
            None
        } else {
            Some(FuncArgsInfo(count))
        }
    }

    pub const fn from_bits(bits: u32) -> Self {
        FuncArgsInfo(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn count(self) -> u32 {
        self.0 & Self::COUNT_MASK
    }

    /// Marks default parameter `idx` as not supplied.
    pub fn use_default(&mut self, idx: u32) -> bool {
        if idx >= Self::MAX_DEFAULT_ARGS {
            return false;
        }
        self.0 |= 1 << (6 + idx);
        true
    }

    pub const fn uses_default(self, idx: u32) -> bool {
        idx < Self::MAX_DEFAULT_ARGS && self.0 & (1 << (6 + idx)) != 0
    }
}
