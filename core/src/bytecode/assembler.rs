//! Encoding instructions to bytes and back.

use core::fmt;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use super::codec::{self, DecodeError};
use super::opcode::{BlockKind, Opcode};
use crate::{Vec, format};

pub type Operands = SmallVec<[u32; 3]>;

/// Appends encoded instructions to a byte buffer.
///
/// ```ignore
/// let mut asm = Assembler::new();
/// asm.emit(Opcode::Constant, &[0]).emit(Opcode::ReturnVal, &[]);
/// assert_eq!(asm.into_bytes(), vec![0x01, 0, 0x44]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Assembler {
    bytes: Vec<u8>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, op: Opcode, operands: &[u32]) -> &mut Self {
        debug_assert_eq!(
            operands.len(),
            op.operand_count(),
            "wrong operand count for {op:?}"
        );
        self.bytes.push(op as u8);
        for &operand in operands {
            codec::encode(operand, &mut self.bytes);
        }
        self
    }

    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Encodes a whole instruction sequence.
pub fn assemble(instructions: &[(Opcode, &[u32])]) -> Vec<u8> {
    let mut asm = Assembler::new();
    for (op, operands) in instructions {
        asm.emit(*op, operands);
    }
    asm.into_bytes()
}

/// Encoded size of one instruction.
pub fn encoded_size(operands: impl IntoIterator<Item = u32>) -> usize {
    1 + operands.into_iter().map(codec::encoded_len).sum::<usize>()
}

/// One instruction read back from a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub offset: usize,
    pub op: Opcode,
    pub operands: Operands,
    pub len: usize,
}

impl Decoded {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Absolute target of a jump or the end of a block body.
    pub fn target(&self) -> Option<usize> {
        match self.op {
            Opcode::Jump | Opcode::CondJump => Some(self.end() + self.operands[0] as usize),
            Opcode::LoopJump => self.end().checked_sub(self.operands[0] as usize),
            Opcode::DefArg | Opcode::Block => Some(self.end() + self.operands[1] as usize),
            _ => None,
        }
    }
}

pub fn decode_at(code: &[u8], offset: usize) -> Result<Decoded, DecodeError> {
    let byte = *code.get(offset).ok_or(DecodeError::Truncated { offset })?;
    let op = Opcode::from_byte(byte).ok_or(DecodeError::BadOpcode { offset, byte })?;
    let mut cursor = offset + 1;
    let mut operands = Operands::new();
    for _ in 0..op.operand_count() {
        operands.push(codec::decode(code, &mut cursor)?);
    }
    Ok(Decoded {
        offset,
        op,
        operands,
        len: cursor - offset,
    })
}

pub fn disassemble(code: &[u8]) -> Result<Vec<Decoded>, DecodeError> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let inst = decode_at(code, offset)?;
        offset = inst.end();
        out.push(inst);
    }
    Ok(out)
}

/// Human-readable listing of a code buffer, with labels on jump targets.
pub struct Listing<'a>(pub &'a [u8]);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instructions = match disassemble(self.0) {
            Ok(instructions) => instructions,
            Err(err) => return writeln!(f, "    <{err}>"),
        };

        // First pass: collect jump targets so they can be labeled.
        let targets: HashSet<usize> = instructions.iter().filter_map(Decoded::target).collect();
        let mut sorted: Vec<_> = targets.into_iter().collect();
        sorted.sort_unstable();
        let labels: HashMap<usize, usize> = sorted
            .into_iter()
            .enumerate()
            .map(|(i, addr)| (addr, i))
            .collect();

        for inst in &instructions {
            let label = labels
                .get(&inst.offset)
                .map(|l| format!("L{l}:"))
                .unwrap_or_default();
            write!(f, "    {:4} {:>4}  {:?}", inst.offset, label, inst.op)?;
            for (i, operand) in inst.operands.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                match (inst.op, i) {
                    (Opcode::Block, 0) => match BlockKind::from_operand(*operand) {
                        Some(kind) => write!(f, "{sep}{kind:?}")?,
                        None => write!(f, "{sep}?{operand}")?,
                    },
                    _ => write!(f, "{sep}{operand}")?,
                }
            }
            if let Some(target) = inst.target() {
                match labels.get(&target) {
                    Some(l) => write!(f, " (to L{l})")?,
                    None => write!(f, " (to @{target})")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ToString, vec};
    use pretty_assertions::assert_eq;

    #[test]
    fn assemble_and_disassemble() {
        let bytes = assemble(&[
            (Opcode::Constant, &[0]),
            (Opcode::Call, &[1, 300, 2]),
            (Opcode::ReturnVal, &[]),
        ]);
        assert_eq!(bytes, vec![0x01, 0, 0x50, 1, 241, 60, 2, 0x44]);

        let decoded = disassemble(&bytes).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[1].op, Opcode::Call);
        assert_eq!(decoded[1].operands.as_slice(), &[1, 300, 2]);
        assert_eq!(decoded[1].len, 5);
        assert_eq!(decoded[2].offset, 7);
    }

    #[test]
    fn truncated_instruction_is_an_error() {
        let bytes = [Opcode::Call as u8, 0, 1];
        assert_eq!(
            disassemble(&bytes),
            Err(DecodeError::Truncated { offset: 3 })
        );
        assert_eq!(
            decode_at(&[0xEE], 0),
            Err(DecodeError::BadOpcode {
                offset: 0,
                byte: 0xEE
            })
        );
    }

    #[test]
    fn listing_labels_jump_targets() {
        let bytes = assemble(&[
            (Opcode::Constant, &[0]),
            (Opcode::CondJump, &[2]),
            (Opcode::Constant, &[1]),
            (Opcode::Return, &[]),
        ]);
        let listing = Listing(&bytes).to_string();
        assert!(listing.contains("CondJump 2 (to L0)"), "{listing}");
        assert!(listing.contains("L0:  Return"), "{listing}");
    }
}
