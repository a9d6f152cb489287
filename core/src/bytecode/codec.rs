//! Variable-length operand encoding.
//!
//! Operands use the SQLite4 varint layout. Values up to 240 take a single
//! byte, which covers almost every slot index, constant index and jump
//! distance seen in practice; larger values grow to at most five bytes.
//!
//! ```text
//! 0..=240            [v]
//! 241..=2287         [241 + (v-240)/256, (v-240)%256]
//! 2288..=67823       [249, hi, lo]              (v - 2288)
//! 67824..=0xFFFFFF   [250, b2, b1, b0]
//! above              [251, b3, b2, b1, b0]
//! ```

use crate::Vec;

/// Longest encoding of a single operand.
pub const MAX_ENCODED_LEN: usize = 5;

/// Errors raised while decoding a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("bytecode truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("invalid operand prefix 0x{byte:02x} at offset {offset}")]
    BadPrefix { offset: usize, byte: u8 },
    #[error("unknown opcode 0x{byte:02x} at offset {offset}")]
    BadOpcode { offset: usize, byte: u8 },
}

/// Number of bytes [`encode`] produces for `value`.
pub const fn encoded_len(value: u32) -> usize {
    match value {
        0..=240 => 1,
        241..=2287 => 2,
        2288..=67823 => 3,
        67824..=0x00FF_FFFF => 4,
        _ => 5,
    }
}

pub fn encode(value: u32, out: &mut Vec<u8>) {
    match value {
        0..=240 => out.push(value as u8),
        241..=2287 => {
            let v = value - 240;
            out.push((v / 256 + 241) as u8);
            out.push((v % 256) as u8);
        }
        2288..=67823 => {
            let v = value - 2288;
            out.push(249);
            out.push((v >> 8) as u8);
            out.push(v as u8);
        }
        67824..=0x00FF_FFFF => {
            out.push(250);
            out.extend_from_slice(&value.to_be_bytes()[1..]);
        }
        _ => {
            out.push(251);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Decodes one operand at `*cursor`, advancing the cursor past it.
#[inline]
pub fn decode(buf: &[u8], cursor: &mut usize) -> Result<u32, DecodeError> {
    let start = *cursor;
    let first = *buf
        .get(start)
        .ok_or(DecodeError::Truncated { offset: start })?;

    let (value, len) = match first {
        0..=240 => (first as u32, 1),
        241..=248 => {
            let lo = byte_at(buf, start + 1)?;
            ((first as u32 - 241) * 256 + lo as u32 + 240, 2)
        }
        249 => {
            let hi = byte_at(buf, start + 1)?;
            let lo = byte_at(buf, start + 2)?;
            (((hi as u32) << 8 | lo as u32) + 2288, 3)
        }
        250 => (be_bytes(buf, start + 1, 3)?, 4),
        251 => (be_bytes(buf, start + 1, 4)?, 5),
        byte => return Err(DecodeError::BadPrefix { offset: start, byte }),
    };

    *cursor = start + len;
    Ok(value)
}

#[inline]
fn byte_at(buf: &[u8], offset: usize) -> Result<u8, DecodeError> {
    buf.get(offset)
        .copied()
        .ok_or(DecodeError::Truncated { offset })
}

fn be_bytes(buf: &[u8], offset: usize, count: usize) -> Result<u32, DecodeError> {
    let bytes = buf
        .get(offset..offset + count)
        .ok_or(DecodeError::Truncated { offset: buf.len() })?;
    Ok(bytes.iter().fold(0u32, |acc, b| acc << 8 | *b as u32))
}
