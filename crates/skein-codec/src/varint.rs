use crate::error::{CodecError, CodecResult};

/// Longest encoding of a `u64`: ten groups of seven bits.
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` as a base-128 varint, least-significant group first.
///
/// Zero still occupies one byte.
pub fn write_varint(value: u64, out: &mut Vec<u8>) {
    let mut value = value;
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Number of bytes [`write_varint`] emits for `value`.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Parse a varint starting at `offset`. Returns `(value, next_offset)`.
pub fn read_varint(buf: &[u8], offset: usize) -> CodecResult<(u64, usize)> {
    let mut result: u64 = 0;
    let mut index = offset;
    for group in 0..MAX_VARINT_LEN {
        let byte = *buf.get(index).ok_or(CodecError::Truncated {
            offset: index,
            needed: 1,
        })?;
        index += 1;
        let payload = u64::from(byte & 0x7f);
        // The tenth group may only carry the single remaining bit.
        if group == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(CodecError::MalformedVarint { offset });
        }
        result |= payload << (7 * group);
        if byte & 0x80 == 0 {
            return Ok((result, index));
        }
    }
    Err(CodecError::MalformedVarint { offset })
}
