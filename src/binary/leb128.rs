//! ULEB128/SLEB128 decoding for the integer widths Wasm MVP uses.

use super::{cursor::Cursor, BinaryReadError, Result};

/// Decode an unsigned LEB128 as u32 (at most 5 bytes).
pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_unsigned(cur, 32).map(|v| v as u32)
}

/// Decode an unsigned LEB128 as u64 (at most 10 bytes).
pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_unsigned(cur, 64)
}

/// Decode a signed LEB128 as i32 (at most 5 bytes).
pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_signed(cur, 32).map(|v| v as i32)
}

/// Decode a signed LEB128 as i64 (at most 10 bytes).
pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_signed(cur, 64)
}

fn max_bytes(bits: u8) -> u8 {
    bits.div_ceil(7)
}

fn read_unsigned(cur: &mut Cursor, bits: u8) -> Result<u64> {
    let limit = max_bytes(bits);
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    loop {
        let byte = cur.read_u8()?;
        let low = u64::from(byte & 0x7F);
        if (low << shift) >> shift != low {
            return Err(BinaryReadError::Leb128Overflow {
                target_bits: bits,
                offset: cur.offset(),
            });
        }
        result |= low << shift;
        if byte & 0x80 == 0 {
            // Final byte: bits beyond the target width must be zero.
            if bits < 64 && (result >> bits) != 0 {
                return Err(BinaryReadError::Leb128Overflow {
                    target_bits: bits,
                    offset: cur.offset(),
                });
            }
            return Ok(result);
        }
        shift += 7;
        if shift >= u32::from(limit) * 7 {
            return Err(BinaryReadError::Leb128TooManyBytes {
                limit,
                offset: cur.offset(),
            });
        }
    }
}

fn read_signed(cur: &mut Cursor, bits: u8) -> Result<i64> {
    let limit = max_bytes(bits);
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        let byte = cur.read_u8()?;
        result |= i64::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if byte & 0x40 != 0 && shift < 64 {
                result |= !0i64 << shift;
            }
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if result < min || result > max {
                    return Err(BinaryReadError::Leb128Overflow {
                        target_bits: bits,
                        offset: cur.offset(),
                    });
                }
            }
            return Ok(result);
        }
        if shift >= u32::from(limit) * 7 {
            return Err(BinaryReadError::Leb128TooManyBytes {
                limit,
                offset: cur.offset(),
            });
        }
    }
}
