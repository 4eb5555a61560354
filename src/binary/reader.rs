//! Composite reads shared by the section decoders: length-prefixed
//! vectors, names, value types, limits.

use super::{cursor::Cursor, leb128, BinaryReadError, Result};
use crate::model::{GlobalType, Limits, MemoryType, RefType, TableType, ValType};

/// Read a ULEB128-length-prefixed byte vector.
pub fn read_byte_vec(cur: &mut Cursor) -> Result<Vec<u8>> {
    let len = leb128::read_uleb_u32(cur)? as usize;
    Ok(cur.read_bytes(len)?.to_vec())
}

/// Read a UTF-8 name (length-prefixed bytes).
pub fn read_name(cur: &mut Cursor) -> Result<String> {
    let offset = cur.offset();
    String::from_utf8(read_byte_vec(cur)?).map_err(|_| BinaryReadError::InvalidUtf8 { offset })
}

/// Read a vector of `T` with the given element reader.
pub fn read_vec<T, F>(cur: &mut Cursor, mut elem: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor) -> Result<T>,
{
    let len = leb128::read_uleb_u32(cur)? as usize;
    let mut out = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        out.push(elem(cur)?);
    }
    Ok(out)
}

pub fn read_val_type(cur: &mut Cursor) -> Result<ValType> {
    match cur.read_u8()? {
        0x7F => Ok(ValType::I32),
        0x7E => Ok(ValType::I64),
        0x7D => Ok(ValType::F32),
        0x7C => Ok(ValType::F64),
        _ => Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "invalid value type",
        }),
    }
}

pub fn read_ref_type(cur: &mut Cursor) -> Result<RefType> {
    match cur.read_u8()? {
        0x70 => Ok(RefType::FuncRef),
        _ => Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "invalid reference type (expected funcref)",
        }),
    }
}

pub fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    match cur.read_u8()? {
        0x00 => Ok(Limits::new(leb128::read_uleb_u32(cur)?, None)),
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            if max < min {
                return Err(BinaryReadError::Malformed {
                    offset: cur.offset(),
                    msg: "limits max < min",
                });
            }
            Ok(Limits::new(min, Some(max)))
        }
        _ => Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "invalid limits tag",
        }),
    }
}

pub fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    Ok(TableType {
        elem: read_ref_type(cur)?,
        limits: read_limits(cur)?,
    })
}

pub fn read_memory_type(cur: &mut Cursor) -> Result<MemoryType> {
    Ok(MemoryType {
        limits: read_limits(cur)?,
    })
}

pub fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = read_val_type(cur)?;
    let mutable = match cur.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => {
            return Err(BinaryReadError::Malformed {
                offset: cur.offset(),
                msg: "invalid global mutability flag",
            })
        }
    };
    Ok(GlobalType { val_type, mutable })
}
