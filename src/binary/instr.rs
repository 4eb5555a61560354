//! Instruction decoding: raw opcode bytes into the structured `Inst` ADT,
//! with block/loop/if bodies nested.

use super::{cursor::Cursor, leb128, reader, BinaryReadError, Result};
use crate::model::instr::{BlockType, Inst, MemArg};

/// Terminator that closed a block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    End,
    Else,
}

/// Read an expression: instructions up to and including the closing `end`.
/// Used for function bodies and initializer expressions alike.
pub fn read_expr(cur: &mut Cursor) -> Result<Vec<Inst>> {
    let (body, end) = read_block_body(cur)?;
    if end != BlockEnd::End {
        return Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "`else` outside of an if body",
        });
    }
    Ok(body)
}

fn read_block_type(cur: &mut Cursor) -> Result<BlockType> {
    if cur.peek_u8()? == 0x40 {
        cur.read_u8()?;
        return Ok(BlockType::EMPTY);
    }
    Ok(BlockType(Some(reader::read_val_type(cur)?)))
}

fn read_mem_arg(cur: &mut Cursor) -> Result<MemArg> {
    Ok(MemArg {
        align: leb128::read_uleb_u32(cur)?,
        offset: leb128::read_uleb_u32(cur)?,
    })
}

/// Expect the single reserved zero byte some opcodes carry in MVP.
fn read_reserved(cur: &mut Cursor) -> Result<()> {
    match cur.read_u8()? {
        0x00 => Ok(()),
        _ => Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "nonzero reserved byte",
        }),
    }
}

fn read_block_body(cur: &mut Cursor) -> Result<(Vec<Inst>, BlockEnd)> {
    let mut out = Vec::new();
    loop {
        let at = cur.offset();
        let op = cur.read_u8()?;
        let inst = match op {
            0x0B => return Ok((out, BlockEnd::End)),
            0x05 => return Ok((out, BlockEnd::Else)),

            0x00 => Inst::Unreachable,
            0x01 => Inst::Nop,
            0x02 => {
                let ty = read_block_type(cur)?;
                let body = read_expr(cur)?;
                Inst::Block(ty, body)
            }
            0x03 => {
                let ty = read_block_type(cur)?;
                let body = read_expr(cur)?;
                Inst::Loop(ty, body)
            }
            0x04 => {
                let ty = read_block_type(cur)?;
                let (then_body, end) = read_block_body(cur)?;
                let else_body = match end {
                    BlockEnd::Else => read_expr(cur)?,
                    BlockEnd::End => Vec::new(),
                };
                Inst::If(ty, then_body, else_body)
            }
            0x0C => Inst::Br(leb128::read_uleb_u32(cur)?),
            0x0D => Inst::BrIf(leb128::read_uleb_u32(cur)?),
            0x0E => {
                let labels = reader::read_vec(cur, leb128::read_uleb_u32)?;
                let default = leb128::read_uleb_u32(cur)?;
                Inst::BrTable(labels, default)
            }
            0x0F => Inst::Return,
            0x10 => Inst::Call(leb128::read_uleb_u32(cur)?),
            0x11 => {
                let type_idx = leb128::read_uleb_u32(cur)?;
                read_reserved(cur)?;
                Inst::CallIndirect(type_idx)
            }

            0x1A => Inst::Drop,
            0x1B => Inst::Select,

            0x20 => Inst::LocalGet(leb128::read_uleb_u32(cur)?),
            0x21 => Inst::LocalSet(leb128::read_uleb_u32(cur)?),
            0x22 => Inst::LocalTee(leb128::read_uleb_u32(cur)?),
            0x23 => Inst::GlobalGet(leb128::read_uleb_u32(cur)?),
            0x24 => Inst::GlobalSet(leb128::read_uleb_u32(cur)?),

            0x28..=0x35 => Inst::Load(op, read_mem_arg(cur)?),
            0x36..=0x3E => Inst::Store(op, read_mem_arg(cur)?),
            0x3F => {
                read_reserved(cur)?;
                Inst::MemorySize
            }
            0x40 => {
                read_reserved(cur)?;
                Inst::MemoryGrow
            }

            0x41 => Inst::I32Const(leb128::read_sleb_i32(cur)?),
            0x42 => Inst::I64Const(leb128::read_sleb_i64(cur)?),
            0x43 => {
                let b = cur.read_bytes(4)?;
                Inst::F32Const(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            0x44 => {
                let b = cur.read_bytes(8)?;
                Inst::F64Const(u64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }

            0x45..=0xBF => Inst::Numeric(op),

            _ => return Err(BinaryReadError::UnknownOpcode { opcode: op, offset: at }),
        };
        out.push(inst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValType;

    #[test]
    fn flat_body() {
        // local.get 0; local.get 1; i32.add; end
        let mut c = Cursor::new(&[0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B]);
        let body = read_expr(&mut c).unwrap();
        assert_eq!(
            body,
            vec![Inst::LocalGet(0), Inst::LocalGet(1), Inst::Numeric(0x6A)]
        );
    }

    #[test]
    fn nested_if_else() {
        // if (result i32) i32.const 1 else i32.const 2 end; end
        let mut c = Cursor::new(&[0x04, 0x7F, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0B, 0x0B]);
        let body = read_expr(&mut c).unwrap();
        assert_eq!(
            body,
            vec![Inst::If(
                BlockType(Some(ValType::I32)),
                vec![Inst::I32Const(1)],
                vec![Inst::I32Const(2)],
            )]
        );
    }

    #[test]
    fn loop_with_branch() {
        // block; loop; br 1; end; end; end
        let mut c = Cursor::new(&[0x02, 0x40, 0x03, 0x40, 0x0C, 0x01, 0x0B, 0x0B, 0x0B]);
        let body = read_expr(&mut c).unwrap();
        assert_eq!(
            body,
            vec![Inst::Block(
                BlockType::EMPTY,
                vec![Inst::Loop(BlockType::EMPTY, vec![Inst::Br(1)])],
            )]
        );
    }

    #[test]
    fn stray_else_rejected() {
        let mut c = Cursor::new(&[0x41, 0x00, 0x05, 0x0B]);
        assert!(read_expr(&mut c).is_err());
    }

    #[test]
    fn unknown_opcode_rejected() {
        let mut c = Cursor::new(&[0xC0, 0x0B]);
        assert!(matches!(
            read_expr(&mut c),
            Err(BinaryReadError::UnknownOpcode { opcode: 0xC0, .. })
        ));
    }
}
