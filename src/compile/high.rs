//! High-level body compiler.
//!
//! Emits a self-describing structured byte stream: control constructs keep
//! their nesting and carry arity bytes plus big-endian size prefixes so the
//! interpreter can skip bodies without scanning. No operand-stack tracking
//! happens here; branch payloads stay relative label indices.
//!
//! Layout per construct:
//! - `Block`:  op, arity, body-size u32, body, `End`
//! - `Loop`:   op, arity, body, `End` (re-entry branches to the `Loop` op)
//! - `If`:     op, arity, then-size u32, else-size u32, then-body,
//!             `Else`, else-size u32, else-body, `End`
//! - consts:   op + 4/8 immediate bytes; other immediates: op + u32
//! - toplevel: implicit `Return` unless the body already ends in one

use super::opcodes::op;
use crate::config::ByteOrder;
use crate::error::CompileError;
use crate::model::Inst;

// The high-level form is always big-endian, independent of engine
// configuration (only the low-level form is configurable).
const ORDER: ByteOrder = ByteOrder::Big;

/// Compile one function or initializer body.
pub fn compile_body(insts: &[Inst]) -> Result<Vec<u8>, CompileError> {
    let mut out = Vec::new();
    emit_seq(&mut out, insts)?;
    if !matches!(insts.last(), Some(Inst::Return)) {
        out.push(op::RETURN);
    }
    Ok(out)
}

fn checked_len(buf: &[u8]) -> Result<u32, CompileError> {
    u32::try_from(buf.len()).map_err(|_| CompileError::BodyTooLarge)
}

fn emit_seq(out: &mut Vec<u8>, insts: &[Inst]) -> Result<(), CompileError> {
    for inst in insts {
        emit(out, inst)?;
    }
    Ok(())
}

fn emit(out: &mut Vec<u8>, inst: &Inst) -> Result<(), CompileError> {
    match inst {
        Inst::Unreachable => out.push(op::UNREACHABLE),
        Inst::Nop => out.push(op::NOP),

        Inst::Block(ty, body) => {
            let mut inner = Vec::new();
            emit_seq(&mut inner, body)?;
            out.push(op::BLOCK);
            out.push(ty.arity() as u8);
            ORDER.write_u32(out, checked_len(&inner)?);
            out.extend_from_slice(&inner);
            out.push(op::END);
        }
        Inst::Loop(ty, body) => {
            out.push(op::LOOP);
            out.push(ty.arity() as u8);
            emit_seq(out, body)?;
            out.push(op::END);
        }
        Inst::If(ty, then_body, else_body) => {
            let mut then_buf = Vec::new();
            emit_seq(&mut then_buf, then_body)?;
            let mut else_buf = Vec::new();
            emit_seq(&mut else_buf, else_body)?;

            out.push(op::IF);
            out.push(ty.arity() as u8);
            ORDER.write_u32(out, checked_len(&then_buf)?);
            ORDER.write_u32(out, checked_len(&else_buf)?);
            out.extend_from_slice(&then_buf);
            out.push(op::ELSE);
            // Repeated so the then-path can skip without re-reading the
            // header.
            ORDER.write_u32(out, checked_len(&else_buf)?);
            out.extend_from_slice(&else_buf);
            out.push(op::END);
        }

        Inst::Br(label) => {
            out.push(op::BR);
            ORDER.write_u32(out, *label);
        }
        Inst::BrIf(label) => {
            out.push(op::BR_IF);
            ORDER.write_u32(out, *label);
        }
        Inst::BrTable(labels, default) => {
            out.push(op::BR_TABLE);
            ORDER.write_u32(out, labels.len() as u32);
            for label in labels {
                ORDER.write_u32(out, *label);
            }
            ORDER.write_u32(out, *default);
        }
        Inst::Return => out.push(op::RETURN),
        Inst::Call(fidx) => {
            out.push(op::CALL);
            ORDER.write_u32(out, *fidx);
        }
        Inst::CallIndirect(tidx) => {
            out.push(op::CALL_INDIRECT);
            ORDER.write_u32(out, *tidx);
        }

        Inst::Drop => out.push(op::DROP),
        Inst::Select => out.push(op::SELECT),

        Inst::LocalGet(idx) => {
            out.push(op::LOCAL_GET);
            ORDER.write_u32(out, *idx);
        }
        Inst::LocalSet(idx) => {
            out.push(op::LOCAL_SET);
            ORDER.write_u32(out, *idx);
        }
        Inst::LocalTee(idx) => {
            out.push(op::LOCAL_TEE);
            ORDER.write_u32(out, *idx);
        }
        Inst::GlobalGet(idx) => {
            out.push(op::GLOBAL_GET);
            ORDER.write_u32(out, *idx);
        }
        Inst::GlobalSet(idx) => {
            out.push(op::GLOBAL_SET);
            ORDER.write_u32(out, *idx);
        }

        Inst::Load(opcode, arg) => {
            out.push(*opcode);
            ORDER.write_u32(out, arg.offset);
        }
        Inst::Store(opcode, arg) => {
            out.push(*opcode);
            ORDER.write_u32(out, arg.offset);
        }
        Inst::MemorySize => out.push(op::MEMORY_SIZE),
        Inst::MemoryGrow => out.push(op::MEMORY_GROW),

        Inst::I32Const(v) => {
            out.push(op::I32_CONST);
            ORDER.write_u32(out, *v as u32);
        }
        Inst::I64Const(v) => {
            out.push(op::I64_CONST);
            ORDER.write_u64(out, *v as u64);
        }
        Inst::F32Const(bits) => {
            out.push(op::F32_CONST);
            ORDER.write_u32(out, *bits);
        }
        Inst::F64Const(bits) => {
            out.push(op::F64_CONST);
            ORDER.write_u64(out, *bits);
        }

        Inst::Numeric(opcode) => out.push(*opcode),
    }
    Ok(())
}
