//! Low-level interpreter: a threaded dispatcher over the flat instruction
//! stream.
//!
//! Control flow is absolute: `Jump`/`JumpIf` set the instruction pointer,
//! the `Br` family drops the compiled number of slots beneath the values
//! it transports and jumps, and `pc == code.len()` returns from the
//! function (the compiler resolves branches to the function label there).
//! Immediates are read in the byte order the module was compiled with.

use super::frames::CallFrame;
use super::stack::OperandStack;
use super::{
    call_func, do_return, global_addr, mem0_addr, read_imm_u32, read_imm_u64, resolve_indirect,
};
use crate::compile::opcodes::op;
use crate::config::{ByteOrder, StackLimits};
use crate::error::Trap;
use crate::runtime::Store;

/// One break payload as the low-level compiler laid it out.
#[inline]
fn read_break(code: &[u8], pc: &mut usize, order: ByteOrder) -> Result<(usize, usize, usize), Trap> {
    let arity = *code
        .get(*pc)
        .ok_or(Trap::CorruptCode("truncated break payload"))? as usize;
    *pc += 1;
    let drop = read_imm_u32(code, pc, order)? as usize;
    let target = read_imm_u32(code, pc, order)? as usize;
    Ok((arity, drop, target))
}

/// Run until the outermost frame returns.
pub(crate) fn run(
    store: &mut Store,
    frames: &mut Vec<CallFrame>,
    stack: &mut OperandStack,
    order: ByteOrder,
    limits: &StackLimits,
) -> Result<(), Trap> {
    loop {
        let frame = frames
            .last_mut()
            .ok_or(Trap::CorruptCode("empty call stack"))?;

        if frame.pc >= frame.code.len() {
            if do_return(frames, stack)? {
                return Ok(());
            }
            continue;
        }

        let opcode = frame.code[frame.pc];
        frame.pc += 1;

        match opcode {
            op::UNREACHABLE => return Err(Trap::Unreachable),
            op::NOP => {}

            op::JUMP => {
                let target = read_imm_u32(&frame.code, &mut frame.pc, order)? as usize;
                frame.pc = target;
            }
            op::JUMP_IF => {
                let target = read_imm_u32(&frame.code, &mut frame.pc, order)? as usize;
                if stack.pop()? as u32 != 0 {
                    frame.pc = target;
                }
            }

            op::BR => {
                let (arity, drop, target) = read_break(&frame.code, &mut frame.pc, order)?;
                stack.break_to(drop, arity)?;
                frame.pc = target;
            }
            op::BR_IF => {
                let (arity, drop, target) = read_break(&frame.code, &mut frame.pc, order)?;
                if stack.pop()? as u32 != 0 {
                    stack.break_to(drop, arity)?;
                    frame.pc = target;
                }
            }
            op::BR_TABLE => {
                let count = read_imm_u32(&frame.code, &mut frame.pc, order)? as usize;
                let rows = frame.pc;
                let selector = (stack.pop()? as u32) as usize;
                // Rows are 9 bytes (arity u8 + drop u32 + target u32);
                // selectors past the table pick the trailing default row.
                let mut row = rows + 9 * selector.min(count);
                let (arity, drop, target) = read_break(&frame.code, &mut row, order)?;
                stack.break_to(drop, arity)?;
                frame.pc = target;
            }
            op::RETURN => {
                if do_return(frames, stack)? {
                    return Ok(());
                }
            }

            op::CALL => {
                let func_idx = read_imm_u32(&frame.code, &mut frame.pc, order)? as usize;
                let module_idx = frame.module;
                let callee_addr = store
                    .get_module(module_idx)
                    .and_then(|m| m.funcs.get(func_idx).copied())
                    .ok_or(Trap::CorruptCode("call index out of range"))?;
                call_func(store, frames, stack, callee_addr, limits)?;
            }
            op::CALL_INDIRECT => {
                let type_idx = read_imm_u32(&frame.code, &mut frame.pc, order)?;
                let module_idx = frame.module;
                let elem_idx = stack.pop()? as u32;
                let callee_addr = resolve_indirect(store, module_idx, type_idx, elem_idx)?;
                call_func(store, frames, stack, callee_addr, limits)?;
            }

            op::DROP => {
                stack.pop()?;
            }
            op::SELECT => {
                let cond = stack.pop()? as u32;
                let on_false = stack.pop()?;
                let on_true = stack.pop()?;
                stack.push(if cond != 0 { on_true } else { on_false })?;
            }

            op::LOCAL_GET => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, order)? as usize;
                let v = *frame
                    .locals
                    .get(idx)
                    .ok_or(Trap::CorruptCode("local index out of range"))?;
                stack.push(v)?;
            }
            op::LOCAL_SET => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, order)? as usize;
                let v = stack.pop()?;
                *frame
                    .locals
                    .get_mut(idx)
                    .ok_or(Trap::CorruptCode("local index out of range"))? = v;
            }
            op::LOCAL_TEE => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, order)? as usize;
                let v = stack.pop()?;
                *frame
                    .locals
                    .get_mut(idx)
                    .ok_or(Trap::CorruptCode("local index out of range"))? = v;
                stack.push(v)?;
            }
            op::GLOBAL_GET => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, order)?;
                let module_idx = frame.module;
                let addr = global_addr(store, module_idx, idx)?;
                let g = store
                    .get_global(addr)
                    .ok_or(Trap::CorruptCode("bad global address"))?;
                stack.push(g.get_raw())?;
            }
            op::GLOBAL_SET => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, order)?;
                let module_idx = frame.module;
                let v = stack.pop()?;
                let addr = global_addr(store, module_idx, idx)?;
                store
                    .get_global_mut(addr)
                    .ok_or(Trap::CorruptCode("bad global address"))?
                    .set_raw(v)
                    .map_err(|_| Trap::CorruptCode("write to immutable global"))?;
            }

            0x28..=0x3E => {
                let offset = read_imm_u32(&frame.code, &mut frame.pc, order)?;
                let module_idx = frame.module;
                let addr = mem0_addr(store, module_idx)?;
                let mem = store
                    .get_memory_mut(addr)
                    .ok_or(Trap::CorruptCode("bad memory address"))?;
                super::ops::memory_access(opcode, offset, stack, mem)?;
            }
            op::MEMORY_SIZE => {
                let module_idx = frame.module;
                let addr = mem0_addr(store, module_idx)?;
                let mem = store
                    .get_memory(addr)
                    .ok_or(Trap::CorruptCode("bad memory address"))?;
                super::ops::memory_size(stack, mem)?;
            }
            op::MEMORY_GROW => {
                let module_idx = frame.module;
                let addr = mem0_addr(store, module_idx)?;
                let mem = store
                    .get_memory_mut(addr)
                    .ok_or(Trap::CorruptCode("bad memory address"))?;
                super::ops::memory_grow(stack, mem)?;
            }

            op::I32_CONST => {
                let v = read_imm_u32(&frame.code, &mut frame.pc, order)?;
                stack.push(v as u64)?;
            }
            op::I64_CONST => {
                let v = read_imm_u64(&frame.code, &mut frame.pc, order)?;
                stack.push(v)?;
            }
            op::F32_CONST => {
                let bits = read_imm_u32(&frame.code, &mut frame.pc, order)?;
                stack.push(bits as u64)?;
            }
            op::F64_CONST => {
                let bits = read_imm_u64(&frame.code, &mut frame.pc, order)?;
                stack.push(bits)?;
            }

            0x45..=0xBF => super::ops::numeric(opcode, stack)?,

            _ => return Err(Trap::CorruptCode("unknown opcode in flat stream")),
        }
    }
}
