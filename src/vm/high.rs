//! High-level interpreter: recursive descent over the structured compiled
//! form, driven by a per-frame block trail.
//!
//! Size prefixes let the false arm of an `If` (and the skip over an else
//! body) jump structurally instead of scanning. A branch pops nesting
//! entries and continues at the entry's recorded position; branching past
//! the outermost nesting returns from the function, as does running off
//! the end of the body.

use super::frames::{BlockTrail, CallFrame};
use super::stack::OperandStack;
use super::{
    call_func, do_return, global_addr, mem0_addr, read_imm_u32, read_imm_u64, resolve_indirect,
};
use crate::compile::opcodes::op;
use crate::config::{ByteOrder, StackLimits};
use crate::error::Trap;
use crate::runtime::Store;

// The high-level compiler always writes big-endian immediates.
const ORDER: ByteOrder = ByteOrder::Big;

/// Take a branch of relative `depth`. `true` means the branch left the
/// outermost nesting and the function returns.
fn branch(frame: &mut CallFrame, stack: &mut OperandStack, depth: u32) -> Result<bool, Trap> {
    let len = frame.trail.len();
    if depth as usize >= len {
        return Ok(true);
    }
    let entry = frame.trail[len - 1 - depth as usize];
    let drop = stack
        .len()
        .checked_sub(entry.height + entry.arity)
        .ok_or(Trap::CorruptCode("branch below block entry height"))?;
    stack.break_to(drop, entry.arity)?;
    frame.pc = entry.branch_pos;
    frame.trail.truncate(len - 1 - depth as usize);
    Ok(false)
}

/// Run until the outermost frame returns. The caller has pushed the entry
/// frame and its arguments' locals already.
pub(crate) fn run(
    store: &mut Store,
    frames: &mut Vec<CallFrame>,
    stack: &mut OperandStack,
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

        let at = frame.pc;
        let opcode = frame.code[at];
        frame.pc = at + 1;

        match opcode {
            op::UNREACHABLE => return Err(Trap::Unreachable),
            op::NOP => {}

            op::BLOCK => {
                let arity = *frame
                    .code
                    .get(frame.pc)
                    .ok_or(Trap::CorruptCode("truncated block header"))?
                    as usize;
                frame.pc += 1;
                let size = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                // Branch target: one past the body's End opcode.
                frame.trail.push(BlockTrail {
                    arity,
                    height: stack.len(),
                    branch_pos: frame.pc + size + 1,
                });
            }
            op::LOOP => {
                frame.pc += 1; // arity byte; loop labels transport nothing
                frame.trail.push(BlockTrail {
                    arity: 0,
                    height: stack.len(),
                    branch_pos: at,
                });
            }
            op::IF => {
                let arity = *frame
                    .code
                    .get(frame.pc)
                    .ok_or(Trap::CorruptCode("truncated if header"))?
                    as usize;
                frame.pc += 1;
                let then_size = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                let else_size = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                let then_start = frame.pc;
                // Else body sits behind the Else opcode and its repeated
                // size immediate.
                let else_start = then_start + then_size + 5;
                let end_pos = else_start + else_size;
                let cond = stack.pop()? as u32;
                frame.trail.push(BlockTrail {
                    arity,
                    height: stack.len(),
                    branch_pos: end_pos + 1,
                });
                if cond == 0 {
                    frame.pc = else_start;
                }
            }
            op::ELSE => {
                // Fallen out of the then body: skip the else body.
                let else_size = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                frame.pc += else_size;
            }
            op::END => {
                frame
                    .trail
                    .pop()
                    .ok_or(Trap::CorruptCode("end without a block"))?;
            }

            op::BR => {
                let depth = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
                if branch(frame, stack, depth)? && do_return(frames, stack)? {
                    return Ok(());
                }
            }
            op::BR_IF => {
                let depth = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
                if stack.pop()? as u32 != 0
                    && branch(frame, stack, depth)?
                    && do_return(frames, stack)?
                {
                    return Ok(());
                }
            }
            op::BR_TABLE => {
                let count = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                let rows = frame.pc;
                let selector = (stack.pop()? as u32) as usize;
                let row = rows + 4 * selector.min(count);
                let depth = ORDER
                    .read_u32(&frame.code, row)
                    .ok_or(Trap::CorruptCode("br_table row out of range"))?;
                if branch(frame, stack, depth)? && do_return(frames, stack)? {
                    return Ok(());
                }
            }
            op::RETURN => {
                if do_return(frames, stack)? {
                    return Ok(());
                }
            }

            op::CALL => {
                let func_idx = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                let module_idx = frame.module;
                let callee_addr = store
                    .get_module(module_idx)
                    .and_then(|m| m.funcs.get(func_idx).copied())
                    .ok_or(Trap::CorruptCode("call index out of range"))?;
                call_func(store, frames, stack, callee_addr, limits)?;
            }
            op::CALL_INDIRECT => {
                let type_idx = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
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
                let idx = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                let v = *frame
                    .locals
                    .get(idx)
                    .ok_or(Trap::CorruptCode("local index out of range"))?;
                stack.push(v)?;
            }
            op::LOCAL_SET => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                let v = stack.pop()?;
                *frame
                    .locals
                    .get_mut(idx)
                    .ok_or(Trap::CorruptCode("local index out of range"))? = v;
            }
            op::LOCAL_TEE => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, ORDER)? as usize;
                let v = stack.pop()?;
                *frame
                    .locals
                    .get_mut(idx)
                    .ok_or(Trap::CorruptCode("local index out of range"))? = v;
                stack.push(v)?;
            }
            op::GLOBAL_GET => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
                let module_idx = frame.module;
                let addr = global_addr(store, module_idx, idx)?;
                let g = store
                    .get_global(addr)
                    .ok_or(Trap::CorruptCode("bad global address"))?;
                stack.push(g.get_raw())?;
            }
            op::GLOBAL_SET => {
                let idx = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
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
                let offset = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
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
                let v = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
                stack.push(v as u64)?;
            }
            op::I64_CONST => {
                let v = read_imm_u64(&frame.code, &mut frame.pc, ORDER)?;
                stack.push(v)?;
            }
            op::F32_CONST => {
                let bits = read_imm_u32(&frame.code, &mut frame.pc, ORDER)?;
                stack.push(bits as u64)?;
            }
            op::F64_CONST => {
                let bits = read_imm_u64(&frame.code, &mut frame.pc, ORDER)?;
                stack.push(bits)?;
            }

            0x45..=0xBF => super::ops::numeric(opcode, stack)?,

            _ => return Err(Trap::CorruptCode("unknown opcode in structured stream")),
        }
    }
}
