//! Low-level body compiler: one forward pass lowering structured control
//! flow to a flat stream with absolute jump targets.
//!
//! Forward references go through a fixup table: every branch emits a
//! 4-byte placeholder and records `(offset, label)` in `errata`; block
//! exits record `offsets[label]`; after emission the fixup pass patches
//! every placeholder with the resolved absolute offset. A label that never
//! resolves is a `CompileError`: validation rules out orphan branches, so
//! it can only mean a compiler bug.
//!
//! Break payloads are precomputed: `Br`/`BrIf`/`BrTable` carry
//! `(arity, drop, target)` where `drop` is how many operand slots to
//! discard underneath the `arity` slots the target keeps. The label stack
//! below exists only at compile time; the interpreter never needs one.

use std::collections::HashMap;

use super::opcodes::{numeric_net, op};
use super::BodyContext;
use crate::config::ByteOrder;
use crate::error::CompileError;
use crate::model::Inst;

struct LabelFrame {
    target: u32,
    /// Values a branch to this label transports (0 for loop labels).
    arity: u8,
    /// Operand slots pushed since this label was entered.
    pushed: i64,
}

struct Asm<'a> {
    out: Vec<u8>,
    labels: Vec<LabelFrame>,
    /// Placeholder offset -> label id awaiting resolution.
    errata: Vec<(usize, u32)>,
    /// Label id -> absolute byte offset, once known.
    offsets: HashMap<u32, usize>,
    next_label: u32,
    last_op: Option<u8>,
    order: ByteOrder,
    ctx: &'a BodyContext<'a>,
}

/// Compile one body. `result_arity` is the arity of the function-level
/// label (branches past the outermost nesting return from the function).
pub fn compile_body(
    insts: &[Inst],
    ctx: &BodyContext<'_>,
    order: ByteOrder,
    result_arity: usize,
) -> Result<Vec<u8>, CompileError> {
    let mut asm = Asm {
        out: Vec::new(),
        labels: Vec::new(),
        errata: Vec::new(),
        offsets: HashMap::new(),
        next_label: 0,
        last_op: None,
        order,
        ctx,
    };

    let root = asm.fresh_label();
    asm.labels.push(LabelFrame {
        target: root,
        arity: result_arity as u8,
        pushed: 0,
    });
    asm.emit_seq(insts)?;
    asm.labels.pop();

    // A branch to the function label lands on the implicit return below,
    // or one past the final explicit return (the interpreter treats
    // pc == len as a return).
    asm.offsets.insert(root, asm.out.len());
    if asm.last_op != Some(op::RETURN) {
        asm.out.push(op::RETURN);
    }

    asm.fixup()
}

impl Asm<'_> {
    fn fresh_label(&mut self) -> u32 {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    fn begin(&mut self, opcode: u8) {
        self.out.push(opcode);
        self.last_op = Some(opcode);
    }

    fn placeholder(&mut self, label: u32) {
        self.errata.push((self.out.len(), label));
        self.order.write_u32(&mut self.out, 0);
    }

    /// Adjust the innermost label's pushed-operand counter.
    fn adjust(&mut self, net: i64) -> Result<(), CompileError> {
        let frame = self.labels.last_mut().ok_or(CompileError::OperandUnderflow)?;
        frame.pushed += net;
        if frame.pushed < 0 {
            return Err(CompileError::OperandUnderflow);
        }
        Ok(())
    }

    /// Resolve a relative branch depth into its `(arity, drop, label)`
    /// payload: walk `k+1` frames up; `drop` is everything pushed along
    /// the walk minus what the target keeps.
    fn break_payload(&self, depth: u32) -> Result<(u8, u32, u32), CompileError> {
        let len = self.labels.len();
        if depth as usize >= len {
            return Err(CompileError::BranchDepthOutOfRange { depth });
        }
        let target_index = len - 1 - depth as usize;
        let target = &self.labels[target_index];
        let pushed: i64 = self.labels[target_index..].iter().map(|f| f.pushed).sum();
        let drop = pushed - i64::from(target.arity);
        if drop < 0 {
            return Err(CompileError::OperandUnderflow);
        }
        Ok((target.arity, drop as u32, target.target))
    }

    fn emit_break(&mut self, arity: u8, drop: u32, label: u32) {
        self.out.push(arity);
        self.order.write_u32(&mut self.out, drop);
        self.placeholder(label);
    }

    /// Emit a sequence; stops at (and reports) the first terminal
    /// instruction, whose block remainder is dead.
    fn emit_seq(&mut self, insts: &[Inst]) -> Result<bool, CompileError> {
        for inst in insts {
            if self.emit(inst)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn emit(&mut self, inst: &Inst) -> Result<bool, CompileError> {
        match inst {
            Inst::Unreachable => {
                self.begin(op::UNREACHABLE);
                return Ok(true);
            }
            Inst::Nop => self.begin(op::NOP),

            Inst::Block(ty, body) => {
                let label = self.fresh_label();
                self.labels.push(LabelFrame {
                    target: label,
                    arity: ty.arity() as u8,
                    pushed: 0,
                });
                self.emit_seq(body)?;
                self.labels.pop();
                // Break target is just past the block.
                self.offsets.insert(label, self.out.len());
                self.adjust(ty.arity() as i64)?;
            }
            Inst::Loop(ty, body) => {
                let label = self.fresh_label();
                // Backward target: known immediately.
                self.offsets.insert(label, self.out.len());
                self.labels.push(LabelFrame {
                    target: label,
                    arity: 0,
                    pushed: 0,
                });
                self.emit_seq(body)?;
                self.labels.pop();
                self.adjust(ty.arity() as i64)?;
            }
            Inst::If(ty, then_body, else_body) => {
                // Condition is consumed by the conditional jump.
                self.adjust(-1)?;
                let l_then = self.fresh_label();
                let l_end = self.fresh_label();

                self.begin(op::JUMP_IF);
                self.placeholder(l_then);

                self.labels.push(LabelFrame {
                    target: l_end,
                    arity: ty.arity() as u8,
                    pushed: 0,
                });
                self.emit_seq(else_body)?;
                self.labels.pop();
                self.begin(op::JUMP);
                self.placeholder(l_end);

                self.offsets.insert(l_then, self.out.len());
                self.labels.push(LabelFrame {
                    target: l_end,
                    arity: ty.arity() as u8,
                    pushed: 0,
                });
                self.emit_seq(then_body)?;
                self.labels.pop();

                self.offsets.insert(l_end, self.out.len());
                self.adjust(ty.arity() as i64)?;
            }

            Inst::Br(depth) => {
                let (arity, drop, label) = self.break_payload(*depth)?;
                self.begin(op::BR);
                self.emit_break(arity, drop, label);
                return Ok(true);
            }
            Inst::BrIf(depth) => {
                // Condition popped whether or not the branch is taken.
                self.adjust(-1)?;
                let (arity, drop, label) = self.break_payload(*depth)?;
                self.begin(op::BR_IF);
                self.emit_break(arity, drop, label);
            }
            Inst::BrTable(labels, default) => {
                // Selector popped before the table is consulted.
                self.adjust(-1)?;
                self.begin(op::BR_TABLE);
                self.order.write_u32(&mut self.out, labels.len() as u32);
                for depth in labels {
                    let (arity, drop, label) = self.break_payload(*depth)?;
                    self.emit_break(arity, drop, label);
                }
                let (arity, drop, label) = self.break_payload(*default)?;
                self.emit_break(arity, drop, label);
                return Ok(true);
            }
            Inst::Return => {
                self.begin(op::RETURN);
                return Ok(true);
            }

            Inst::Call(fidx) => {
                let (params, results) = self.ctx.func_arity(*fidx)?;
                self.begin(op::CALL);
                self.order.write_u32(&mut self.out, *fidx);
                self.adjust(results - params)?;
            }
            Inst::CallIndirect(tidx) => {
                let (params, results) = self.ctx.type_arity(*tidx)?;
                self.begin(op::CALL_INDIRECT);
                self.order.write_u32(&mut self.out, *tidx);
                // Table index plus the arguments go, the results come back.
                self.adjust(results - params - 1)?;
            }

            Inst::Drop => {
                self.begin(op::DROP);
                self.adjust(-1)?;
            }
            Inst::Select => {
                self.begin(op::SELECT);
                self.adjust(-2)?;
            }

            Inst::LocalGet(idx) => self.emit_u32(op::LOCAL_GET, *idx, 1)?,
            Inst::LocalSet(idx) => self.emit_u32(op::LOCAL_SET, *idx, -1)?,
            Inst::LocalTee(idx) => self.emit_u32(op::LOCAL_TEE, *idx, 0)?,
            Inst::GlobalGet(idx) => self.emit_u32(op::GLOBAL_GET, *idx, 1)?,
            Inst::GlobalSet(idx) => self.emit_u32(op::GLOBAL_SET, *idx, -1)?,

            Inst::Load(opcode, arg) => self.emit_u32(*opcode, arg.offset, 0)?,
            Inst::Store(opcode, arg) => self.emit_u32(*opcode, arg.offset, -2)?,
            Inst::MemorySize => {
                self.begin(op::MEMORY_SIZE);
                self.adjust(1)?;
            }
            Inst::MemoryGrow => self.begin(op::MEMORY_GROW),

            Inst::I32Const(v) => self.emit_u32(op::I32_CONST, *v as u32, 1)?,
            Inst::I64Const(v) => self.emit_u64(op::I64_CONST, *v as u64)?,
            Inst::F32Const(bits) => self.emit_u32(op::F32_CONST, *bits, 1)?,
            Inst::F64Const(bits) => self.emit_u64(op::F64_CONST, *bits)?,

            Inst::Numeric(opcode) => {
                self.begin(*opcode);
                self.adjust(numeric_net(*opcode))?;
            }
        }
        Ok(false)
    }

    fn emit_u32(&mut self, opcode: u8, imm: u32, net: i64) -> Result<(), CompileError> {
        self.begin(opcode);
        self.order.write_u32(&mut self.out, imm);
        self.adjust(net)
    }

    fn emit_u64(&mut self, opcode: u8, imm: u64) -> Result<(), CompileError> {
        self.begin(opcode);
        self.order.write_u64(&mut self.out, imm);
        self.adjust(1)
    }

    fn fixup(mut self) -> Result<Vec<u8>, CompileError> {
        for (at, label) in &self.errata {
            let target = *self
                .offsets
                .get(label)
                .ok_or(CompileError::UnresolvedLabel(*label))?;
            let target = u32::try_from(target).map_err(|_| CompileError::BodyTooLarge)?;
            self.order.patch_u32(&mut self.out, *at, target);
        }
        Ok(self.out)
    }
}
