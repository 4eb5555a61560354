//! Execution: back-end dispatch, call machinery shared by both
//! interpreters, host-call marshalling, and the restricted initializer
//! evaluator.

pub mod frames;
pub mod high;
pub mod low;
pub mod ops;
pub mod stack;

use std::sync::Arc;

use crate::config::{Backend, ByteOrder, StackLimits};
use crate::error::Trap;
use crate::host::HostFunc;
use crate::model::{FuncType, Value};
use crate::runtime::{FuncInstance, InstanceHandle, Store};

use frames::CallFrame;
use stack::OperandStack;

/// Read a 4-byte immediate at `pc` in the compiled stream's byte order.
#[inline]
pub(crate) fn read_imm_u32(code: &[u8], pc: &mut usize, order: ByteOrder) -> Result<u32, Trap> {
    let v = order
        .read_u32(code, *pc)
        .ok_or(Trap::CorruptCode("truncated immediate"))?;
    *pc += 4;
    Ok(v)
}

#[inline]
pub(crate) fn read_imm_u64(code: &[u8], pc: &mut usize, order: ByteOrder) -> Result<u64, Trap> {
    let v = order
        .read_u64(code, *pc)
        .ok_or(Trap::CorruptCode("truncated immediate"))?;
    *pc += 8;
    Ok(v)
}

/// Build the frame for a wasm-defined function, consuming its arguments
/// from the operand stack.
pub(crate) fn new_wasm_frame(
    store: &Store,
    module_idx: usize,
    func_idx: u32,
    stack: &mut OperandStack,
) -> Result<CallFrame, Trap> {
    let module_inst = store
        .get_module(module_idx)
        .ok_or(Trap::CorruptCode("bad module index"))?;
    let compiled = module_inst
        .compiled_func(func_idx)
        .ok_or(Trap::CorruptCode("call into import placeholder"))?;
    let ty = module_inst
        .func_type(func_idx)
        .ok_or(Trap::CorruptCode("function type missing"))?;

    let params = ty.params.len();
    let mut locals = stack.pop_many(params)?;
    // Non-parameter locals start zeroed, whatever their declared type.
    locals.resize(params + compiled.locals.len(), 0);

    Ok(CallFrame {
        module: module_idx,
        func_idx,
        code: Arc::from(compiled.code.as_slice()),
        locals,
        pc: 0,
        return_arity: ty.results.len(),
        stack_base: stack.len(),
        trail: Vec::new(),
    })
}

/// Invoke a host function with operands marshalled per its signature.
pub(crate) fn host_call(
    stack: &mut OperandStack,
    ty: &FuncType,
    f: &Arc<HostFunc>,
) -> Result<(), Trap> {
    let raws = stack.pop_many(ty.params.len())?;
    let args: Vec<Value> = ty
        .params
        .iter()
        .zip(&raws)
        .map(|(t, r)| Value::from_raw(*t, *r))
        .collect();
    let ret = f(&args)?;
    match (ty.results.first(), ret) {
        (None, None) => Ok(()),
        (Some(expected), Some(v)) if v.ty() == *expected => stack.push(v.to_raw()),
        (Some(_), Some(v)) => Err(Trap::Host(format!(
            "host function returned {:?}, signature says otherwise",
            v.ty()
        ))),
        _ => Err(Trap::Host("host function result arity mismatch".into())),
    }
}

/// Call the function at `callee_addr`: host functions complete inline,
/// wasm functions push a frame.
pub(crate) fn call_func(
    store: &mut Store,
    frames: &mut Vec<CallFrame>,
    stack: &mut OperandStack,
    callee_addr: usize,
    limits: &StackLimits,
) -> Result<(), Trap> {
    let callee = store
        .get_func(callee_addr)
        .cloned()
        .ok_or(Trap::CorruptCode("bad function address"))?;
    match callee {
        FuncInstance::Host { ty, f } => host_call(stack, &ty, &f),
        FuncInstance::Wasm { func_idx, module } => {
            if frames.len() >= limits.call_depth {
                return Err(Trap::CallStackExhausted);
            }
            let frame = new_wasm_frame(store, module, func_idx, stack)?;
            frames.push(frame);
            Ok(())
        }
    }
}

/// Resolve a `call_indirect`: consult table 0, reject null slots, and
/// verify the callee's signature against the static type index.
pub(crate) fn resolve_indirect(
    store: &Store,
    module_idx: usize,
    type_idx: u32,
    elem_idx: u32,
) -> Result<usize, Trap> {
    let module_inst = store
        .get_module(module_idx)
        .ok_or(Trap::CorruptCode("bad module index"))?;
    let expected = module_inst
        .module
        .types
        .get(type_idx as usize)
        .ok_or(Trap::CorruptCode("bad type index"))?;
    let table_addr = *module_inst
        .tables
        .first()
        .ok_or(Trap::CorruptCode("call_indirect without a table"))?;
    let table = store
        .get_table(table_addr)
        .ok_or(Trap::CorruptCode("bad table address"))?;

    let func_addr = table.get(elem_idx)?.ok_or(Trap::UninitializedElement)?;
    let callee = store
        .get_func(func_addr)
        .ok_or(Trap::CorruptCode("bad function address"))?;
    let actual = match callee {
        FuncInstance::Host { ty, .. } => ty,
        FuncInstance::Wasm { func_idx, module } => store
            .get_module(*module)
            .and_then(|m| m.func_type(*func_idx))
            .ok_or(Trap::CorruptCode("callee type missing"))?,
    };
    if actual != expected {
        return Err(Trap::IndirectCallTypeMismatch);
    }
    Ok(func_addr)
}

/// Unwind one frame: transport the return values, restore the caller's
/// stack. `true` when the outermost frame returned.
pub(crate) fn do_return(
    frames: &mut Vec<CallFrame>,
    stack: &mut OperandStack,
) -> Result<bool, Trap> {
    let frame = frames
        .pop()
        .ok_or(Trap::CorruptCode("call stack underflow"))?;
    let rets = stack.pop_many(frame.return_arity)?;
    stack.truncate(frame.stack_base);
    stack.push_many(&rets)?;
    Ok(frames.is_empty())
}

/// Store address of the current module's memory 0.
pub(crate) fn mem0_addr(store: &Store, module_idx: usize) -> Result<usize, Trap> {
    store
        .get_module(module_idx)
        .and_then(|m| m.memories.first().copied())
        .ok_or(Trap::CorruptCode("memory op without a memory"))
}

/// Store address of a global in the current module's index space.
pub(crate) fn global_addr(store: &Store, module_idx: usize, idx: u32) -> Result<usize, Trap> {
    store
        .get_module(module_idx)
        .and_then(|m| m.globals.get(idx as usize).copied())
        .ok_or(Trap::CorruptCode("bad global index"))
}

/// Run an exported or start function to completion and unmarshal the
/// result. Arguments must already match the signature (the facade checks).
pub fn run_function(
    store: &mut Store,
    instance: InstanceHandle,
    func_addr: usize,
    args: &[Value],
    limits: &StackLimits,
) -> Result<Option<Value>, Trap> {
    let _ = instance;
    let callee = store
        .get_func(func_addr)
        .cloned()
        .ok_or(Trap::CorruptCode("bad function address"))?;

    match callee {
        FuncInstance::Host { ty, f } => {
            // Imported host functions are invocable directly.
            let mut stack = OperandStack::new(limits.operand_slots);
            for a in args {
                stack.push(a.to_raw())?;
            }
            host_call(&mut stack, &ty, &f)?;
            Ok(ty
                .results
                .first()
                .map(|t| stack.pop().map(|raw| Value::from_raw(*t, raw)))
                .transpose()?)
        }
        FuncInstance::Wasm { func_idx, module } => {
            let (format, result_ty) = {
                let module_inst = store
                    .get_module(module)
                    .ok_or(Trap::CorruptCode("bad module index"))?;
                let ty = module_inst
                    .func_type(func_idx)
                    .ok_or(Trap::CorruptCode("function type missing"))?;
                (module_inst.module.format, ty.results.first().copied())
            };

            let mut stack = OperandStack::new(limits.operand_slots);
            for a in args {
                stack.push(a.to_raw())?;
            }
            let mut frames = vec![new_wasm_frame(store, module, func_idx, &mut stack)?];

            match format.backend {
                Backend::High => high::run(store, &mut frames, &mut stack, limits)?,
                Backend::Low => {
                    low::run(store, &mut frames, &mut stack, format.byte_order, limits)?
                }
            }

            Ok(result_ty
                .map(|t| stack.pop().map(|raw| Value::from_raw(t, raw)))
                .transpose()?)
        }
    }
}

/// Restricted evaluator for compiled initializer bytecodes: constants and
/// `global.get` against already-resolved globals only. No locals, no
/// memory, no control flow beyond the terminating return.
pub(crate) fn eval_init(
    code: &[u8],
    order: ByteOrder,
    store: &Store,
    resolved_globals: &[usize],
) -> Result<Value, Trap> {
    use crate::compile::opcodes::op;

    let mut pc = 0usize;
    let mut result: Option<Value> = None;
    while pc < code.len() {
        let opcode = code[pc];
        pc += 1;
        match opcode {
            op::I32_CONST => {
                result = Some(Value::I32(read_imm_u32(code, &mut pc, order)? as i32));
            }
            op::I64_CONST => {
                result = Some(Value::I64(read_imm_u64(code, &mut pc, order)? as i64));
            }
            op::F32_CONST => {
                result = Some(Value::F32(read_imm_u32(code, &mut pc, order)?));
            }
            op::F64_CONST => {
                result = Some(Value::F64(read_imm_u64(code, &mut pc, order)?));
            }
            op::GLOBAL_GET => {
                let idx = read_imm_u32(code, &mut pc, order)? as usize;
                let addr = *resolved_globals
                    .get(idx)
                    .ok_or(Trap::CorruptCode("initializer global out of range"))?;
                let g = store
                    .get_global(addr)
                    .ok_or(Trap::CorruptCode("bad global address"))?;
                result = Some(g.get());
            }
            op::RETURN => break,
            _ => return Err(Trap::CorruptCode("non-constant initializer opcode")),
        }
    }
    result.ok_or(Trap::CorruptCode("initializer produced no value"))
}
