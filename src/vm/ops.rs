//! Shared evaluator for the uniform value operations (0x45..=0xBF) and
//! the memory access operations, over raw 64-bit operand slots.
//!
//! Both interpreters dispatch here, so the two back-ends cannot diverge on
//! arithmetic, trap conditions, or float corner cases.

use super::stack::OperandStack;
use crate::compile::opcodes::op;
use crate::error::Trap;
use crate::runtime::memory::MemoryInstance;

#[inline]
fn pop_i32(stack: &mut OperandStack) -> Result<i32, Trap> {
    Ok(stack.pop()? as u32 as i32)
}

#[inline]
fn pop_u32(stack: &mut OperandStack) -> Result<u32, Trap> {
    Ok(stack.pop()? as u32)
}

#[inline]
fn pop_i64(stack: &mut OperandStack) -> Result<i64, Trap> {
    Ok(stack.pop()? as i64)
}

#[inline]
fn pop_u64(stack: &mut OperandStack) -> Result<u64, Trap> {
    stack.pop()
}

#[inline]
fn pop_f32(stack: &mut OperandStack) -> Result<f32, Trap> {
    Ok(f32::from_bits(stack.pop()? as u32))
}

#[inline]
fn pop_f64(stack: &mut OperandStack) -> Result<f64, Trap> {
    Ok(f64::from_bits(stack.pop()?))
}

#[inline]
fn push_i32(stack: &mut OperandStack, v: i32) -> Result<(), Trap> {
    stack.push(v as u32 as u64)
}

#[inline]
fn push_i64(stack: &mut OperandStack, v: i64) -> Result<(), Trap> {
    stack.push(v as u64)
}

#[inline]
fn push_f32(stack: &mut OperandStack, v: f32) -> Result<(), Trap> {
    stack.push(v.to_bits() as u64)
}

#[inline]
fn push_f64(stack: &mut OperandStack, v: f64) -> Result<(), Trap> {
    stack.push(v.to_bits())
}

#[inline]
fn push_bool(stack: &mut OperandStack, b: bool) -> Result<(), Trap> {
    push_i32(stack, i32::from(b))
}

macro_rules! cmp {
    ($stack:expr, $pop:ident, $op:tt) => {{
        let rhs = $pop($stack)?;
        let lhs = $pop($stack)?;
        push_bool($stack, lhs $op rhs)
    }};
}

macro_rules! bin_i32 {
    ($stack:expr, $f:expr) => {{
        let rhs = pop_i32($stack)?;
        let lhs = pop_i32($stack)?;
        push_i32($stack, $f(lhs, rhs))
    }};
}

macro_rules! bin_i64 {
    ($stack:expr, $f:expr) => {{
        let rhs = pop_i64($stack)?;
        let lhs = pop_i64($stack)?;
        push_i64($stack, $f(lhs, rhs))
    }};
}

macro_rules! bin_f32 {
    ($stack:expr, $f:expr) => {{
        let rhs = pop_f32($stack)?;
        let lhs = pop_f32($stack)?;
        push_f32($stack, $f(lhs, rhs))
    }};
}

macro_rules! bin_f64 {
    ($stack:expr, $f:expr) => {{
        let rhs = pop_f64($stack)?;
        let lhs = pop_f64($stack)?;
        push_f64($stack, $f(lhs, rhs))
    }};
}

/// Wasm float min: NaN if either operand is NaN, and -0 beats +0.
fn fmin<F: Float>(a: F, b: F) -> F {
    if a.is_nan() || b.is_nan() {
        F::nan()
    } else if a == b {
        if a.sign_negative() {
            a
        } else {
            b
        }
    } else if a < b {
        a
    } else {
        b
    }
}

fn fmax<F: Float>(a: F, b: F) -> F {
    if a.is_nan() || b.is_nan() {
        F::nan()
    } else if a == b {
        if a.sign_negative() {
            b
        } else {
            a
        }
    } else if a > b {
        a
    } else {
        b
    }
}

trait Float: Copy + PartialOrd + PartialEq {
    fn is_nan(self) -> bool;
    fn sign_negative(self) -> bool;
    fn nan() -> Self;
}

impl Float for f32 {
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
    fn sign_negative(self) -> bool {
        self.is_sign_negative()
    }
    fn nan() -> Self {
        f32::NAN
    }
}

impl Float for f64 {
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
    fn sign_negative(self) -> bool {
        self.is_sign_negative()
    }
    fn nan() -> Self {
        f64::NAN
    }
}

/// Trapping float-to-integer truncation. `lo`/`hi` bound the truncated
/// value, `hi` exclusive; both are exactly representable in the source
/// float width.
macro_rules! trunc_to {
    ($stack:expr, $popf:ident, $lo:expr, $hi:expr, $t:ty, $push:ident) => {{
        let x = $popf($stack)?;
        if x.is_nan() {
            return Err(Trap::InvalidConversionToInteger);
        }
        let t = x.trunc();
        if !(t >= $lo && t < $hi) {
            return Err(Trap::IntegerOverflow);
        }
        $push($stack, t as $t)
    }};
}

/// Execute one uniform value op. The opcode is guaranteed by compilation
/// to be in 0x45..=0xBF.
pub fn numeric(opcode: u8, stack: &mut OperandStack) -> Result<(), Trap> {
    match opcode {
        // i32 comparisons
        op::I32_EQZ => {
            let v = pop_i32(stack)?;
            push_bool(stack, v == 0)
        }
        op::I32_EQ => cmp!(stack, pop_i32, ==),
        op::I32_NE => cmp!(stack, pop_i32, !=),
        op::I32_LT_S => cmp!(stack, pop_i32, <),
        op::I32_LT_U => cmp!(stack, pop_u32, <),
        op::I32_GT_S => cmp!(stack, pop_i32, >),
        op::I32_GT_U => cmp!(stack, pop_u32, >),
        op::I32_LE_S => cmp!(stack, pop_i32, <=),
        op::I32_LE_U => cmp!(stack, pop_u32, <=),
        op::I32_GE_S => cmp!(stack, pop_i32, >=),
        op::I32_GE_U => cmp!(stack, pop_u32, >=),

        // i64 comparisons
        op::I64_EQZ => {
            let v = pop_i64(stack)?;
            push_bool(stack, v == 0)
        }
        op::I64_EQ => cmp!(stack, pop_i64, ==),
        op::I64_NE => cmp!(stack, pop_i64, !=),
        op::I64_LT_S => cmp!(stack, pop_i64, <),
        op::I64_LT_U => cmp!(stack, pop_u64, <),
        op::I64_GT_S => cmp!(stack, pop_i64, >),
        op::I64_GT_U => cmp!(stack, pop_u64, >),
        op::I64_LE_S => cmp!(stack, pop_i64, <=),
        op::I64_LE_U => cmp!(stack, pop_u64, <=),
        op::I64_GE_S => cmp!(stack, pop_i64, >=),
        op::I64_GE_U => cmp!(stack, pop_u64, >=),

        // float comparisons
        op::F32_EQ => cmp!(stack, pop_f32, ==),
        op::F32_NE => cmp!(stack, pop_f32, !=),
        op::F32_LT => cmp!(stack, pop_f32, <),
        op::F32_GT => cmp!(stack, pop_f32, >),
        op::F32_LE => cmp!(stack, pop_f32, <=),
        op::F32_GE => cmp!(stack, pop_f32, >=),
        op::F64_EQ => cmp!(stack, pop_f64, ==),
        op::F64_NE => cmp!(stack, pop_f64, !=),
        op::F64_LT => cmp!(stack, pop_f64, <),
        op::F64_GT => cmp!(stack, pop_f64, >),
        op::F64_LE => cmp!(stack, pop_f64, <=),
        op::F64_GE => cmp!(stack, pop_f64, >=),

        // i32 arithmetic
        op::I32_CLZ => {
            let v = pop_u32(stack)?;
            push_i32(stack, v.leading_zeros() as i32)
        }
        op::I32_CTZ => {
            let v = pop_u32(stack)?;
            push_i32(stack, v.trailing_zeros() as i32)
        }
        op::I32_POPCNT => {
            let v = pop_u32(stack)?;
            push_i32(stack, v.count_ones() as i32)
        }
        op::I32_ADD => bin_i32!(stack, i32::wrapping_add),
        op::I32_SUB => bin_i32!(stack, i32::wrapping_sub),
        op::I32_MUL => bin_i32!(stack, i32::wrapping_mul),
        op::I32_DIV_S => {
            let rhs = pop_i32(stack)?;
            let lhs = pop_i32(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            if lhs == i32::MIN && rhs == -1 {
                return Err(Trap::IntegerOverflow);
            }
            push_i32(stack, lhs / rhs)
        }
        op::I32_DIV_U => {
            let rhs = pop_u32(stack)?;
            let lhs = pop_u32(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i32(stack, (lhs / rhs) as i32)
        }
        op::I32_REM_S => {
            let rhs = pop_i32(stack)?;
            let lhs = pop_i32(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i32(stack, lhs.wrapping_rem(rhs))
        }
        op::I32_REM_U => {
            let rhs = pop_u32(stack)?;
            let lhs = pop_u32(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i32(stack, (lhs % rhs) as i32)
        }
        op::I32_AND => bin_i32!(stack, |a, b| a & b),
        op::I32_OR => bin_i32!(stack, |a, b| a | b),
        op::I32_XOR => bin_i32!(stack, |a, b| a ^ b),
        op::I32_SHL => bin_i32!(stack, |a: i32, b: i32| a.wrapping_shl(b as u32)),
        op::I32_SHR_S => bin_i32!(stack, |a: i32, b: i32| a.wrapping_shr(b as u32)),
        op::I32_SHR_U => {
            let rhs = pop_u32(stack)?;
            let lhs = pop_u32(stack)?;
            push_i32(stack, lhs.wrapping_shr(rhs) as i32)
        }
        op::I32_ROTL => bin_i32!(stack, |a: i32, b: i32| a.rotate_left(b as u32 & 31)),
        op::I32_ROTR => bin_i32!(stack, |a: i32, b: i32| a.rotate_right(b as u32 & 31)),

        // i64 arithmetic
        op::I64_CLZ => {
            let v = pop_u64(stack)?;
            push_i64(stack, v.leading_zeros() as i64)
        }
        op::I64_CTZ => {
            let v = pop_u64(stack)?;
            push_i64(stack, v.trailing_zeros() as i64)
        }
        op::I64_POPCNT => {
            let v = pop_u64(stack)?;
            push_i64(stack, v.count_ones() as i64)
        }
        op::I64_ADD => bin_i64!(stack, i64::wrapping_add),
        op::I64_SUB => bin_i64!(stack, i64::wrapping_sub),
        op::I64_MUL => bin_i64!(stack, i64::wrapping_mul),
        op::I64_DIV_S => {
            let rhs = pop_i64(stack)?;
            let lhs = pop_i64(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            if lhs == i64::MIN && rhs == -1 {
                return Err(Trap::IntegerOverflow);
            }
            push_i64(stack, lhs / rhs)
        }
        op::I64_DIV_U => {
            let rhs = pop_u64(stack)?;
            let lhs = pop_u64(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i64(stack, (lhs / rhs) as i64)
        }
        op::I64_REM_S => {
            let rhs = pop_i64(stack)?;
            let lhs = pop_i64(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i64(stack, lhs.wrapping_rem(rhs))
        }
        op::I64_REM_U => {
            let rhs = pop_u64(stack)?;
            let lhs = pop_u64(stack)?;
            if rhs == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i64(stack, (lhs % rhs) as i64)
        }
        op::I64_AND => bin_i64!(stack, |a, b| a & b),
        op::I64_OR => bin_i64!(stack, |a, b| a | b),
        op::I64_XOR => bin_i64!(stack, |a, b| a ^ b),
        op::I64_SHL => bin_i64!(stack, |a: i64, b: i64| a.wrapping_shl(b as u32)),
        op::I64_SHR_S => bin_i64!(stack, |a: i64, b: i64| a.wrapping_shr(b as u32)),
        op::I64_SHR_U => {
            let rhs = pop_u64(stack)?;
            let lhs = pop_u64(stack)?;
            push_i64(stack, lhs.wrapping_shr(rhs as u32) as i64)
        }
        op::I64_ROTL => bin_i64!(stack, |a: i64, b: i64| a.rotate_left(b as u32 & 63)),
        op::I64_ROTR => bin_i64!(stack, |a: i64, b: i64| a.rotate_right(b as u32 & 63)),

        // f32 arithmetic
        op::F32_ABS => {
            let v = pop_f32(stack)?;
            push_f32(stack, v.abs())
        }
        op::F32_NEG => {
            let v = pop_f32(stack)?;
            push_f32(stack, -v)
        }
        op::F32_CEIL => {
            let v = pop_f32(stack)?;
            push_f32(stack, v.ceil())
        }
        op::F32_FLOOR => {
            let v = pop_f32(stack)?;
            push_f32(stack, v.floor())
        }
        op::F32_TRUNC => {
            let v = pop_f32(stack)?;
            push_f32(stack, v.trunc())
        }
        op::F32_NEAREST => {
            let v = pop_f32(stack)?;
            push_f32(stack, v.round_ties_even())
        }
        op::F32_SQRT => {
            let v = pop_f32(stack)?;
            push_f32(stack, v.sqrt())
        }
        op::F32_ADD => bin_f32!(stack, |a, b| a + b),
        op::F32_SUB => bin_f32!(stack, |a, b| a - b),
        op::F32_MUL => bin_f32!(stack, |a, b| a * b),
        op::F32_DIV => bin_f32!(stack, |a, b| a / b),
        op::F32_MIN => bin_f32!(stack, fmin),
        op::F32_MAX => bin_f32!(stack, fmax),
        op::F32_COPYSIGN => bin_f32!(stack, f32::copysign),

        // f64 arithmetic
        op::F64_ABS => {
            let v = pop_f64(stack)?;
            push_f64(stack, v.abs())
        }
        op::F64_NEG => {
            let v = pop_f64(stack)?;
            push_f64(stack, -v)
        }
        op::F64_CEIL => {
            let v = pop_f64(stack)?;
            push_f64(stack, v.ceil())
        }
        op::F64_FLOOR => {
            let v = pop_f64(stack)?;
            push_f64(stack, v.floor())
        }
        op::F64_TRUNC => {
            let v = pop_f64(stack)?;
            push_f64(stack, v.trunc())
        }
        op::F64_NEAREST => {
            let v = pop_f64(stack)?;
            push_f64(stack, v.round_ties_even())
        }
        op::F64_SQRT => {
            let v = pop_f64(stack)?;
            push_f64(stack, v.sqrt())
        }
        op::F64_ADD => bin_f64!(stack, |a, b| a + b),
        op::F64_SUB => bin_f64!(stack, |a, b| a - b),
        op::F64_MUL => bin_f64!(stack, |a, b| a * b),
        op::F64_DIV => bin_f64!(stack, |a, b| a / b),
        op::F64_MIN => bin_f64!(stack, fmin),
        op::F64_MAX => bin_f64!(stack, fmax),
        op::F64_COPYSIGN => bin_f64!(stack, f64::copysign),

        // conversions
        op::I32_WRAP_I64 => {
            let v = pop_i64(stack)?;
            push_i32(stack, v as i32)
        }
        op::I32_TRUNC_F32_S => {
            trunc_to!(stack, pop_f32, -2147483648.0f32, 2147483648.0f32, i32, push_i32)
        }
        op::I32_TRUNC_F32_U => {
            let x = pop_f32(stack)?;
            if x.is_nan() {
                return Err(Trap::InvalidConversionToInteger);
            }
            let t = x.trunc();
            if !(t >= -0.0 && t < 4294967296.0f32) {
                return Err(Trap::IntegerOverflow);
            }
            push_i32(stack, t as u32 as i32)
        }
        op::I32_TRUNC_F64_S => {
            trunc_to!(stack, pop_f64, -2147483648.0f64, 2147483648.0f64, i32, push_i32)
        }
        op::I32_TRUNC_F64_U => {
            let x = pop_f64(stack)?;
            if x.is_nan() {
                return Err(Trap::InvalidConversionToInteger);
            }
            let t = x.trunc();
            if !(t >= -0.0 && t < 4294967296.0f64) {
                return Err(Trap::IntegerOverflow);
            }
            push_i32(stack, t as u32 as i32)
        }
        op::I64_EXTEND_I32_S => {
            let v = pop_i32(stack)?;
            push_i64(stack, v as i64)
        }
        op::I64_EXTEND_I32_U => {
            let v = pop_u32(stack)?;
            push_i64(stack, v as i64)
        }
        op::I64_TRUNC_F32_S => trunc_to!(
            stack,
            pop_f32,
            -9223372036854775808.0f32,
            9223372036854775808.0f32,
            i64,
            push_i64
        ),
        op::I64_TRUNC_F32_U => {
            let x = pop_f32(stack)?;
            if x.is_nan() {
                return Err(Trap::InvalidConversionToInteger);
            }
            let t = x.trunc();
            if !(t >= -0.0 && t < 18446744073709551616.0f32) {
                return Err(Trap::IntegerOverflow);
            }
            push_i64(stack, t as u64 as i64)
        }
        op::I64_TRUNC_F64_S => trunc_to!(
            stack,
            pop_f64,
            -9223372036854775808.0f64,
            9223372036854775808.0f64,
            i64,
            push_i64
        ),
        op::I64_TRUNC_F64_U => {
            let x = pop_f64(stack)?;
            if x.is_nan() {
                return Err(Trap::InvalidConversionToInteger);
            }
            let t = x.trunc();
            if !(t >= -0.0 && t < 18446744073709551616.0f64) {
                return Err(Trap::IntegerOverflow);
            }
            push_i64(stack, t as u64 as i64)
        }
        op::F32_CONVERT_I32_S => {
            let v = pop_i32(stack)?;
            push_f32(stack, v as f32)
        }
        op::F32_CONVERT_I32_U => {
            let v = pop_u32(stack)?;
            push_f32(stack, v as f32)
        }
        op::F32_CONVERT_I64_S => {
            let v = pop_i64(stack)?;
            push_f32(stack, v as f32)
        }
        op::F32_CONVERT_I64_U => {
            let v = pop_u64(stack)?;
            push_f32(stack, v as f32)
        }
        op::F32_DEMOTE_F64 => {
            let v = pop_f64(stack)?;
            push_f32(stack, v as f32)
        }
        op::F64_CONVERT_I32_S => {
            let v = pop_i32(stack)?;
            push_f64(stack, v as f64)
        }
        op::F64_CONVERT_I32_U => {
            let v = pop_u32(stack)?;
            push_f64(stack, v as f64)
        }
        op::F64_CONVERT_I64_S => {
            let v = pop_i64(stack)?;
            push_f64(stack, v as f64)
        }
        op::F64_CONVERT_I64_U => {
            let v = pop_u64(stack)?;
            push_f64(stack, v as f64)
        }
        op::F64_PROMOTE_F32 => {
            let v = pop_f32(stack)?;
            push_f64(stack, v as f64)
        }
        op::I32_REINTERPRET_F32 | op::F32_REINTERPRET_I32 => {
            // The slot already holds the bit pattern.
            let v = stack.pop()? as u32 as u64;
            stack.push(v)
        }
        op::I64_REINTERPRET_F64 | op::F64_REINTERPRET_I64 => Ok(()),

        _ => Err(Trap::CorruptCode("unknown value opcode")),
    }
}

/// Execute one memory load or store (0x28..=0x3E). The static `offset`
/// comes from the compiled immediate; the dynamic address is popped.
pub fn memory_access(
    opcode: u8,
    offset: u32,
    stack: &mut OperandStack,
    mem: &mut MemoryInstance,
) -> Result<(), Trap> {
    #[inline]
    fn effective(addr: u32, offset: u32) -> Result<u32, Trap> {
        u32::try_from(u64::from(addr) + u64::from(offset)).map_err(|_| Trap::MemoryOutOfBounds)
    }

    if (op::I32_LOAD..=op::I64_LOAD32_U).contains(&opcode) {
        let ea = effective(pop_u32(stack)?, offset)?;
        let raw = match opcode {
            op::I32_LOAD => mem.load(ea, 4)?,
            op::I64_LOAD => mem.load(ea, 8)?,
            op::F32_LOAD => mem.load(ea, 4)?,
            op::F64_LOAD => mem.load(ea, 8)?,
            op::I32_LOAD8_S => mem.load(ea, 1)? as u8 as i8 as i32 as u32 as u64,
            op::I32_LOAD8_U => mem.load(ea, 1)?,
            op::I32_LOAD16_S => mem.load(ea, 2)? as u16 as i16 as i32 as u32 as u64,
            op::I32_LOAD16_U => mem.load(ea, 2)?,
            op::I64_LOAD8_S => mem.load(ea, 1)? as u8 as i8 as i64 as u64,
            op::I64_LOAD8_U => mem.load(ea, 1)?,
            op::I64_LOAD16_S => mem.load(ea, 2)? as u16 as i16 as i64 as u64,
            op::I64_LOAD16_U => mem.load(ea, 2)?,
            op::I64_LOAD32_S => mem.load(ea, 4)? as u32 as i32 as i64 as u64,
            op::I64_LOAD32_U => mem.load(ea, 4)?,
            _ => unreachable!(),
        };
        return stack.push(raw);
    }

    let value = stack.pop()?;
    let ea = effective(pop_u32(stack)?, offset)?;
    match opcode {
        op::I32_STORE => mem.store(ea, 4, value),
        op::I64_STORE => mem.store(ea, 8, value),
        op::F32_STORE => mem.store(ea, 4, value),
        op::F64_STORE => mem.store(ea, 8, value),
        op::I32_STORE8 | op::I64_STORE8 => mem.store(ea, 1, value),
        op::I32_STORE16 | op::I64_STORE16 => mem.store(ea, 2, value),
        op::I64_STORE32 => mem.store(ea, 4, value),
        _ => Err(Trap::CorruptCode("unknown memory opcode")),
    }
}

/// `memory.size`: current page count.
pub fn memory_size(stack: &mut OperandStack, mem: &MemoryInstance) -> Result<(), Trap> {
    push_i32(stack, mem.size_pages() as i32)
}

/// `memory.grow`: previous page count on success, -1 on failure, atomic
/// either way.
pub fn memory_grow(stack: &mut OperandStack, mem: &mut MemoryInstance) -> Result<(), Trap> {
    let delta = pop_u32(stack)?;
    match mem.grow(delta) {
        Some(prev) => push_i32(stack, prev as i32),
        None => push_i32(stack, -1),
    }
}
