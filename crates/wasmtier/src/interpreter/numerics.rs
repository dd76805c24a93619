//! Numeric semantics shared by both interpreter tiers.
//!
//! Slots are raw `u64` words: 32-bit integers and `f32` bits are stored
//! zero-extended, and every reader truncates.

use super::Trap;
use crate::code::{BinOp, UnOp};

const F32_CANONICAL_NAN: u32 = 0x7fc0_0000;
const F64_CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

#[inline]
fn from_u32(v: u32) -> u64 {
    v as u64
}

#[inline]
fn from_bool(v: bool) -> u64 {
    v as u64
}

#[inline]
fn f32_of(v: u64) -> f32 {
    f32::from_bits(v as u32)
}

#[inline]
fn f64_of(v: u64) -> f64 {
    f64::from_bits(v)
}

#[inline]
fn from_f32(v: f32) -> u64 {
    v.to_bits() as u64
}

#[inline]
fn from_f64(v: f64) -> u64 {
    v.to_bits()
}

fn f32_min(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::from_bits(F32_CANONICAL_NAN)
    } else if a == b {
        // -0 and +0 compare equal; the sign bit decides.
        f32::from_bits(a.to_bits() | b.to_bits())
    } else {
        a.min(b)
    }
}

fn f32_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::from_bits(F32_CANONICAL_NAN)
    } else if a == b {
        f32::from_bits(a.to_bits() & b.to_bits())
    } else {
        a.max(b)
    }
}

fn f64_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::from_bits(F64_CANONICAL_NAN)
    } else if a == b {
        f64::from_bits(a.to_bits() | b.to_bits())
    } else {
        a.min(b)
    }
}

fn f64_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::from_bits(F64_CANONICAL_NAN)
    } else if a == b {
        f64::from_bits(a.to_bits() & b.to_bits())
    } else {
        a.max(b)
    }
}

fn i32_div_s(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    if a == i32::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a / b)
}

fn i64_div_s(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::IntegerDivideByZero);
    }
    if a == i64::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a / b)
}

/// Truncate toward zero and range-check against `(lower, upper)`, both
/// exclusive bounds on the truncated value.
fn checked_trunc(v: f64, lower: f64, upper: f64) -> Result<f64, Trap> {
    if v.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = v.trunc();
    if t <= lower || t >= upper {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t)
}

fn i32_trunc_s(v: f64) -> Result<u64, Trap> {
    let t = checked_trunc(v, -2147483649.0, 2147483648.0)?;
    Ok(from_u32(t as i32 as u32))
}

fn i32_trunc_u(v: f64) -> Result<u64, Trap> {
    let t = checked_trunc(v, -1.0, 4294967296.0)?;
    Ok(from_u32(t as u32))
}

fn i64_trunc_s(v: f64) -> Result<u64, Trap> {
    // -2^63 - 1 is not representable; the next double below -2^63 is.
    let t = checked_trunc(v, -9223372036854777856.0, 9223372036854775808.0)?;
    Ok(t as i64 as u64)
}

fn i64_trunc_u(v: f64) -> Result<u64, Trap> {
    let t = checked_trunc(v, -1.0, 18446744073709551616.0)?;
    Ok(t as u64)
}

/// Evaluate a two-operand numeric operator.
pub(crate) fn binary(op: BinOp, a: u64, b: u64) -> Result<u64, Trap> {
    use BinOp::*;
    let (x32, y32) = (a as u32, b as u32);
    let (s32, t32) = (a as u32 as i32, b as u32 as i32);
    let (s64, t64) = (a as i64, b as i64);
    Ok(match op {
        I32Add => from_u32(x32.wrapping_add(y32)),
        I32Sub => from_u32(x32.wrapping_sub(y32)),
        I32Mul => from_u32(x32.wrapping_mul(y32)),
        I32DivS => from_u32(i32_div_s(s32, t32)? as u32),
        I32DivU => from_u32(x32.checked_div(y32).ok_or(Trap::IntegerDivideByZero)?),
        I32RemS => {
            if t32 == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            from_u32(s32.wrapping_rem(t32) as u32)
        }
        I32RemU => from_u32(x32.checked_rem(y32).ok_or(Trap::IntegerDivideByZero)?),
        I32And => from_u32(x32 & y32),
        I32Or => from_u32(x32 | y32),
        I32Xor => from_u32(x32 ^ y32),
        I32Shl => from_u32(x32.wrapping_shl(y32)),
        I32ShrS => from_u32(s32.wrapping_shr(y32) as u32),
        I32ShrU => from_u32(x32.wrapping_shr(y32)),
        I32Rotl => from_u32(x32.rotate_left(y32 & 31)),
        I32Rotr => from_u32(x32.rotate_right(y32 & 31)),
        I32Eq => from_bool(x32 == y32),
        I32Ne => from_bool(x32 != y32),
        I32LtS => from_bool(s32 < t32),
        I32LtU => from_bool(x32 < y32),
        I32GtS => from_bool(s32 > t32),
        I32GtU => from_bool(x32 > y32),
        I32LeS => from_bool(s32 <= t32),
        I32LeU => from_bool(x32 <= y32),
        I32GeS => from_bool(s32 >= t32),
        I32GeU => from_bool(x32 >= y32),

        I64Add => a.wrapping_add(b),
        I64Sub => a.wrapping_sub(b),
        I64Mul => a.wrapping_mul(b),
        I64DivS => i64_div_s(s64, t64)? as u64,
        I64DivU => a.checked_div(b).ok_or(Trap::IntegerDivideByZero)?,
        I64RemS => {
            if t64 == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            s64.wrapping_rem(t64) as u64
        }
        I64RemU => a.checked_rem(b).ok_or(Trap::IntegerDivideByZero)?,
        I64And => a & b,
        I64Or => a | b,
        I64Xor => a ^ b,
        I64Shl => a.wrapping_shl(b as u32),
        I64ShrS => s64.wrapping_shr(b as u32) as u64,
        I64ShrU => a.wrapping_shr(b as u32),
        I64Rotl => a.rotate_left((b & 63) as u32),
        I64Rotr => a.rotate_right((b & 63) as u32),
        I64Eq => from_bool(a == b),
        I64Ne => from_bool(a != b),
        I64LtS => from_bool(s64 < t64),
        I64LtU => from_bool(a < b),
        I64GtS => from_bool(s64 > t64),
        I64GtU => from_bool(a > b),
        I64LeS => from_bool(s64 <= t64),
        I64LeU => from_bool(a <= b),
        I64GeS => from_bool(s64 >= t64),
        I64GeU => from_bool(a >= b),

        F32Add => from_f32(f32_of(a) + f32_of(b)),
        F32Sub => from_f32(f32_of(a) - f32_of(b)),
        F32Mul => from_f32(f32_of(a) * f32_of(b)),
        F32Div => from_f32(f32_of(a) / f32_of(b)),
        F32Min => from_f32(f32_min(f32_of(a), f32_of(b))),
        F32Max => from_f32(f32_max(f32_of(a), f32_of(b))),
        F32Copysign => from_f32(f32_of(a).copysign(f32_of(b))),
        F32Eq => from_bool(f32_of(a) == f32_of(b)),
        F32Ne => from_bool(f32_of(a) != f32_of(b)),
        F32Lt => from_bool(f32_of(a) < f32_of(b)),
        F32Gt => from_bool(f32_of(a) > f32_of(b)),
        F32Le => from_bool(f32_of(a) <= f32_of(b)),
        F32Ge => from_bool(f32_of(a) >= f32_of(b)),

        F64Add => from_f64(f64_of(a) + f64_of(b)),
        F64Sub => from_f64(f64_of(a) - f64_of(b)),
        F64Mul => from_f64(f64_of(a) * f64_of(b)),
        F64Div => from_f64(f64_of(a) / f64_of(b)),
        F64Min => from_f64(f64_min(f64_of(a), f64_of(b))),
        F64Max => from_f64(f64_max(f64_of(a), f64_of(b))),
        F64Copysign => from_f64(f64_of(a).copysign(f64_of(b))),
        F64Eq => from_bool(f64_of(a) == f64_of(b)),
        F64Ne => from_bool(f64_of(a) != f64_of(b)),
        F64Lt => from_bool(f64_of(a) < f64_of(b)),
        F64Gt => from_bool(f64_of(a) > f64_of(b)),
        F64Le => from_bool(f64_of(a) <= f64_of(b)),
        F64Ge => from_bool(f64_of(a) >= f64_of(b)),
    })
}

/// Evaluate a one-operand numeric operator.
pub(crate) fn unary(op: UnOp, a: u64) -> Result<u64, Trap> {
    use UnOp::*;
    let x32 = a as u32;
    Ok(match op {
        I32Eqz => from_bool(x32 == 0),
        I64Eqz => from_bool(a == 0),
        I32Clz => from_u32(x32.leading_zeros()),
        I32Ctz => from_u32(x32.trailing_zeros()),
        I32Popcnt => from_u32(x32.count_ones()),
        I64Clz => a.leading_zeros() as u64,
        I64Ctz => a.trailing_zeros() as u64,
        I64Popcnt => a.count_ones() as u64,

        F32Abs => from_u32(x32 & 0x7fff_ffff),
        F32Neg => from_u32(x32 ^ 0x8000_0000),
        F32Ceil => from_f32(f32_of(a).ceil()),
        F32Floor => from_f32(f32_of(a).floor()),
        F32Trunc => from_f32(f32_of(a).trunc()),
        F32Nearest => from_f32(f32_of(a).round_ties_even()),
        F32Sqrt => from_f32(f32_of(a).sqrt()),
        F64Abs => a & 0x7fff_ffff_ffff_ffff,
        F64Neg => a ^ 0x8000_0000_0000_0000,
        F64Ceil => from_f64(f64_of(a).ceil()),
        F64Floor => from_f64(f64_of(a).floor()),
        F64Trunc => from_f64(f64_of(a).trunc()),
        F64Nearest => from_f64(f64_of(a).round_ties_even()),
        F64Sqrt => from_f64(f64_of(a).sqrt()),

        I32WrapI64 => from_u32(x32),
        I32TruncF32S => i32_trunc_s(f32_of(a) as f64)?,
        I32TruncF32U => i32_trunc_u(f32_of(a) as f64)?,
        I32TruncF64S => i32_trunc_s(f64_of(a))?,
        I32TruncF64U => i32_trunc_u(f64_of(a))?,
        I64ExtendI32S => x32 as i32 as i64 as u64,
        I64ExtendI32U => x32 as u64,
        I64TruncF32S => i64_trunc_s(f32_of(a) as f64)?,
        I64TruncF32U => i64_trunc_u(f32_of(a) as f64)?,
        I64TruncF64S => i64_trunc_s(f64_of(a))?,
        I64TruncF64U => i64_trunc_u(f64_of(a))?,
        F32ConvertI32S => from_f32(x32 as i32 as f32),
        F32ConvertI32U => from_f32(x32 as f32),
        F32ConvertI64S => from_f32(a as i64 as f32),
        F32ConvertI64U => from_f32(a as f32),
        F32DemoteF64 => from_f32(f64_of(a) as f32),
        F64ConvertI32S => from_f64(x32 as i32 as f64),
        F64ConvertI32U => from_f64(x32 as f64),
        F64ConvertI64S => from_f64(a as i64 as f64),
        F64ConvertI64U => from_f64(a as f64),
        F64PromoteF32 => from_f64(f32_of(a) as f64),
        I32ReinterpretF32 | F32ReinterpretI32 => from_u32(x32),
        I64ReinterpretF64 | F64ReinterpretI64 => a,

        I32Extend8S => from_u32(x32 as i8 as i32 as u32),
        I32Extend16S => from_u32(x32 as i16 as i32 as u32),
        I64Extend8S => a as i8 as i64 as u64,
        I64Extend16S => a as i16 as i64 as u64,
        I64Extend32S => a as i32 as i64 as u64,

        // Float-to-int `as` casts saturate and map NaN to zero.
        I32TruncSatF32S => from_u32(f32_of(a) as i32 as u32),
        I32TruncSatF32U => from_u32(f32_of(a) as u32),
        I32TruncSatF64S => from_u32(f64_of(a) as i32 as u32),
        I32TruncSatF64U => from_u32(f64_of(a) as u32),
        I64TruncSatF32S => f32_of(a) as i64 as u64,
        I64TruncSatF32U => f32_of(a) as u64,
        I64TruncSatF64S => f64_of(a) as i64 as u64,
        I64TruncSatF64U => f64_of(a) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32v(v: i32) -> u64 {
        v as u32 as u64
    }

    #[test]
    fn i32_div_by_zero_traps() {
        assert_eq!(
            binary(BinOp::I32DivS, i32v(5), i32v(0)),
            Err(Trap::IntegerDivideByZero)
        );
        assert_eq!(
            binary(BinOp::I32RemU, i32v(5), i32v(0)),
            Err(Trap::IntegerDivideByZero)
        );
    }

    #[test]
    fn i64_min_div_minus_one_overflows() {
        assert_eq!(
            binary(BinOp::I64DivS, i64::MIN as u64, -1i64 as u64),
            Err(Trap::IntegerOverflow)
        );
    }

    #[test]
    fn rem_s_by_minus_one_is_zero() {
        assert_eq!(binary(BinOp::I32RemS, i32v(7), i32v(-1)), Ok(0));
        assert_eq!(binary(BinOp::I32RemS, i32v(i32::MIN), i32v(-1)), Ok(0));
        assert_eq!(
            binary(BinOp::I64RemS, i64::MIN as u64, -1i64 as u64),
            Ok(0)
        );
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        let nan = f64::NAN.to_bits();
        assert_eq!(binary(BinOp::F64Eq, nan, nan), Ok(0));
        assert_eq!(binary(BinOp::F64Ne, nan, nan), Ok(1));
    }

    #[test]
    fn shifts_mask_their_count() {
        assert_eq!(binary(BinOp::I32Shl, i32v(1), i32v(33)), Ok(2));
        assert_eq!(binary(BinOp::I64ShrU, 4, 65), Ok(2));
        assert_eq!(binary(BinOp::I32ShrS, i32v(-8), i32v(1)), Ok(i32v(-4)));
    }

    #[test]
    fn min_max_signed_zero_and_nan() {
        let neg = (-0.0f32).to_bits() as u64;
        let pos = 0.0f32.to_bits() as u64;
        assert_eq!(binary(BinOp::F32Min, pos, neg), Ok(neg));
        assert_eq!(binary(BinOp::F32Max, neg, pos), Ok(pos));
        let nan = f32::NAN.to_bits() as u64;
        let min = binary(BinOp::F32Min, nan, pos).unwrap();
        assert!(f32::from_bits(min as u32).is_nan());
        assert_eq!(
            binary(BinOp::F64Max, 1.0f64.to_bits(), f64::NAN.to_bits()),
            binary(BinOp::F64Max, f64::NAN.to_bits(), 1.0f64.to_bits()),
        );
    }

    #[test]
    fn trapping_truncation() {
        let f = |v: f64| v.to_bits();
        assert_eq!(
            unary(UnOp::I32TruncF64S, f(f64::NAN)),
            Err(Trap::InvalidConversionToInteger)
        );
        assert_eq!(
            unary(UnOp::I32TruncF64S, f(2147483648.0)),
            Err(Trap::IntegerOverflow)
        );
        assert_eq!(unary(UnOp::I32TruncF64S, f(-2147483648.9)), Ok(i32v(i32::MIN)));
        assert_eq!(unary(UnOp::I32TruncF64U, f(-0.9)), Ok(0));
        assert_eq!(
            unary(UnOp::I32TruncF64U, f(-1.0)),
            Err(Trap::IntegerOverflow)
        );
        assert_eq!(
            unary(UnOp::I64TruncF64S, f(9223372036854775808.0)),
            Err(Trap::IntegerOverflow)
        );
        assert_eq!(
            unary(UnOp::I64TruncF64S, f(-9223372036854775808.0)),
            Ok(i64::MIN as u64)
        );
    }

    #[test]
    fn saturating_truncation() {
        let f = |v: f32| v.to_bits() as u64;
        assert_eq!(unary(UnOp::I32TruncSatF32S, f(f32::NAN)), Ok(0));
        assert_eq!(unary(UnOp::I32TruncSatF32S, f(1e10)), Ok(i32v(i32::MAX)));
        assert_eq!(unary(UnOp::I32TruncSatF32U, f(-5.0)), Ok(0));
        assert_eq!(unary(UnOp::I64TruncSatF32S, f(-1e30)), Ok(i64::MIN as u64));
    }

    #[test]
    fn nearest_rounds_half_to_even() {
        let f = |v: f64| v.to_bits();
        assert_eq!(unary(UnOp::F64Nearest, f(2.5)), Ok(f(2.0)));
        assert_eq!(unary(UnOp::F64Nearest, f(-3.5)), Ok(f(-4.0)));
    }

    #[test]
    fn sign_extension() {
        assert_eq!(unary(UnOp::I32Extend8S, 0x80), Ok(i32v(-128)));
        assert_eq!(unary(UnOp::I64Extend32S, 0xffff_ffff), Ok(u64::MAX));
    }
}
