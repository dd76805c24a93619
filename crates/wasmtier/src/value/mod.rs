use crate::types::ValType;

/// Dynamic WASM value for untyped function calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Val {
    pub fn zero_for(ty: ValType) -> Val {
        match ty {
            ValType::I32 => Val::I32(0),
            ValType::I64 => Val::I64(0),
            ValType::F32 => Val::F32(0.0),
            ValType::F64 => Val::F64(0.0),
        }
    }

    pub fn ty(&self) -> ValType {
        match self {
            Val::I32(_) => ValType::I32,
            Val::I64(_) => ValType::I64,
            Val::F32(_) => ValType::F32,
            Val::F64(_) => ValType::F64,
        }
    }

    /// The raw 64-bit slot encoding used inside frames.
    ///
    /// 32-bit values are zero-extended; floats keep their exact bit pattern.
    pub fn to_bits(&self) -> u64 {
        match *self {
            Val::I32(v) => v as u32 as u64,
            Val::I64(v) => v as u64,
            Val::F32(v) => v.to_bits() as u64,
            Val::F64(v) => v.to_bits(),
        }
    }

    /// Reinterpret a raw slot as a value of type `ty`.
    pub fn from_bits(ty: ValType, bits: u64) -> Val {
        match ty {
            ValType::I32 => Val::I32(bits as u32 as i32),
            ValType::I64 => Val::I64(bits as i64),
            ValType::F32 => Val::F32(f32::from_bits(bits as u32)),
            ValType::F64 => Val::F64(f64::from_bits(bits)),
        }
    }
}

/// Convert a single Rust value to/from a `Val`.
pub trait WasmVal: Sized {
    fn to_val(&self) -> Val;
    fn from_val(val: &Val) -> Result<Self, anyhow::Error>;
}

macro_rules! impl_wasm_val {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl WasmVal for $ty {
                fn to_val(&self) -> Val {
                    Val::$variant(*self)
                }
                fn from_val(val: &Val) -> Result<Self, anyhow::Error> {
                    match val {
                        Val::$variant(v) => Ok(*v),
                        _ => anyhow::bail!(
                            concat!("expected ", stringify!($ty), ", got {:?}"),
                            val
                        ),
                    }
                }
            }
        )*
    };
}

impl_wasm_val!(i32 => I32, i64 => I64, f32 => F32, f64 => F64);

impl WasmVal for u32 {
    fn to_val(&self) -> Val {
        Val::I32(*self as i32)
    }
    fn from_val(val: &Val) -> Result<Self, anyhow::Error> {
        i32::from_val(val).map(|v| v as u32)
    }
}

impl WasmVal for u64 {
    fn to_val(&self) -> Val {
        Val::I64(*self as i64)
    }
    fn from_val(val: &Val) -> Result<Self, anyhow::Error> {
        i64::from_val(val).map(|v| v as u64)
    }
}

/// Convert Rust types into WASM call arguments.
pub trait WasmArgs {
    fn to_vals(&self) -> Vec<Val>;
}

/// Convert WASM results back into Rust types.
pub trait WasmResults: Sized {
    fn from_vals(vals: &[Val]) -> Result<Self, anyhow::Error>;
}

impl WasmArgs for () {
    fn to_vals(&self) -> Vec<Val> {
        vec![]
    }
}

impl WasmResults for () {
    fn from_vals(vals: &[Val]) -> Result<Self, anyhow::Error> {
        anyhow::ensure!(vals.is_empty(), "expected no results, got {}", vals.len());
        Ok(())
    }
}

impl<T: WasmVal> WasmArgs for T {
    fn to_vals(&self) -> Vec<Val> {
        vec![self.to_val()]
    }
}

impl<T: WasmVal> WasmResults for T {
    fn from_vals(vals: &[Val]) -> Result<Self, anyhow::Error> {
        match vals {
            [v] => T::from_val(v),
            _ => anyhow::bail!("expected 1 result, got {}", vals.len()),
        }
    }
}

macro_rules! impl_wasm_tuples {
    ($(($($T:ident),+)),* $(,)?) => {
        $(
            impl<$($T: WasmVal),+> WasmArgs for ($($T,)+) {
                #[allow(non_snake_case)]
                fn to_vals(&self) -> Vec<Val> {
                    let ($($T,)+) = self;
                    vec![$($T.to_val()),+]
                }
            }

            impl<$($T: WasmVal),+> WasmResults for ($($T,)+) {
                #[allow(non_snake_case)]
                fn from_vals(vals: &[Val]) -> Result<Self, anyhow::Error> {
                    impl_wasm_tuples!(@destructure vals, $($T),+)
                }
            }
        )*
    };

    (@destructure $vals:ident, $($T:ident),+) => {{
        let expected = impl_wasm_tuples!(@count $($T),+);
        anyhow::ensure!(
            $vals.len() == expected,
            "expected {} results, got {}",
            expected,
            $vals.len()
        );
        let mut iter = $vals.iter();
        Ok(($(match iter.next() {
            Some(v) => $T::from_val(v)?,
            None => unreachable!("length checked above"),
        },)+))
    }};

    (@count $($T:ident),+) => {
        <[()]>::len(&[$(impl_wasm_tuples!(@unit $T)),+])
    };

    (@unit $T:ident) => { () };
}

impl_wasm_tuples!(
    (A),
    (A, B),
    (A, B, C),
    (A, B, C, D),
    (A, B, C, D, E),
    (A, B, C, D, E, F),
    (A, B, C, D, E, F, G),
    (A, B, C, D, E, F, G, H),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_bits_survive_slot_encoding() {
        let nan = f32::from_bits(0x7fa0_0001);
        let bits = Val::F32(nan).to_bits();
        assert_eq!(bits, 0x7fa0_0001);
        match Val::from_bits(ValType::F32, bits) {
            Val::F32(v) => assert_eq!(v.to_bits(), 0x7fa0_0001),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn negative_i32_is_zero_extended() {
        assert_eq!(Val::I32(-1).to_bits(), 0xffff_ffff);
        assert_eq!(Val::from_bits(ValType::I32, 0xffff_ffff), Val::I32(-1));
    }

    #[test]
    fn tuple_results_check_arity() {
        let vals = [Val::I32(1), Val::I64(2)];
        let (a, b): (i32, i64) = WasmResults::from_vals(&vals).unwrap();
        assert_eq!((a, b), (1, 2));
        assert!(<(i32,)>::from_vals(&vals).is_err());
    }
}
