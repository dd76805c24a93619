//! Opcode table. Single-byte opcodes keep their binary value; the
//! `0xFC`-prefixed conversions are numbered `0xFC00 | subopcode`.

use super::ops::{BinOp, LoadOp, StoreOp, UnOp};

/// How an opcode is typed and executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Control, parametric, variable, constant and memory-management
    /// instructions, each handled individually.
    Special,
    Unary(UnOp),
    Binary(BinOp),
    Load(LoadOp),
    Store(StoreOp),
}

macro_rules! opcodes {
    ($( $code:literal $name:ident $text:literal $kind:expr; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Opcode {
            $( $name = $code, )*
        }

        impl Opcode {
            pub fn from_code(code: u16) -> Option<Opcode> {
                match code {
                    $( $code => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$name => $text, )*
                }
            }

            pub fn kind(self) -> OpKind {
                #[allow(unused_imports)]
                use OpKind::*;
                match self {
                    $( Opcode::$name => $kind, )*
                }
            }
        }
    };
}

opcodes! {
    0x00 Unreachable "unreachable" Special;
    0x01 Nop "nop" Special;
    0x02 Block "block" Special;
    0x03 Loop "loop" Special;
    0x04 If "if" Special;
    0x05 Else "else" Special;
    0x0B End "end" Special;
    0x0C Br "br" Special;
    0x0D BrIf "br_if" Special;
    0x0E BrTable "br_table" Special;
    0x0F Return "return" Special;
    0x10 Call "call" Special;
    0x11 CallIndirect "call_indirect" Special;
    0x1A Drop "drop" Special;
    0x1B Select "select" Special;
    0x20 LocalGet "local.get" Special;
    0x21 LocalSet "local.set" Special;
    0x22 LocalTee "local.tee" Special;
    0x23 GlobalGet "global.get" Special;
    0x24 GlobalSet "global.set" Special;

    0x28 I32Load "i32.load" Load(LoadOp::I32);
    0x29 I64Load "i64.load" Load(LoadOp::I64);
    0x2A F32Load "f32.load" Load(LoadOp::F32);
    0x2B F64Load "f64.load" Load(LoadOp::F64);
    0x2C I32Load8S "i32.load8_s" Load(LoadOp::I32S8);
    0x2D I32Load8U "i32.load8_u" Load(LoadOp::I32U8);
    0x2E I32Load16S "i32.load16_s" Load(LoadOp::I32S16);
    0x2F I32Load16U "i32.load16_u" Load(LoadOp::I32U16);
    0x30 I64Load8S "i64.load8_s" Load(LoadOp::I64S8);
    0x31 I64Load8U "i64.load8_u" Load(LoadOp::I64U8);
    0x32 I64Load16S "i64.load16_s" Load(LoadOp::I64S16);
    0x33 I64Load16U "i64.load16_u" Load(LoadOp::I64U16);
    0x34 I64Load32S "i64.load32_s" Load(LoadOp::I64S32);
    0x35 I64Load32U "i64.load32_u" Load(LoadOp::I64U32);
    0x36 I32Store "i32.store" Store(StoreOp::I32);
    0x37 I64Store "i64.store" Store(StoreOp::I64);
    0x38 F32Store "f32.store" Store(StoreOp::F32);
    0x39 F64Store "f64.store" Store(StoreOp::F64);
    0x3A I32Store8 "i32.store8" Store(StoreOp::I32As8);
    0x3B I32Store16 "i32.store16" Store(StoreOp::I32As16);
    0x3C I64Store8 "i64.store8" Store(StoreOp::I64As8);
    0x3D I64Store16 "i64.store16" Store(StoreOp::I64As16);
    0x3E I64Store32 "i64.store32" Store(StoreOp::I64As32);
    0x3F MemorySize "memory.size" Special;
    0x40 MemoryGrow "memory.grow" Special;

    0x41 I32Const "i32.const" Special;
    0x42 I64Const "i64.const" Special;
    0x43 F32Const "f32.const" Special;
    0x44 F64Const "f64.const" Special;

    0x45 I32Eqz "i32.eqz" Unary(UnOp::I32Eqz);
    0x46 I32Eq "i32.eq" Binary(BinOp::I32Eq);
    0x47 I32Ne "i32.ne" Binary(BinOp::I32Ne);
    0x48 I32LtS "i32.lt_s" Binary(BinOp::I32LtS);
    0x49 I32LtU "i32.lt_u" Binary(BinOp::I32LtU);
    0x4A I32GtS "i32.gt_s" Binary(BinOp::I32GtS);
    0x4B I32GtU "i32.gt_u" Binary(BinOp::I32GtU);
    0x4C I32LeS "i32.le_s" Binary(BinOp::I32LeS);
    0x4D I32LeU "i32.le_u" Binary(BinOp::I32LeU);
    0x4E I32GeS "i32.ge_s" Binary(BinOp::I32GeS);
    0x4F I32GeU "i32.ge_u" Binary(BinOp::I32GeU);

    0x50 I64Eqz "i64.eqz" Unary(UnOp::I64Eqz);
    0x51 I64Eq "i64.eq" Binary(BinOp::I64Eq);
    0x52 I64Ne "i64.ne" Binary(BinOp::I64Ne);
    0x53 I64LtS "i64.lt_s" Binary(BinOp::I64LtS);
    0x54 I64LtU "i64.lt_u" Binary(BinOp::I64LtU);
    0x55 I64GtS "i64.gt_s" Binary(BinOp::I64GtS);
    0x56 I64GtU "i64.gt_u" Binary(BinOp::I64GtU);
    0x57 I64LeS "i64.le_s" Binary(BinOp::I64LeS);
    0x58 I64LeU "i64.le_u" Binary(BinOp::I64LeU);
    0x59 I64GeS "i64.ge_s" Binary(BinOp::I64GeS);
    0x5A I64GeU "i64.ge_u" Binary(BinOp::I64GeU);

    0x5B F32Eq "f32.eq" Binary(BinOp::F32Eq);
    0x5C F32Ne "f32.ne" Binary(BinOp::F32Ne);
    0x5D F32Lt "f32.lt" Binary(BinOp::F32Lt);
    0x5E F32Gt "f32.gt" Binary(BinOp::F32Gt);
    0x5F F32Le "f32.le" Binary(BinOp::F32Le);
    0x60 F32Ge "f32.ge" Binary(BinOp::F32Ge);

    0x61 F64Eq "f64.eq" Binary(BinOp::F64Eq);
    0x62 F64Ne "f64.ne" Binary(BinOp::F64Ne);
    0x63 F64Lt "f64.lt" Binary(BinOp::F64Lt);
    0x64 F64Gt "f64.gt" Binary(BinOp::F64Gt);
    0x65 F64Le "f64.le" Binary(BinOp::F64Le);
    0x66 F64Ge "f64.ge" Binary(BinOp::F64Ge);

    0x67 I32Clz "i32.clz" Unary(UnOp::I32Clz);
    0x68 I32Ctz "i32.ctz" Unary(UnOp::I32Ctz);
    0x69 I32Popcnt "i32.popcnt" Unary(UnOp::I32Popcnt);
    0x6A I32Add "i32.add" Binary(BinOp::I32Add);
    0x6B I32Sub "i32.sub" Binary(BinOp::I32Sub);
    0x6C I32Mul "i32.mul" Binary(BinOp::I32Mul);
    0x6D I32DivS "i32.div_s" Binary(BinOp::I32DivS);
    0x6E I32DivU "i32.div_u" Binary(BinOp::I32DivU);
    0x6F I32RemS "i32.rem_s" Binary(BinOp::I32RemS);
    0x70 I32RemU "i32.rem_u" Binary(BinOp::I32RemU);
    0x71 I32And "i32.and" Binary(BinOp::I32And);
    0x72 I32Or "i32.or" Binary(BinOp::I32Or);
    0x73 I32Xor "i32.xor" Binary(BinOp::I32Xor);
    0x74 I32Shl "i32.shl" Binary(BinOp::I32Shl);
    0x75 I32ShrS "i32.shr_s" Binary(BinOp::I32ShrS);
    0x76 I32ShrU "i32.shr_u" Binary(BinOp::I32ShrU);
    0x77 I32Rotl "i32.rotl" Binary(BinOp::I32Rotl);
    0x78 I32Rotr "i32.rotr" Binary(BinOp::I32Rotr);

    0x79 I64Clz "i64.clz" Unary(UnOp::I64Clz);
    0x7A I64Ctz "i64.ctz" Unary(UnOp::I64Ctz);
    0x7B I64Popcnt "i64.popcnt" Unary(UnOp::I64Popcnt);
    0x7C I64Add "i64.add" Binary(BinOp::I64Add);
    0x7D I64Sub "i64.sub" Binary(BinOp::I64Sub);
    0x7E I64Mul "i64.mul" Binary(BinOp::I64Mul);
    0x7F I64DivS "i64.div_s" Binary(BinOp::I64DivS);
    0x80 I64DivU "i64.div_u" Binary(BinOp::I64DivU);
    0x81 I64RemS "i64.rem_s" Binary(BinOp::I64RemS);
    0x82 I64RemU "i64.rem_u" Binary(BinOp::I64RemU);
    0x83 I64And "i64.and" Binary(BinOp::I64And);
    0x84 I64Or "i64.or" Binary(BinOp::I64Or);
    0x85 I64Xor "i64.xor" Binary(BinOp::I64Xor);
    0x86 I64Shl "i64.shl" Binary(BinOp::I64Shl);
    0x87 I64ShrS "i64.shr_s" Binary(BinOp::I64ShrS);
    0x88 I64ShrU "i64.shr_u" Binary(BinOp::I64ShrU);
    0x89 I64Rotl "i64.rotl" Binary(BinOp::I64Rotl);
    0x8A I64Rotr "i64.rotr" Binary(BinOp::I64Rotr);

    0x8B F32Abs "f32.abs" Unary(UnOp::F32Abs);
    0x8C F32Neg "f32.neg" Unary(UnOp::F32Neg);
    0x8D F32Ceil "f32.ceil" Unary(UnOp::F32Ceil);
    0x8E F32Floor "f32.floor" Unary(UnOp::F32Floor);
    0x8F F32Trunc "f32.trunc" Unary(UnOp::F32Trunc);
    0x90 F32Nearest "f32.nearest" Unary(UnOp::F32Nearest);
    0x91 F32Sqrt "f32.sqrt" Unary(UnOp::F32Sqrt);
    0x92 F32Add "f32.add" Binary(BinOp::F32Add);
    0x93 F32Sub "f32.sub" Binary(BinOp::F32Sub);
    0x94 F32Mul "f32.mul" Binary(BinOp::F32Mul);
    0x95 F32Div "f32.div" Binary(BinOp::F32Div);
    0x96 F32Min "f32.min" Binary(BinOp::F32Min);
    0x97 F32Max "f32.max" Binary(BinOp::F32Max);
    0x98 F32Copysign "f32.copysign" Binary(BinOp::F32Copysign);

    0x99 F64Abs "f64.abs" Unary(UnOp::F64Abs);
    0x9A F64Neg "f64.neg" Unary(UnOp::F64Neg);
    0x9B F64Ceil "f64.ceil" Unary(UnOp::F64Ceil);
    0x9C F64Floor "f64.floor" Unary(UnOp::F64Floor);
    0x9D F64Trunc "f64.trunc" Unary(UnOp::F64Trunc);
    0x9E F64Nearest "f64.nearest" Unary(UnOp::F64Nearest);
    0x9F F64Sqrt "f64.sqrt" Unary(UnOp::F64Sqrt);
    0xA0 F64Add "f64.add" Binary(BinOp::F64Add);
    0xA1 F64Sub "f64.sub" Binary(BinOp::F64Sub);
    0xA2 F64Mul "f64.mul" Binary(BinOp::F64Mul);
    0xA3 F64Div "f64.div" Binary(BinOp::F64Div);
    0xA4 F64Min "f64.min" Binary(BinOp::F64Min);
    0xA5 F64Max "f64.max" Binary(BinOp::F64Max);
    0xA6 F64Copysign "f64.copysign" Binary(BinOp::F64Copysign);

    0xA7 I32WrapI64 "i32.wrap_i64" Unary(UnOp::I32WrapI64);
    0xA8 I32TruncF32S "i32.trunc_f32_s" Unary(UnOp::I32TruncF32S);
    0xA9 I32TruncF32U "i32.trunc_f32_u" Unary(UnOp::I32TruncF32U);
    0xAA I32TruncF64S "i32.trunc_f64_s" Unary(UnOp::I32TruncF64S);
    0xAB I32TruncF64U "i32.trunc_f64_u" Unary(UnOp::I32TruncF64U);
    0xAC I64ExtendI32S "i64.extend_i32_s" Unary(UnOp::I64ExtendI32S);
    0xAD I64ExtendI32U "i64.extend_i32_u" Unary(UnOp::I64ExtendI32U);
    0xAE I64TruncF32S "i64.trunc_f32_s" Unary(UnOp::I64TruncF32S);
    0xAF I64TruncF32U "i64.trunc_f32_u" Unary(UnOp::I64TruncF32U);
    0xB0 I64TruncF64S "i64.trunc_f64_s" Unary(UnOp::I64TruncF64S);
    0xB1 I64TruncF64U "i64.trunc_f64_u" Unary(UnOp::I64TruncF64U);
    0xB2 F32ConvertI32S "f32.convert_i32_s" Unary(UnOp::F32ConvertI32S);
    0xB3 F32ConvertI32U "f32.convert_i32_u" Unary(UnOp::F32ConvertI32U);
    0xB4 F32ConvertI64S "f32.convert_i64_s" Unary(UnOp::F32ConvertI64S);
    0xB5 F32ConvertI64U "f32.convert_i64_u" Unary(UnOp::F32ConvertI64U);
    0xB6 F32DemoteF64 "f32.demote_f64" Unary(UnOp::F32DemoteF64);
    0xB7 F64ConvertI32S "f64.convert_i32_s" Unary(UnOp::F64ConvertI32S);
    0xB8 F64ConvertI32U "f64.convert_i32_u" Unary(UnOp::F64ConvertI32U);
    0xB9 F64ConvertI64S "f64.convert_i64_s" Unary(UnOp::F64ConvertI64S);
    0xBA F64ConvertI64U "f64.convert_i64_u" Unary(UnOp::F64ConvertI64U);
    0xBB F64PromoteF32 "f64.promote_f32" Unary(UnOp::F64PromoteF32);
    0xBC I32ReinterpretF32 "i32.reinterpret_f32" Unary(UnOp::I32ReinterpretF32);
    0xBD I64ReinterpretF64 "i64.reinterpret_f64" Unary(UnOp::I64ReinterpretF64);
    0xBE F32ReinterpretI32 "f32.reinterpret_i32" Unary(UnOp::F32ReinterpretI32);
    0xBF F64ReinterpretI64 "f64.reinterpret_i64" Unary(UnOp::F64ReinterpretI64);

    0xC0 I32Extend8S "i32.extend8_s" Unary(UnOp::I32Extend8S);
    0xC1 I32Extend16S "i32.extend16_s" Unary(UnOp::I32Extend16S);
    0xC2 I64Extend8S "i64.extend8_s" Unary(UnOp::I64Extend8S);
    0xC3 I64Extend16S "i64.extend16_s" Unary(UnOp::I64Extend16S);
    0xC4 I64Extend32S "i64.extend32_s" Unary(UnOp::I64Extend32S);

    0xFC00 I32TruncSatF32S "i32.trunc_sat_f32_s" Unary(UnOp::I32TruncSatF32S);
    0xFC01 I32TruncSatF32U "i32.trunc_sat_f32_u" Unary(UnOp::I32TruncSatF32U);
    0xFC02 I32TruncSatF64S "i32.trunc_sat_f64_s" Unary(UnOp::I32TruncSatF64S);
    0xFC03 I32TruncSatF64U "i32.trunc_sat_f64_u" Unary(UnOp::I32TruncSatF64U);
    0xFC04 I64TruncSatF32S "i64.trunc_sat_f32_s" Unary(UnOp::I64TruncSatF32S);
    0xFC05 I64TruncSatF32U "i64.trunc_sat_f32_u" Unary(UnOp::I64TruncSatF32U);
    0xFC06 I64TruncSatF64S "i64.trunc_sat_f64_s" Unary(UnOp::I64TruncSatF64S);
    0xFC07 I64TruncSatF64U "i64.trunc_sat_f64_u" Unary(UnOp::I64TruncSatF64U);
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
