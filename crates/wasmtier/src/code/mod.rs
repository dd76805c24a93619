//! Validated instruction stream ("icode") and the decoder that produces it.

mod decode;
mod error;
mod opcode;
mod ops;
mod reader;
mod scope;

use std::fmt;

use smallvec::SmallVec;

use crate::types::{FuncType, ValType};

pub(crate) use decode::decode;
pub use error::ValidationError;
pub use opcode::{OpKind, Opcode};
pub use ops::{BinOp, LoadOp, StoreOp, UnOp};
pub use scope::Scope;

/// Label operands of a control instruction.
///
/// - `block`, `else`: `[continuation]`
/// - `loop`: `[ip of the loop]`
/// - `if`: `[continuation, ip of else or 0]`
/// - `br_table`: one label depth per table entry
pub type Labels = SmallVec<[u32; 2]>;

/// The declared signature of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
    Func(u32),
}

impl BlockType {
    /// `(params, results)` of the block, if the type index resolves.
    pub fn signature<'s>(self, scope: &'s dyn Scope) -> Option<(&'s [ValType], &'s [ValType])> {
        match self {
            BlockType::Empty => Some((&[], &[])),
            BlockType::Value(ty) => Some((&[], value_slice(ty))),
            BlockType::Func(index) => scope
                .func_type(index)
                .map(|ty: &FuncType| (ty.params(), ty.results())),
        }
    }
}

fn value_slice(ty: ValType) -> &'static [ValType] {
    match ty {
        ValType::I32 => &[ValType::I32],
        ValType::I64 => &[ValType::I64],
        ValType::F32 => &[ValType::F32],
        ValType::F64 => &[ValType::F64],
    }
}

/// Payload of an instruction, tagged by opcode category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    None,
    /// `block`, `loop`, `if`: operand stack height below the block's
    /// params, and the param/result counts.
    Block {
        ty: BlockType,
        stack_height: u32,
        params: u32,
        results: u32,
    },
    /// Relative label depth of `br` and `br_if`, or the default of `br_table`.
    Label(u32),
    /// Local, global, function or type index.
    Index(u32),
    MemArg {
        align: u32,
        offset: u32,
    },
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub immediate: Immediate,
    pub labels: Labels,
}

impl Instruction {
    pub(crate) fn new(opcode: Opcode, immediate: Immediate) -> Self {
        Instruction {
            opcode,
            immediate,
            labels: Labels::new(),
        }
    }

    pub fn index(&self) -> u32 {
        match self.immediate {
            Immediate::Index(index) => index,
            ref other => unreachable!("{} carries {other:?}, not an index", self.opcode),
        }
    }

    pub fn label(&self) -> u32 {
        match self.immediate {
            Immediate::Label(label) => label,
            ref other => unreachable!("{} carries {other:?}, not a label", self.opcode),
        }
    }

    pub fn offset(&self) -> u32 {
        match self.immediate {
            Immediate::MemArg { offset, .. } => offset,
            ref other => unreachable!("{} carries {other:?}, not a memarg", self.opcode),
        }
    }

    /// `(stack height, params, results)` of a block-opening instruction.
    pub fn block(&self) -> (u32, u32, u32) {
        match self.immediate {
            Immediate::Block {
                stack_height,
                params,
                results,
                ..
            } => (stack_height, params, results),
            ref other => unreachable!("{} carries {other:?}, not a block type", self.opcode),
        }
    }

    /// The constant of a `*.const` instruction as a raw slot value.
    pub fn constant(&self) -> u64 {
        match self.immediate {
            Immediate::I32(v) => v as u32 as u64,
            Immediate::I64(v) => v as u64,
            Immediate::F32(bits) => bits as u64,
            Immediate::F64(bits) => bits,
            ref other => unreachable!("{} carries {other:?}, not a constant", self.opcode),
        }
    }

    pub fn continuation(&self) -> u32 {
        self.labels[0]
    }

    pub fn else_ip(&self) -> u32 {
        self.labels[1]
    }

    /// Types popped and pushed by this instruction. `None` stands for an
    /// operand whose type depends on what is below it (`drop`, `select`).
    ///
    /// Control instructions other than calls report no operands.
    pub fn types(&self, scope: &dyn Scope) -> (Vec<Option<ValType>>, Vec<Option<ValType>>) {
        use ValType::*;
        let known = |types: &[ValType]| types.iter().copied().map(Some).collect::<Vec<_>>();
        match self.opcode.kind() {
            OpKind::Unary(op) => {
                let (input, output) = op.signature();
                return (vec![Some(input)], vec![Some(output)]);
            }
            OpKind::Binary(op) => {
                let input = Some(op.operand_type());
                return (vec![input, input], vec![Some(op.result_type())]);
            }
            OpKind::Load(op) => return (vec![Some(I32)], vec![Some(op.result_type())]),
            OpKind::Store(op) => return (vec![Some(I32), Some(op.value_type())], vec![]),
            OpKind::Special => {}
        }
        match self.opcode {
            Opcode::If | Opcode::BrIf | Opcode::BrTable => (vec![Some(I32)], vec![]),
            Opcode::Call => match scope.function_signature(self.index()) {
                Some(sig) => (known(sig.params()), known(sig.results())),
                None => (vec![], vec![]),
            },
            Opcode::CallIndirect => match scope.func_type(self.index()) {
                Some(sig) => {
                    let mut params = known(sig.params());
                    params.push(Some(I32));
                    (params, known(sig.results()))
                }
                None => (vec![Some(I32)], vec![]),
            },
            Opcode::Drop => (vec![None], vec![]),
            Opcode::Select => (vec![None, None, Some(I32)], vec![None]),
            Opcode::LocalGet => (vec![], vec![scope.local_type(self.index())]),
            Opcode::LocalSet => (vec![scope.local_type(self.index())], vec![]),
            Opcode::LocalTee => {
                let ty = scope.local_type(self.index());
                (vec![ty], vec![ty])
            }
            Opcode::GlobalGet => (
                vec![],
                vec![scope.global_type(self.index()).map(|g| g.content)],
            ),
            Opcode::GlobalSet => (
                vec![scope.global_type(self.index()).map(|g| g.content)],
                vec![],
            ),
            Opcode::MemorySize => (vec![], vec![Some(I32)]),
            Opcode::MemoryGrow => (vec![Some(I32)], vec![Some(I32)]),
            Opcode::I32Const => (vec![], vec![Some(I32)]),
            Opcode::I64Const => (vec![], vec![Some(I64)]),
            Opcode::F32Const => (vec![], vec![Some(F32)]),
            Opcode::F64Const => (vec![], vec![Some(F64)]),
            _ => (vec![], vec![]),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match self.immediate {
            Immediate::None => {}
            Immediate::Block {
                stack_height,
                params,
                results,
                ..
            } => write!(f, " height={stack_height} [{params}]->[{results}]")?,
            Immediate::Label(l) | Immediate::Index(l) => write!(f, " {l}")?,
            Immediate::MemArg { align, offset } => write!(f, " offset={offset} align={align}")?,
            Immediate::I32(v) => write!(f, " {v}")?,
            Immediate::I64(v) => write!(f, " {v}")?,
            Immediate::F32(bits) => write!(f, " {}", f32::from_bits(bits))?,
            Immediate::F64(bits) => write!(f, " {}", f64::from_bits(bits))?,
        }
        if !self.labels.is_empty() {
            write!(f, " {:?}", self.labels.as_slice())?;
        }
        Ok(())
    }
}

/// Static facts gathered while decoding a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metrics {
    /// Deepest operand stack seen, in values.
    pub max_stack_depth: u32,
    /// Deepest block nesting, counting the function body itself.
    pub max_nesting: u32,
    pub label_count: u32,
    pub has_loops: bool,
}

/// A decoded function body.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub instructions: Vec<Instruction>,
    pub metrics: Metrics,
}
