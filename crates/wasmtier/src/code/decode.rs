//! Single-pass decoder and validator: raw bytecode in, icode out.
//!
//! The decoder abstractly interprets the body over a stack of operand types
//! and a stack of open blocks. After `unreachable`, `br`, `br_table` or
//! `return` the enclosing block becomes polymorphic: pops below its entry
//! height yield an unknown type instead of failing, until the block closes.

use tracing::instrument;

use super::error::ValidationError;
use super::opcode::{OpKind, Opcode};
use super::reader::Reader;
use super::scope::Scope;
use super::{Body, BlockType, Immediate, Instruction, Labels, Metrics};
use crate::types::{FuncType, ValType};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Known(ValType),
    Unknown,
}

struct Block<'s> {
    opcode: Opcode,
    ip: usize,
    else_ip: Option<usize>,
    params: &'s [ValType],
    results: &'s [ValType],
    height: usize,
    unreachable: bool,
}

struct Decoder<'s, 'b> {
    scope: &'s dyn Scope,
    reader: Reader<'b>,
    stack: Vec<Operand>,
    blocks: Vec<Block<'s>>,
    instructions: Vec<Instruction>,
    metrics: Metrics,
}

/// Decode and type-check one function body.
///
/// `bytes` holds the operator bytes only, up to and including the final
/// `end`; locals are resolved through `scope`.
#[instrument(skip_all, name = "decode", fields(len = bytes.len()))]
pub(crate) fn decode<'s>(
    bytes: &[u8],
    signature: &'s FuncType,
    scope: &'s dyn Scope,
) -> Result<Body, ValidationError> {
    let mut decoder = Decoder {
        scope,
        reader: Reader::new(bytes),
        stack: Vec::new(),
        blocks: Vec::new(),
        instructions: Vec::new(),
        metrics: Metrics::default(),
    };
    decoder.push_block(Opcode::Block, &[], signature.results());
    while !decoder.blocks.is_empty() {
        decoder.step()?;
    }
    if !decoder.reader.is_empty() {
        return Err(ValidationError::UnexpectedEnd);
    }
    tracing::trace!(
        instructions = decoder.instructions.len(),
        metrics = ?decoder.metrics,
        "decoded function body"
    );
    Ok(Body {
        instructions: decoder.instructions,
        metrics: decoder.metrics,
    })
}

impl<'s, 'b> Decoder<'s, 'b> {
    fn push(&mut self, operand: Operand) {
        self.stack.push(operand);
        self.metrics.max_stack_depth = self.metrics.max_stack_depth.max(self.stack.len() as u32);
    }

    fn push_types(&mut self, types: &[ValType]) {
        for &ty in types {
            self.push(Operand::Known(ty));
        }
    }

    fn pop(&mut self) -> Result<Operand, ValidationError> {
        let block = self.blocks.last().ok_or(ValidationError::LabelStackUnderflow)?;
        if self.stack.len() == block.height {
            if block.unreachable {
                return Ok(Operand::Unknown);
            }
            return Err(ValidationError::StackUnderflow);
        }
        self.stack.pop().ok_or(ValidationError::StackUnderflow)
    }

    fn pop_expect(&mut self, expected: ValType) -> Result<Operand, ValidationError> {
        match self.pop()? {
            Operand::Known(actual) if actual != expected => {
                Err(ValidationError::TypeMismatch { expected, actual })
            }
            operand => Ok(operand),
        }
    }

    fn pop_types(&mut self, types: &[ValType]) -> Result<(), ValidationError> {
        for &ty in types.iter().rev() {
            self.pop_expect(ty)?;
        }
        Ok(())
    }

    fn push_block(&mut self, opcode: Opcode, params: &'s [ValType], results: &'s [ValType]) {
        self.blocks.push(Block {
            opcode,
            ip: self.instructions.len(),
            else_ip: None,
            params,
            results,
            height: self.stack.len(),
            unreachable: false,
        });
        self.push_types(params);
        self.metrics.label_count += 1;
        self.metrics.max_nesting = self.metrics.max_nesting.max(self.blocks.len() as u32);
    }

    fn pop_block(&mut self) -> Result<Block<'s>, ValidationError> {
        let results = self
            .blocks
            .last()
            .ok_or(ValidationError::LabelStackUnderflow)?
            .results;
        self.pop_types(results)?;
        let block = self.blocks.pop().ok_or(ValidationError::LabelStackUnderflow)?;
        if self.stack.len() != block.height {
            return Err(ValidationError::UnbalancedStack);
        }
        Ok(block)
    }

    /// Operand types a branch to `depth` must carry.
    fn label_types(&self, depth: u32) -> Result<&'s [ValType], ValidationError> {
        let index = self
            .blocks
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or(ValidationError::InvalidLabel(depth))?;
        let block = &self.blocks[index];
        Ok(if block.opcode == Opcode::Loop {
            block.params
        } else {
            block.results
        })
    }

    fn set_unreachable(&mut self) -> Result<(), ValidationError> {
        let block = self
            .blocks
            .last_mut()
            .ok_or(ValidationError::LabelStackUnderflow)?;
        self.stack.truncate(block.height);
        block.unreachable = true;
        Ok(())
    }

    fn read_block_type(&mut self) -> Result<BlockType, ValidationError> {
        let byte = self.reader.peek_u8()?;
        if byte == 0x40 {
            self.reader.read_u8()?;
            return Ok(BlockType::Empty);
        }
        if let Some(ty) = ValType::from_byte(byte) {
            self.reader.read_u8()?;
            return Ok(BlockType::Value(ty));
        }
        let index = self.reader.read_var_s33()?;
        let index = u32::try_from(index).map_err(|_| ValidationError::InvalidBlockType)?;
        if self.scope.func_type(index).is_none() {
            return Err(ValidationError::UnknownType(index));
        }
        Ok(BlockType::Func(index))
    }

    fn read_opcode(&mut self) -> Result<Opcode, ValidationError> {
        let byte = self.reader.read_u8()?;
        let code = if byte == 0xFC {
            let sub = self.reader.read_var_u32()?;
            0xFC00 | sub.min(0xFF) as u16
        } else {
            byte as u16
        };
        Opcode::from_code(code).ok_or(ValidationError::UnsupportedOpcode(code))
    }

    fn require_memory(&self, index: u32) -> Result<(), ValidationError> {
        if self.scope.has_memory(index) {
            Ok(())
        } else {
            Err(ValidationError::UnknownMemory(index))
        }
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn step(&mut self) -> Result<(), ValidationError> {
        let opcode = self.read_opcode()?;
        let ip = self.instructions.len();

        match opcode.kind() {
            OpKind::Unary(op) => {
                let (input, output) = op.signature();
                self.pop_expect(input)?;
                self.push(Operand::Known(output));
                self.emit(Instruction::new(opcode, Immediate::None));
                return Ok(());
            }
            OpKind::Binary(op) => {
                let ty = op.operand_type();
                self.pop_expect(ty)?;
                self.pop_expect(ty)?;
                self.push(Operand::Known(op.result_type()));
                self.emit(Instruction::new(opcode, Immediate::None));
                return Ok(());
            }
            OpKind::Load(op) => {
                let align = self.reader.read_var_u32()?;
                let offset = self.reader.read_var_u32()?;
                self.require_memory(0)?;
                self.pop_expect(ValType::I32)?;
                self.push(Operand::Known(op.result_type()));
                self.emit(Instruction::new(opcode, Immediate::MemArg { align, offset }));
                return Ok(());
            }
            OpKind::Store(op) => {
                let align = self.reader.read_var_u32()?;
                let offset = self.reader.read_var_u32()?;
                self.require_memory(0)?;
                self.pop_expect(op.value_type())?;
                self.pop_expect(ValType::I32)?;
                self.emit(Instruction::new(opcode, Immediate::MemArg { align, offset }));
                return Ok(());
            }
            OpKind::Special => {}
        }

        let mut instruction = Instruction::new(opcode, Immediate::None);
        match opcode {
            Opcode::Unreachable => self.set_unreachable()?,
            Opcode::Nop => {}

            Opcode::Block | Opcode::Loop | Opcode::If => {
                let ty = self.read_block_type()?;
                let (params, results) = ty
                    .signature(self.scope)
                    .ok_or(ValidationError::InvalidBlockType)?;
                if opcode == Opcode::If {
                    self.pop_expect(ValType::I32)?;
                }
                self.pop_types(params)?;
                instruction.immediate = Immediate::Block {
                    ty,
                    stack_height: self.stack.len() as u32,
                    params: params.len() as u32,
                    results: results.len() as u32,
                };
                instruction.labels = match opcode {
                    Opcode::Loop => {
                        self.metrics.has_loops = true;
                        Labels::from_slice(&[ip as u32])
                    }
                    Opcode::If => Labels::from_slice(&[0, 0]),
                    _ => Labels::from_slice(&[0]),
                };
                self.push_block(opcode, params, results);
            }

            Opcode::Else => {
                let block = self.pop_block()?;
                if block.opcode != Opcode::If || block.else_ip.is_some() {
                    return Err(ValidationError::InvalidNesting);
                }
                self.instructions[block.ip].labels[1] = ip as u32;
                instruction.labels = Labels::from_slice(&[0]);
                let params = block.params;
                self.blocks.push(Block {
                    else_ip: Some(ip),
                    unreachable: false,
                    ..block
                });
                self.push_types(params);
            }

            Opcode::End => {
                let block = self.pop_block()?;
                // The missing else arm passes the params through unchanged.
                if block.opcode == Opcode::If
                    && block.else_ip.is_none()
                    && block.params != block.results
                {
                    return Err(ValidationError::UnbalancedStack);
                }
                if !self.blocks.is_empty() {
                    let continuation = ip as u32 + 1;
                    if block.opcode != Opcode::Loop {
                        self.instructions[block.ip].labels[0] = continuation;
                    }
                    if let Some(else_ip) = block.else_ip {
                        self.instructions[else_ip].labels[0] = continuation;
                    }
                }
                self.push_types(block.results);
            }

            Opcode::Br => {
                let depth = self.reader.read_var_u32()?;
                let types = self.label_types(depth)?;
                self.pop_types(types)?;
                self.set_unreachable()?;
                instruction.immediate = Immediate::Label(depth);
            }

            Opcode::BrIf => {
                let depth = self.reader.read_var_u32()?;
                self.pop_expect(ValType::I32)?;
                let types = self.label_types(depth)?;
                self.pop_types(types)?;
                self.push_types(types);
                instruction.immediate = Immediate::Label(depth);
            }

            Opcode::BrTable => {
                let count = self.reader.read_var_u32()?;
                let mut targets = Labels::new();
                for _ in 0..count {
                    targets.push(self.reader.read_var_u32()?);
                }
                let default = self.reader.read_var_u32()?;
                self.pop_expect(ValType::I32)?;
                let expected = self.label_types(default)?;
                for &target in &targets {
                    if self.label_types(target)? != expected {
                        return Err(ValidationError::BrTableArityMismatch);
                    }
                }
                self.pop_types(expected)?;
                self.set_unreachable()?;
                instruction.immediate = Immediate::Label(default);
                instruction.labels = targets;
            }

            Opcode::Return => {
                let results = self.blocks[0].results;
                self.pop_types(results)?;
                self.set_unreachable()?;
            }

            Opcode::Call => {
                let index = self.reader.read_var_u32()?;
                let sig = self
                    .scope
                    .function_signature(index)
                    .ok_or(ValidationError::UnknownFunction(index))?;
                self.pop_types(sig.params())?;
                self.push_types(sig.results());
                instruction.immediate = Immediate::Index(index);
            }

            Opcode::CallIndirect => {
                let type_index = self.reader.read_var_u32()?;
                let table = self.reader.read_var_u32()?;
                if !self.scope.has_table(table) {
                    return Err(ValidationError::UnknownTable(table));
                }
                let sig = self
                    .scope
                    .func_type(type_index)
                    .ok_or(ValidationError::UnknownType(type_index))?;
                self.pop_expect(ValType::I32)?;
                self.pop_types(sig.params())?;
                self.push_types(sig.results());
                instruction.immediate = Immediate::Index(type_index);
            }

            Opcode::Drop => {
                self.pop()?;
            }

            Opcode::Select => {
                self.pop_expect(ValType::I32)?;
                let second = self.pop()?;
                let first = self.pop()?;
                let result = match (first, second) {
                    (Operand::Known(a), Operand::Known(b)) if a != b => {
                        return Err(ValidationError::TypeMismatch {
                            expected: a,
                            actual: b,
                        })
                    }
                    (Operand::Unknown, other) => other,
                    (known, _) => known,
                };
                self.push(result);
            }

            Opcode::LocalGet | Opcode::LocalSet | Opcode::LocalTee => {
                let index = self.reader.read_var_u32()?;
                let ty = self
                    .scope
                    .local_type(index)
                    .ok_or(ValidationError::UnknownLocal(index))?;
                match opcode {
                    Opcode::LocalGet => self.push(Operand::Known(ty)),
                    Opcode::LocalSet => {
                        self.pop_expect(ty)?;
                    }
                    _ => {
                        self.pop_expect(ty)?;
                        self.push(Operand::Known(ty));
                    }
                }
                instruction.immediate = Immediate::Index(index);
            }

            Opcode::GlobalGet | Opcode::GlobalSet => {
                let index = self.reader.read_var_u32()?;
                let global = self
                    .scope
                    .global_type(index)
                    .ok_or(ValidationError::UnknownGlobal(index))?;
                if opcode == Opcode::GlobalGet {
                    self.push(Operand::Known(global.content));
                } else {
                    if !global.mutable {
                        return Err(ValidationError::ImmutableGlobal(index));
                    }
                    self.pop_expect(global.content)?;
                }
                instruction.immediate = Immediate::Index(index);
            }

            Opcode::MemorySize | Opcode::MemoryGrow => {
                let memory = self.reader.read_var_u32()?;
                self.require_memory(memory)?;
                if opcode == Opcode::MemoryGrow {
                    self.pop_expect(ValType::I32)?;
                }
                self.push(Operand::Known(ValType::I32));
            }

            Opcode::I32Const => {
                instruction.immediate = Immediate::I32(self.reader.read_var_i32()?);
                self.push(Operand::Known(ValType::I32));
            }
            Opcode::I64Const => {
                instruction.immediate = Immediate::I64(self.reader.read_var_i64()?);
                self.push(Operand::Known(ValType::I64));
            }
            Opcode::F32Const => {
                instruction.immediate = Immediate::F32(self.reader.read_f32_bits()?);
                self.push(Operand::Known(ValType::F32));
            }
            Opcode::F64Const => {
                instruction.immediate = Immediate::F64(self.reader.read_f64_bits()?);
                self.push(Operand::Known(ValType::F64));
            }

            other => return Err(ValidationError::UnsupportedOpcode(other as u16)),
        }
        self.emit(instruction);
        Ok(())
    }
}
