//! icode to fcode translation.
//!
//! One forward pass keeps an abstract operand stack. An entry is a pending
//! constant, a pending read of a local, or a value resident in its home slot
//! (`num_locals + position`). Pending entries are only written to their home
//! slot when something needs them there: a block boundary, a branch, a call,
//! or a `local.set` of the local they read.

use std::rc::Rc;

use tracing::instrument;

use super::{Cond, FInstr, Fcode, Label, Operand, Slot};
use crate::code::{Body, Instruction, OpKind, Opcode, Scope};
use crate::types::FuncType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Const(u64),
    Local(Slot),
    /// Produced into the home slot by the instruction at `ip`.
    Frame { materialized: bool },
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: Value,
    home: Slot,
    ip: usize,
}

struct OpenBlock {
    opcode: Opcode,
    label: usize,
    params: u32,
    results: u32,
    unreachable: bool,
    /// The block was opened in dead code; nothing inside it is emitted.
    dead: bool,
}

struct Compiler<'a> {
    scope: &'a dyn Scope,
    num_locals: u32,
    stack: Vec<Entry>,
    blocks: Vec<OpenBlock>,
    code: Vec<FInstr>,
    labels: Vec<Label>,
    switch_tables: Vec<Box<[u32]>>,
}

/// Compile a validated body. Never fails: anything the decoder accepted
/// has a translation.
#[instrument(skip_all, name = "compile", fields(icode = body.instructions.len()))]
pub(crate) fn compile(body: Rc<Body>, ty: &FuncType, num_locals: usize, scope: &dyn Scope) -> Fcode {
    let num_results = ty.results().len() as u32;
    let mut c = Compiler {
        scope,
        num_locals: num_locals as u32,
        stack: Vec::with_capacity(body.metrics.max_stack_depth as usize),
        blocks: Vec::with_capacity(body.metrics.max_nesting as usize),
        code: Vec::with_capacity(body.instructions.len()),
        labels: Vec::with_capacity(body.metrics.label_count as usize + 1),
        switch_tables: Vec::new(),
    };
    c.labels.push(Label {
        continuation: 0,
        else_ip: None,
        stack_height: 0,
        arity: num_results,
    });
    c.blocks.push(OpenBlock {
        opcode: Opcode::Block,
        label: 0,
        params: 0,
        results: num_results,
        unreachable: false,
        dead: false,
    });

    let last = body.instructions.len().saturating_sub(1);
    for (ip, instruction) in body.instructions.iter().enumerate() {
        if ip == last {
            c.finish();
        } else {
            c.instruction(instruction);
        }
    }

    Fcode {
        instructions: c.code,
        labels: c.labels,
        switch_tables: c.switch_tables,
        num_locals: num_locals as u32,
        num_results,
        body,
    }
}

impl Compiler<'_> {
    fn home(&self, position: usize) -> Slot {
        self.num_locals + position as Slot
    }

    fn emit(&mut self, instr: FInstr) {
        self.code.push(instr);
    }

    fn current(&self) -> &OpenBlock {
        &self.blocks[self.blocks.len() - 1]
    }

    fn block_height(&self) -> usize {
        self.labels[self.current().label].stack_height as usize
    }

    fn push(&mut self, value: Value) {
        let home = self.home(self.stack.len());
        self.stack.push(Entry {
            value,
            home,
            ip: self.code.len(),
        });
    }

    /// Push the result of the instruction about to be emitted.
    fn push_result(&mut self) -> Slot {
        let home = self.home(self.stack.len());
        self.stack.push(Entry {
            value: Value::Frame { materialized: false },
            home,
            ip: self.code.len(),
        });
        home
    }

    fn push_materialized(&mut self, count: u32) {
        for _ in 0..count {
            self.push(Value::Frame { materialized: true });
        }
    }

    fn pop(&mut self) -> Entry {
        match self.stack.pop() {
            Some(entry) => entry,
            None => unreachable!("validated body underflowed the operand stack"),
        }
    }

    /// A slot holding the entry's value, writing a constant to its home.
    fn addressable(&mut self, entry: Entry) -> Slot {
        match entry.value {
            Value::Const(value) => {
                self.emit(FInstr::Const {
                    dest: entry.home,
                    value,
                });
                entry.home
            }
            Value::Local(local) => local,
            Value::Frame { .. } => entry.home,
        }
    }

    fn operand(&mut self, entry: Entry) -> Operand {
        match entry.value {
            Value::Const(value) => Operand::Imm(value),
            _ => Operand::Slot(self.addressable(entry)),
        }
    }

    fn materialize(&mut self, position: usize) {
        let entry = self.stack[position];
        match entry.value {
            Value::Const(value) => self.emit(FInstr::Const {
                dest: entry.home,
                value,
            }),
            Value::Local(src) => self.emit(FInstr::Copy {
                dest: entry.home,
                src,
            }),
            Value::Frame { .. } => {}
        }
        self.stack[position].value = Value::Frame { materialized: true };
    }

    fn materialize_from(&mut self, position: usize) {
        for position in position..self.stack.len() {
            self.materialize(position);
        }
    }

    fn materialize_top(&mut self, count: u32) {
        let from = self.stack.len() - count as usize;
        self.materialize_from(from);
    }

    fn pop_materialized(&mut self, count: u32) {
        self.materialize_top(count);
        self.stack.truncate(self.stack.len() - count as usize);
    }

    /// Code after an unconditional transfer is dead until its block ends.
    fn set_unreachable(&mut self) {
        let height = self.block_height();
        self.stack.truncate(height);
        if let Some(block) = self.blocks.last_mut() {
            block.unreachable = true;
        }
    }

    fn target(&self, depth: u32) -> usize {
        self.blocks[self.blocks.len() - 1 - depth as usize].label
    }

    fn instruction(&mut self, instruction: &Instruction) {
        let skipping = self.current().unreachable;
        if skipping {
            match instruction.opcode {
                Opcode::Block | Opcode::Loop | Opcode::If => {
                    self.blocks.push(OpenBlock {
                        opcode: instruction.opcode,
                        label: self.current().label,
                        params: 0,
                        results: 0,
                        unreachable: true,
                        dead: true,
                    });
                }
                Opcode::Else => self.else_(),
                Opcode::End => self.end(),
                _ => {}
            }
            return;
        }

        match instruction.opcode.kind() {
            OpKind::Unary(op) => {
                let src = self.pop();
                let src = self.addressable(src);
                let dest = self.push_result();
                self.emit(FInstr::Unary { op, dest, src });
                return;
            }
            OpKind::Binary(op) => {
                let mut rhs = self.pop();
                let mut lhs = self.pop();
                let lhs_const = matches!(lhs.value, Value::Const(_));
                let rhs_const = matches!(rhs.value, Value::Const(_));
                if op.is_commutative() && lhs_const && !rhs_const {
                    std::mem::swap(&mut lhs, &mut rhs);
                }
                let lhs = self.addressable(lhs);
                let rhs = self.operand(rhs);
                let dest = self.push_result();
                self.emit(FInstr::Binary { op, dest, lhs, rhs });
                return;
            }
            OpKind::Load(op) => {
                let addr = self.pop();
                let addr = self.operand(addr);
                let dest = self.push_result();
                self.emit(FInstr::Load {
                    op,
                    dest,
                    addr,
                    offset: instruction.offset(),
                });
                return;
            }
            OpKind::Store(op) => {
                let value = self.pop();
                let addr = self.pop();
                let value = self.operand(value);
                let addr = self.operand(addr);
                self.emit(FInstr::Store {
                    op,
                    addr,
                    value,
                    offset: instruction.offset(),
                });
                return;
            }
            OpKind::Special => {}
        }

        match instruction.opcode {
            Opcode::Unreachable => {
                self.emit(FInstr::Unreachable);
                self.set_unreachable();
            }
            Opcode::Nop => {}
            Opcode::Block | Opcode::Loop => {
                self.block(instruction);
            }
            Opcode::If => {
                let cond = self.pop();
                let cond = self.addressable(cond);
                let label = self.block(instruction);
                self.emit(FInstr::If {
                    cond,
                    label: label as u32,
                });
            }
            Opcode::Else => self.else_(),
            Opcode::End => self.end(),
            Opcode::Br => self.br(instruction.label()),
            Opcode::BrIf => self.br_if(instruction.label()),
            Opcode::BrTable => self.br_table(instruction),
            Opcode::Return => {
                let stack_height = self.stack.len() as u32;
                self.pop_materialized(self.labels[0].arity);
                self.emit(FInstr::Return { stack_height });
                self.set_unreachable();
            }
            Opcode::Call => {
                let func = instruction.index();
                let (params, results) = match self.scope.function_signature(func) {
                    Some(sig) => (sig.params().len() as u32, sig.results().len() as u32),
                    None => unreachable!("validated call to unknown function {func}"),
                };
                self.pop_materialized(params);
                let base = self.home(self.stack.len());
                self.emit(FInstr::Call { func, base });
                self.push_materialized(results);
            }
            Opcode::CallIndirect => {
                let type_index = instruction.index();
                let (params, results) = match self.scope.func_type(type_index) {
                    Some(sig) => (sig.params().len() as u32, sig.results().len() as u32),
                    None => unreachable!("validated call_indirect of unknown type {type_index}"),
                };
                let index = self.pop();
                let index = self.addressable(index);
                self.pop_materialized(params);
                let base = self.home(self.stack.len());
                self.emit(FInstr::CallIndirect {
                    type_index,
                    index,
                    base,
                });
                self.push_materialized(results);
            }
            Opcode::Drop => {
                self.pop();
            }
            Opcode::Select => {
                let cond = self.pop();
                let if_false = self.pop();
                let if_true = self.pop();
                let cond = self.addressable(cond);
                let if_false = self.addressable(if_false);
                let if_true = self.addressable(if_true);
                let dest = self.push_result();
                self.emit(FInstr::Select {
                    dest,
                    cond,
                    if_true,
                    if_false,
                });
            }
            Opcode::LocalGet => self.push(Value::Local(instruction.index())),
            Opcode::LocalSet => self.local_set(instruction.index()),
            Opcode::LocalTee => {
                let local = instruction.index();
                self.local_set(local);
                self.push(Value::Local(local));
            }
            Opcode::GlobalGet => {
                let dest = self.push_result();
                self.emit(FInstr::GlobalGet {
                    dest,
                    global: instruction.index(),
                });
            }
            Opcode::GlobalSet => {
                let src = self.pop();
                let src = self.operand(src);
                self.emit(FInstr::GlobalSet {
                    global: instruction.index(),
                    src,
                });
            }
            Opcode::MemorySize => {
                let dest = self.push_result();
                self.emit(FInstr::MemorySize { dest });
            }
            Opcode::MemoryGrow => {
                let delta = self.pop();
                let delta = self.addressable(delta);
                let dest = self.push_result();
                self.emit(FInstr::MemoryGrow { dest, delta });
            }
            Opcode::I32Const | Opcode::I64Const | Opcode::F32Const | Opcode::F64Const => {
                self.push(Value::Const(instruction.constant()));
            }
            other => unreachable!("{other} has no special lowering"),
        }
    }

    /// Open `block`, `loop` or `if`; the stack below the block's params is
    /// forced into its slots first so every path through the block sees
    /// the same frame.
    fn block(&mut self, instruction: &Instruction) -> usize {
        let (_, params, results) = instruction.block();
        let parent_height = self.block_height();
        self.materialize_from(parent_height);

        let is_loop = instruction.opcode == Opcode::Loop;
        let label = self.labels.len();
        self.labels.push(Label {
            continuation: if is_loop { self.code.len() as u32 } else { 0 },
            else_ip: None,
            stack_height: (self.stack.len() - params as usize) as u32,
            arity: if is_loop { params } else { results },
        });
        self.blocks.push(OpenBlock {
            opcode: instruction.opcode,
            label,
            params,
            results,
            unreachable: false,
            dead: false,
        });
        label
    }

    fn else_(&mut self) {
        let block = &self.blocks[self.blocks.len() - 1];
        if block.dead {
            return;
        }
        let (label, params, results, unreachable) =
            (block.label, block.params, block.results, block.unreachable);
        if !unreachable {
            self.pop_materialized(results);
        }
        self.emit(FInstr::Else {
            label: label as u32,
        });
        let height = self.labels[label].stack_height as usize;
        self.stack.truncate(height);
        self.push_materialized(params);
        self.labels[label].else_ip = Some(self.code.len() as u32);
        if let Some(block) = self.blocks.last_mut() {
            block.unreachable = false;
        }
    }

    fn end(&mut self) {
        let Some(block) = self.blocks.pop() else {
            unreachable!("validated body closed more blocks than it opened");
        };
        if block.dead {
            return;
        }
        let label = &self.labels[block.label];
        let height = label.stack_height as usize;
        if block.unreachable {
            self.stack.truncate(height);
            self.push_materialized(block.results);
        } else {
            self.materialize_top(block.results);
        }
        if block.opcode != Opcode::Loop {
            self.labels[block.label].continuation = self.code.len() as u32;
        }
    }

    /// The function's final `end`.
    fn finish(&mut self) {
        let arity = self.labels[0].arity;
        if self.current().unreachable {
            self.stack.truncate(0);
            self.push_materialized(arity);
        } else {
            self.materialize_top(arity);
        }
        self.blocks.clear();
        self.labels[0].continuation = self.code.len() as u32;
        self.emit(FInstr::Return {
            stack_height: self.stack.len() as u32,
        });
    }

    /// Whether a branch to `label` finds its values already in place.
    fn in_place(&self, label: usize) -> bool {
        let label = &self.labels[label];
        self.stack.len() - label.arity as usize == label.stack_height as usize
    }

    fn br(&mut self, depth: u32) {
        let label = self.target(depth);
        let stack_height = self.stack.len() as u32;
        let in_place = self.in_place(label);
        self.pop_materialized(self.labels[label].arity);
        let label = label as u32;
        if in_place {
            self.emit(FInstr::Br { label });
        } else {
            self.emit(FInstr::BrMove {
                label,
                stack_height,
            });
        }
        self.set_unreachable();
    }

    fn br_if(&mut self, depth: u32) {
        let cond = self.pop();
        let label = self.target(depth);
        let arity = self.labels[label].arity;
        let stack_height = self.stack.len() as u32;
        let in_place = self.in_place(label);
        let label = label as u32;

        if in_place {
            if let Some(cond) = self.fuse(cond) {
                self.materialize_top(arity);
                self.emit(FInstr::BrIfCmp { cond, label });
                return;
            }
        }

        let cond = self.addressable(cond);
        self.materialize_top(arity);
        if in_place {
            self.emit(FInstr::BrIf { cond, label });
        } else {
            self.emit(FInstr::BrIfMove {
                cond,
                label,
                stack_height,
            });
        }
    }

    /// Take back the comparison that just produced `cond`, if it did.
    fn fuse(&mut self, cond: Entry) -> Option<Cond> {
        if cond.value != (Value::Frame { materialized: false }) || cond.ip + 1 != self.code.len() {
            return None;
        }
        let fused = match *self.code.last()? {
            FInstr::Unary { op, dest, src } if dest == cond.home && op.is_eqz() => {
                Cond::Eqz(op, src)
            }
            FInstr::Binary { op, dest, lhs, rhs } if dest == cond.home && op.is_compare() => {
                Cond::Compare(op, lhs, rhs)
            }
            _ => return None,
        };
        self.code.pop();
        Some(fused)
    }

    fn br_table(&mut self, instruction: &Instruction) {
        let index = self.pop();
        let index = self.addressable(index);
        let stack_height = self.stack.len() as u32;
        let default = self.target(instruction.label());
        let table: Box<[u32]> = instruction
            .labels
            .iter()
            .map(|&depth| self.target(depth) as u32)
            .chain(std::iter::once(default as u32))
            .collect();
        self.pop_materialized(self.labels[default].arity);
        let table_index = self.switch_tables.len() as u32;
        self.switch_tables.push(table);
        self.emit(FInstr::BrTable {
            index,
            table: table_index,
            stack_height,
        });
        self.set_unreachable();
    }

    fn local_set(&mut self, local: Slot) {
        // Pending reads of the old value must land before it is overwritten.
        let height = self.block_height();
        for position in height..self.stack.len() {
            if self.stack[position].value == Value::Local(local) {
                self.materialize(position);
            }
        }

        let entry = self.pop();
        match entry.value {
            Value::Const(value) => self.emit(FInstr::Const { dest: local, value }),
            Value::Local(src) => self.emit(FInstr::Copy { dest: local, src }),
            Value::Frame { materialized } => {
                if !materialized && entry.ip + 1 == self.code.len() {
                    if let Some(dest) = self.code.last_mut().and_then(FInstr::dest_mut) {
                        if *dest == entry.home {
                            *dest = local;
                            return;
                        }
                    }
                }
                self.emit(FInstr::Copy {
                    dest: local,
                    src: entry.home,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests;
