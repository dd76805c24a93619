//! Tier 0: a stack machine over icode.
//!
//! Control instructions push a label (two slots: destination ip and
//! `height << 32 | arity`) onto the frame's blocks window. A branch to
//! depth `d` reads label `d` from the top, moves `arity` values down to the
//! label's height and resumes at its destination, discarding the labels
//! above it.

use super::trace::TraceEvent;
use super::{numerics, Executor, Frame, Trap, WasmFunction};
use crate::code::{Body, OpKind, Opcode, Scope};
use crate::error::Error;

pub(crate) struct Interpreter<'b> {
    body: &'b Body,
    frame: Frame,
    /// Next free operand slot, as an arena index.
    sp: usize,
    /// Next free label slot, as an arena index.
    bp: usize,
    num_results: usize,
}

impl<'b> Interpreter<'b> {
    fn new(ex: &mut Executor<'_, '_>, body: &'b Body, frame: Frame, num_results: usize) -> Self {
        let mut interp = Interpreter {
            body,
            frame,
            sp: frame.stack().start,
            bp: frame.blocks().start,
            num_results,
        };
        let last = body.instructions.len().saturating_sub(1);
        interp.push_label(ex, last, 0, num_results as u32);
        interp
    }

    /// Arena index where the results start once the body has finished.
    fn results(&self) -> usize {
        self.sp - self.num_results
    }

    #[inline]
    fn push(&mut self, ex: &mut Executor<'_, '_>, value: u64) {
        ex.machine.set(self.sp, value);
        self.sp += 1;
    }

    #[inline]
    fn pop(&mut self, ex: &Executor<'_, '_>) -> u64 {
        self.sp -= 1;
        ex.machine.get(self.sp)
    }

    fn push_label(&mut self, ex: &mut Executor<'_, '_>, dest: usize, height: u32, arity: u32) {
        ex.machine.set(self.bp, dest as u64);
        ex.machine.set(self.bp + 1, (height as u64) << 32 | arity as u64);
        self.bp += 2;
    }

    fn branch(&mut self, ex: &mut Executor<'_, '_>, depth: u32) -> usize {
        let entry = self.bp - 2 * (depth as usize + 1);
        let dest = ex.machine.get(entry) as usize;
        let packed = ex.machine.get(entry + 1);
        let arity = packed as u32 as usize;
        let target = self.frame.stack().start + (packed >> 32) as usize;
        ex.machine.copy(self.sp - arity, target, arity);
        self.sp = target + arity;
        self.bp = entry;
        dest
    }

    fn call(&mut self, ex: &mut Executor<'_, '_>, func: u32) -> Result<(), Error> {
        let (params, results) = ex.arity(func);
        let base = self.sp - params;
        ex.invoke(func, base)?;
        self.sp = base + results;
        Ok(())
    }

    /// Execute the instruction at `ip`. Returns the next ip, or `None` once
    /// the function has returned.
    pub(crate) fn step(&mut self, ex: &mut Executor<'_, '_>, ip: usize) -> Result<Option<usize>, Error> {
        let body = self.body;
        let instr = &body.instructions[ip];
        match instr.opcode.kind() {
            OpKind::Unary(op) => {
                let a = self.pop(ex);
                self.push(ex, numerics::unary(op, a)?);
                return Ok(Some(ip + 1));
            }
            OpKind::Binary(op) => {
                let b = self.pop(ex);
                let a = self.pop(ex);
                self.push(ex, numerics::binary(op, a, b)?);
                return Ok(Some(ip + 1));
            }
            OpKind::Load(op) => {
                let addr = self.pop(ex) as u32;
                let value = ex.load(op, addr, instr.offset())?;
                self.push(ex, value);
                return Ok(Some(ip + 1));
            }
            OpKind::Store(op) => {
                let value = self.pop(ex);
                let addr = self.pop(ex) as u32;
                ex.store(op, addr, instr.offset(), value)?;
                return Ok(Some(ip + 1));
            }
            OpKind::Special => {}
        }

        let next = match instr.opcode {
            Opcode::Unreachable => return Err(Trap::Unreachable.into()),
            Opcode::Nop => ip + 1,
            Opcode::Block => {
                let (height, _, results) = instr.block();
                self.push_label(ex, instr.continuation() as usize, height, results);
                ip + 1
            }
            Opcode::Loop => {
                let (height, params, _) = instr.block();
                self.push_label(ex, ip, height, params);
                ip + 1
            }
            Opcode::If => {
                let (height, _, results) = instr.block();
                let cond = self.pop(ex) as u32;
                let else_ip = instr.else_ip() as usize;
                if cond != 0 {
                    self.push_label(ex, instr.continuation() as usize, height, results);
                    ip + 1
                } else if else_ip != 0 {
                    self.push_label(ex, instr.continuation() as usize, height, results);
                    else_ip + 1
                } else {
                    instr.continuation() as usize
                }
            }
            Opcode::Else => {
                self.bp -= 2;
                instr.continuation() as usize
            }
            Opcode::End => {
                if ip + 1 == body.instructions.len() {
                    return Ok(None);
                }
                self.bp -= 2;
                ip + 1
            }
            Opcode::Br => self.branch(ex, instr.label()),
            Opcode::BrIf => {
                if self.pop(ex) as u32 != 0 {
                    self.branch(ex, instr.label())
                } else {
                    ip + 1
                }
            }
            Opcode::BrTable => {
                let index = self.pop(ex) as u32 as usize;
                let depth = instr.labels.get(index).copied().unwrap_or(instr.label());
                self.branch(ex, depth)
            }
            Opcode::Return => return Ok(None),
            Opcode::Call => {
                self.call(ex, instr.index())?;
                ip + 1
            }
            Opcode::CallIndirect => {
                let element = self.pop(ex) as u32;
                let func = ex.resolve_indirect(instr.index(), element)?;
                self.call(ex, func)?;
                ip + 1
            }
            Opcode::Drop => {
                self.sp -= 1;
                ip + 1
            }
            Opcode::Select => {
                let cond = self.pop(ex) as u32;
                let if_false = self.pop(ex);
                let if_true = self.pop(ex);
                self.push(ex, if cond != 0 { if_true } else { if_false });
                ip + 1
            }
            Opcode::LocalGet => {
                let value = ex.machine.get(self.frame.locals().start + instr.index() as usize);
                self.push(ex, value);
                ip + 1
            }
            Opcode::LocalSet => {
                let value = self.pop(ex);
                ex.machine.set(self.frame.locals().start + instr.index() as usize, value);
                ip + 1
            }
            Opcode::LocalTee => {
                let value = ex.machine.get(self.sp - 1);
                ex.machine.set(self.frame.locals().start + instr.index() as usize, value);
                ip + 1
            }
            Opcode::GlobalGet => {
                let value = ex.global(instr.index());
                self.push(ex, value);
                ip + 1
            }
            Opcode::GlobalSet => {
                let value = self.pop(ex);
                ex.set_global(instr.index(), value);
                ip + 1
            }
            Opcode::MemorySize => {
                let pages = ex.memory_size();
                self.push(ex, pages);
                ip + 1
            }
            Opcode::MemoryGrow => {
                let delta = self.pop(ex) as u32;
                let previous = ex.memory_grow(delta);
                self.push(ex, previous);
                ip + 1
            }
            Opcode::I32Const | Opcode::I64Const | Opcode::F32Const | Opcode::F64Const => {
                self.push(ex, instr.constant());
                ip + 1
            }
            other => unreachable!("{other} is not a special opcode"),
        };
        Ok(Some(next))
    }
}

/// Run a body to completion. Returns the arena index of its results.
pub(crate) fn run(
    ex: &mut Executor<'_, '_>,
    body: &Body,
    frame: Frame,
    num_results: usize,
) -> Result<usize, Error> {
    let mut interp = Interpreter::new(ex, body, frame, num_results);
    let mut ip = 0;
    while let Some(next) = interp.step(ex, ip)? {
        ip = next;
    }
    Ok(interp.results())
}

/// Like [`run`], reporting every step to the thread's tracer.
pub(crate) fn trace(
    ex: &mut Executor<'_, '_>,
    func: &WasmFunction,
    scope: &dyn Scope,
    body: &Body,
    frame: Frame,
) -> Result<usize, Error> {
    let depth = ex.thread.depth();
    if let Some(tracer) = ex.thread.tracer() {
        tracer.enter_frame(func.index, depth);
    }

    let mut interp = Interpreter::new(ex, body, frame, func.ty.results().len());
    let mut ip = 0;
    loop {
        let instruction = &body.instructions[ip];
        let (arg_types, result_types) = instruction.types(scope);
        let args_from = interp.sp.saturating_sub(arg_types.len()).max(frame.stack().start);
        let args = ex.machine.slice(args_from..interp.sp).to_vec();

        let next_ip = interp.step(ex, ip)?;

        let results = match next_ip {
            Some(_) => {
                let from = interp.sp.saturating_sub(result_types.len()).max(frame.stack().start);
                ex.machine.slice(from..interp.sp).to_vec()
            }
            None => Vec::new(),
        };
        if let Some(tracer) = ex.thread.tracer() {
            tracer.step(&TraceEvent {
                function: func.index,
                depth,
                ip,
                next_ip,
                instruction,
                arg_types: &arg_types,
                args: &args,
                result_types: &result_types,
                results: &results,
            });
        }

        match next_ip {
            Some(next) => ip = next,
            None => break,
        }
    }

    if let Some(tracer) = ex.thread.tracer() {
        tracer.leave_frame(func.index, depth);
    }
    Ok(interp.results())
}
