//! Tier 1: the register interpreter loop.

use super::{Cond, FInstr, Fcode, Operand};
use crate::error::Error;
use crate::interpreter::{numerics, Executor, Frame, Trap};

/// Run compiled code in `frame`. Returns the arena index of its results.
pub(crate) fn run(ex: &mut Executor<'_, '_>, fcode: &Fcode, frame: Frame) -> Result<usize, Error> {
    let base = frame.base;
    let stack_base = base + fcode.num_locals as usize;
    let mut ip = 0usize;

    macro_rules! get {
        ($slot:expr) => {
            ex.machine.get(base + $slot as usize)
        };
    }
    macro_rules! set {
        ($slot:expr, $value:expr) => {{
            let value = $value;
            ex.machine.set(base + $slot as usize, value)
        }};
    }
    macro_rules! operand {
        ($operand:expr) => {
            match $operand {
                Operand::Slot(slot) => get!(slot),
                Operand::Imm(value) => value,
            }
        };
    }
    macro_rules! jump {
        ($label:expr) => {{
            ip = fcode.labels[$label as usize].continuation as usize;
            continue;
        }};
    }
    // Moves the label's values from the top of a stack of `height` values.
    macro_rules! move_to {
        ($label:expr, $height:expr) => {{
            let label = &fcode.labels[$label as usize];
            let arity = label.arity as usize;
            let src = stack_base + $height as usize - arity;
            ex.machine.copy(src, stack_base + label.stack_height as usize, arity);
        }};
    }

    loop {
        match fcode.instructions[ip] {
            FInstr::Unreachable => return Err(Trap::Unreachable.into()),
            FInstr::If { cond, label } => {
                if get!(cond) as u32 == 0 {
                    let label = &fcode.labels[label as usize];
                    ip = label.else_ip.unwrap_or(label.continuation) as usize;
                    continue;
                }
            }
            FInstr::Else { label } => jump!(label),
            FInstr::Br { label } => jump!(label),
            FInstr::BrMove {
                label,
                stack_height,
            } => {
                move_to!(label, stack_height);
                jump!(label)
            }
            FInstr::BrIf { cond, label } => {
                if get!(cond) as u32 != 0 {
                    jump!(label)
                }
            }
            FInstr::BrIfMove {
                cond,
                label,
                stack_height,
            } => {
                if get!(cond) as u32 != 0 {
                    move_to!(label, stack_height);
                    jump!(label)
                }
            }
            FInstr::BrIfCmp { cond, label } => {
                let taken = match cond {
                    Cond::Eqz(op, src) => numerics::unary(op, get!(src))?,
                    Cond::Compare(op, lhs, rhs) => numerics::binary(op, get!(lhs), operand!(rhs))?,
                };
                if taken as u32 != 0 {
                    jump!(label)
                }
            }
            FInstr::BrTable {
                index,
                table,
                stack_height,
            } => {
                let targets = &fcode.switch_tables[table as usize];
                let index = get!(index) as u32 as usize;
                let label = targets[index.min(targets.len() - 1)];
                move_to!(label, stack_height);
                jump!(label)
            }
            FInstr::Return { stack_height } => {
                return Ok(stack_base + stack_height as usize - fcode.num_results as usize);
            }
            FInstr::Call { func, base: at } => ex.invoke(func, base + at as usize)?,
            FInstr::CallIndirect {
                type_index,
                index,
                base: at,
            } => {
                let func = ex.resolve_indirect(type_index, get!(index) as u32)?;
                ex.invoke(func, base + at as usize)?;
            }
            FInstr::Select {
                dest,
                cond,
                if_true,
                if_false,
            } => {
                let value = if get!(cond) as u32 != 0 {
                    get!(if_true)
                } else {
                    get!(if_false)
                };
                set!(dest, value);
            }
            FInstr::Copy { dest, src } => set!(dest, get!(src)),
            FInstr::Const { dest, value } => set!(dest, value),
            FInstr::GlobalGet { dest, global } => set!(dest, ex.global(global)),
            FInstr::GlobalSet { global, src } => {
                let value = operand!(src);
                ex.set_global(global, value);
            }
            FInstr::Load {
                op,
                dest,
                addr,
                offset,
            } => {
                let addr = operand!(addr) as u32;
                set!(dest, ex.load(op, addr, offset)?);
            }
            FInstr::Store {
                op,
                addr,
                value,
                offset,
            } => {
                let addr = operand!(addr) as u32;
                let value = operand!(value);
                ex.store(op, addr, offset, value)?;
            }
            FInstr::MemorySize { dest } => set!(dest, ex.memory_size()),
            FInstr::MemoryGrow { dest, delta } => {
                let delta = get!(delta) as u32;
                set!(dest, ex.memory_grow(delta));
            }
            FInstr::Unary { op, dest, src } => set!(dest, numerics::unary(op, get!(src))?),
            FInstr::Binary { op, dest, lhs, rhs } => {
                set!(dest, numerics::binary(op, get!(lhs), operand!(rhs))?)
            }
        }
        ip += 1;
    }
}
