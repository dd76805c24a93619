//! Register-addressed code for the tier-1 interpreter.
//!
//! Every operand names a frame slot: slot `k` is `arena[frame.base + k]`,
//! where locals come first and the operand stack position `i` lives at slot
//! `num_locals + i`. Branches name a [`Label`] by index instead of walking a
//! continuation stack, so fcode frames carry no blocks window.

mod compile;
mod dump;
mod exec;

use std::rc::Rc;

use crate::code::{BinOp, Body, LoadOp, StoreOp, UnOp};

pub(crate) use compile::compile;
pub(crate) use exec::run;

pub(crate) type Slot = u32;

/// A source operand that is either resident in a slot or folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operand {
    Slot(Slot),
    Imm(u64),
}

/// Condition of a fused compare-and-branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cond {
    /// `i32.eqz` or `i64.eqz` of a slot.
    Eqz(UnOp, Slot),
    Compare(BinOp, Slot, Operand),
}

/// Jump targets and shape of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Label {
    /// Where a branch to this label resumes: after the block, or the first
    /// instruction of a loop body.
    pub(crate) continuation: u32,
    /// First instruction of the else arm of an `if`.
    pub(crate) else_ip: Option<u32>,
    /// Operand stack height the label's values land at.
    pub(crate) stack_height: u32,
    /// Values carried by a branch: results, or params for a loop.
    pub(crate) arity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FInstr {
    Unreachable,
    /// Enter the else arm (or skip the block) when `cond` is zero.
    If { cond: Slot, label: u32 },
    /// End of a then arm: skip the else arm.
    Else { label: u32 },
    /// Branch whose values already sit at the label's height.
    Br { label: u32 },
    /// Branch that moves the label's values down from `stack_height`.
    BrMove { label: u32, stack_height: u32 },
    BrIf { cond: Slot, label: u32 },
    BrIfMove { cond: Slot, label: u32, stack_height: u32 },
    /// A comparison fused into the branch that consumes it.
    BrIfCmp { cond: Cond, label: u32 },
    /// Indexes switch table `table`; its last entry is the default.
    BrTable { index: Slot, table: u32, stack_height: u32 },
    /// Return the values ending at `stack_height`.
    Return { stack_height: u32 },
    /// Call with the params at `base`; results are left at `base`.
    Call { func: u32, base: Slot },
    CallIndirect { type_index: u32, index: Slot, base: Slot },
    Select { dest: Slot, cond: Slot, if_true: Slot, if_false: Slot },
    Copy { dest: Slot, src: Slot },
    Const { dest: Slot, value: u64 },
    GlobalGet { dest: Slot, global: u32 },
    GlobalSet { global: u32, src: Operand },
    Load { op: LoadOp, dest: Slot, addr: Operand, offset: u32 },
    Store { op: StoreOp, addr: Operand, value: Operand, offset: u32 },
    MemorySize { dest: Slot },
    MemoryGrow { dest: Slot, delta: Slot },
    Unary { op: UnOp, dest: Slot, src: Slot },
    Binary { op: BinOp, dest: Slot, lhs: Slot, rhs: Operand },
}

impl FInstr {
    /// Destination slot of an instruction whose result can be redirected.
    fn dest_mut(&mut self) -> Option<&mut Slot> {
        match self {
            FInstr::Select { dest, .. }
            | FInstr::GlobalGet { dest, .. }
            | FInstr::Load { dest, .. }
            | FInstr::MemorySize { dest }
            | FInstr::MemoryGrow { dest, .. }
            | FInstr::Unary { dest, .. }
            | FInstr::Binary { dest, .. } => Some(dest),
            _ => None,
        }
    }
}

/// A function compiled for the tier-1 interpreter.
#[derive(Debug)]
pub(crate) struct Fcode {
    pub(crate) instructions: Vec<FInstr>,
    pub(crate) labels: Vec<Label>,
    pub(crate) switch_tables: Vec<Box<[u32]>>,
    pub(crate) num_locals: u32,
    pub(crate) num_results: u32,
    /// The icode this was compiled from, kept for tracing and dumps.
    pub(crate) body: Rc<Body>,
}
