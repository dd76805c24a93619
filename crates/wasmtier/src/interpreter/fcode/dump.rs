//! Human-readable fcode listings.

use std::fmt;

use super::{Cond, FInstr, Fcode, Operand};

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Slot(slot) => write!(f, "s{slot}"),
            Operand::Imm(value) => write!(f, "#{value:#x}"),
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::Eqz(op, src) => write!(f, "{op:?}(s{src})"),
            Cond::Compare(op, lhs, rhs) => write!(f, "{op:?}(s{lhs}, {rhs})"),
        }
    }
}

impl fmt::Display for FInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FInstr::Unreachable => write!(f, "unreachable"),
            FInstr::If { cond, label } => write!(f, "if s{cond} else L{label}"),
            FInstr::Else { label } => write!(f, "else -> L{label}"),
            FInstr::Br { label } => write!(f, "br L{label}"),
            FInstr::BrMove {
                label,
                stack_height,
            } => write!(f, "br L{label} from height {stack_height}"),
            FInstr::BrIf { cond, label } => write!(f, "br_if s{cond} L{label}"),
            FInstr::BrIfMove {
                cond,
                label,
                stack_height,
            } => write!(f, "br_if s{cond} L{label} from height {stack_height}"),
            FInstr::BrIfCmp { cond, label } => write!(f, "br_if {cond} L{label}"),
            FInstr::BrTable {
                index,
                table,
                stack_height,
            } => write!(f, "br_table s{index} T{table} from height {stack_height}"),
            FInstr::Return { stack_height } => write!(f, "return from height {stack_height}"),
            FInstr::Call { func, base } => write!(f, "call f{func} @s{base}"),
            FInstr::CallIndirect {
                type_index,
                index,
                base,
            } => write!(f, "call_indirect type {type_index} [s{index}] @s{base}"),
            FInstr::Select {
                dest,
                cond,
                if_true,
                if_false,
            } => write!(f, "s{dest} = select s{cond} ? s{if_true} : s{if_false}"),
            FInstr::Copy { dest, src } => write!(f, "s{dest} = s{src}"),
            FInstr::Const { dest, value } => write!(f, "s{dest} = #{value:#x}"),
            FInstr::GlobalGet { dest, global } => write!(f, "s{dest} = g{global}"),
            FInstr::GlobalSet { global, src } => write!(f, "g{global} = {src}"),
            FInstr::Load {
                op,
                dest,
                addr,
                offset,
            } => write!(f, "s{dest} = load.{op:?} [{addr} + {offset}]"),
            FInstr::Store {
                op,
                addr,
                value,
                offset,
            } => write!(f, "store.{op:?} [{addr} + {offset}] = {value}"),
            FInstr::MemorySize { dest } => write!(f, "s{dest} = memory.size"),
            FInstr::MemoryGrow { dest, delta } => write!(f, "s{dest} = memory.grow s{delta}"),
            FInstr::Unary { op, dest, src } => write!(f, "s{dest} = {op:?}(s{src})"),
            FInstr::Binary { op, dest, lhs, rhs } => write!(f, "s{dest} = {op:?}(s{lhs}, {rhs})"),
        }
    }
}

impl fmt::Display for Fcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "--- fcode ({} instructions, {} locals) ---",
            self.instructions.len(),
            self.num_locals
        )?;
        for (ip, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "  [{ip:3}] {instr}")?;
        }
        writeln!(f, "--- labels ({}) ---", self.labels.len())?;
        for (i, label) in self.labels.iter().enumerate() {
            write!(
                f,
                "  L{i}: -> {} height={} arity={}",
                label.continuation, label.stack_height, label.arity
            )?;
            if let Some(else_ip) = label.else_ip {
                write!(f, " else={else_ip}")?;
            }
            writeln!(f)?;
        }
        for (i, table) in self.switch_tables.iter().enumerate() {
            writeln!(f, "  T{i}: {table:?}")?;
        }
        Ok(())
    }
}
