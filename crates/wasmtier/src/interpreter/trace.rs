//! Instruction-level tracing on top of the tier-0 `step` contract.

use crate::code::Instruction;
use crate::types::ValType;

/// One executed instruction, with the operands it consumed and produced.
#[derive(Debug)]
pub struct TraceEvent<'a> {
    pub function: u32,
    pub depth: u32,
    pub ip: usize,
    pub next_ip: Option<usize>,
    pub instruction: &'a Instruction,
    pub arg_types: &'a [Option<ValType>],
    pub args: &'a [u64],
    pub result_types: &'a [Option<ValType>],
    pub results: &'a [u64],
}

/// Receives execution events while a call runs under tracing.
///
/// Traced calls execute every function on the stack interpreter, whatever
/// tier it has reached, so each instruction is reported exactly once.
pub trait Tracer {
    fn enter_frame(&mut self, _function: u32, _depth: u32) {}
    fn step(&mut self, event: &TraceEvent<'_>);
    fn leave_frame(&mut self, _function: u32, _depth: u32) {}
}

/// Forwards trace events to `tracing` at TRACE level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn enter_frame(&mut self, function: u32, depth: u32) {
        tracing::trace!(function, depth, "enter frame");
    }

    fn step(&mut self, event: &TraceEvent<'_>) {
        tracing::trace!(
            function = event.function,
            ip = event.ip,
            args = ?event.args,
            results = ?event.results,
            "{}",
            event.instruction
        );
    }

    fn leave_frame(&mut self, function: u32, depth: u32) {
        tracing::trace!(function, depth, "leave frame");
    }
}
