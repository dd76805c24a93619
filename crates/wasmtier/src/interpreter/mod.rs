//! The two interpreter tiers and the call machinery they share.
//!
//! A call chain owns one [`Machine`] (the value arena) and one [`Thread`]
//! (depth limit and tracer). Wasm and host functions are entered through
//! the same [`Executor::invoke`]: the callee's params are the top of the
//! caller's operand stack, and results are left where the params were.

mod fcode;
mod function;
mod host;
mod icode;
mod machine;
mod numerics;
mod thread;
mod trace;
mod trap;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::code::{Body, LoadOp, Scope, StoreOp};
use crate::engine::Config;
use crate::error::Error;
use crate::module::{FunctionScope, ModuleInner};
use crate::runtime::{Memory, Table};
use crate::types::FuncType;

pub(crate) use function::{Code, Function, WasmFunction};
pub use function::TierKind;
pub use host::{Caller, HostFunc};
pub(crate) use machine::{Frame, FrameLayout, Machine};
pub(crate) use thread::Thread;
pub use trace::{LogTracer, TraceEvent, Tracer};
pub use trap::Trap;

/// Everything one call chain can touch.
pub(crate) struct Executor<'a, 't> {
    pub(crate) module: &'a ModuleInner,
    pub(crate) functions: &'a [Function],
    pub(crate) memory: Option<&'a RefCell<Memory>>,
    pub(crate) table: Option<&'a Table>,
    pub(crate) globals: &'a mut [u64],
    pub(crate) config: &'a Config,
    pub(crate) machine: &'a mut Machine,
    pub(crate) thread: Thread<'t>,
}

impl<'a, 't> Executor<'a, 't> {
    /// Call `func` from the embedder with raw argument words.
    pub(crate) fn execute(&mut self, func: u32, args: &[u64]) -> Result<Vec<u64>, Error> {
        let num_results = self.functions[func as usize].ty().results().len();
        let depth = self.machine.depth();
        let base = self.machine.frames().last().map_or(0, |frame| frame.stack().end);
        self.machine.ensure(base, args.len().max(num_results));
        self.machine
            .slice_mut(base..base + args.len())
            .copy_from_slice(args);
        match self.invoke(func, base) {
            Ok(()) => Ok(self.machine.slice(base..base + num_results).to_vec()),
            Err(err) => {
                self.machine.unwind_to(depth);
                Err(err)
            }
        }
    }

    /// Call `func` with its params at arena offset `base`. On return its
    /// results start at `base`.
    pub(crate) fn invoke(&mut self, func: u32, base: usize) -> Result<(), Error> {
        let functions = self.functions;
        match &functions[func as usize] {
            Function::Host(host) => Ok(self.call_host(host, base)?),
            Function::Wasm(wasm) => self.call_wasm(wasm, base),
        }
    }

    fn call_wasm(&mut self, func: &WasmFunction, base: usize) -> Result<(), Error> {
        self.thread.enter()?;
        let scope = FunctionScope::new(self.module, &func.locals);
        let code = func.prepare(self.config, &scope)?;
        let tracing = self.thread.is_tracing();
        let frame = self.machine.push(base, func.layout(&code, tracing));

        let results = match &code {
            _ if tracing => icode::trace(self, func, &scope, code.body(), frame)?,
            Code::Icode(body) => icode::run(self, body, frame, func.ty.results().len())?,
            Code::Fcode(compiled) => fcode::run(self, compiled, frame)?,
        };

        self.machine.pop(results, func.ty.results().len());
        self.thread.leave();
        Ok(())
    }

    /// Host calls get a frame of their own: params below, results above.
    fn call_host(&mut self, host: &HostFunc, base: usize) -> Result<(), Trap> {
        self.thread.enter()?;
        let num_params = host.ty().params().len();
        let num_results = host.ty().results().len();
        let frame = self.machine.push(
            base,
            FrameLayout {
                num_params,
                num_locals: num_params,
                max_blocks: 0,
                max_stack: num_results,
            },
        );

        let (below, above) = self.machine.split_at_mut(frame.stack().start);
        let mut caller = Caller {
            memory: self.memory,
        };
        host.call(&mut caller, &below[frame.locals()], &mut above[..num_results])?;

        self.machine.pop(frame.stack().start, num_results);
        self.thread.leave();
        Ok(())
    }

    /// Resolve a `call_indirect` target through table 0.
    pub(crate) fn resolve_indirect(&self, type_index: u32, element: u32) -> Result<u32, Trap> {
        let table = self.table.ok_or(Trap::UndefinedElement)?;
        let func = table
            .get(element)
            .ok_or(Trap::UndefinedElement)?
            .ok_or(Trap::UninitializedElement)?;
        let expected = self.module.types.get(type_index as usize);
        if expected != Some(self.functions[func as usize].ty()) {
            return Err(Trap::IndirectCallTypeMismatch);
        }
        Ok(func)
    }

    /// Params of the function a call instruction names.
    pub(crate) fn arity(&self, func: u32) -> (usize, usize) {
        let ty = self.functions[func as usize].ty();
        (ty.params().len(), ty.results().len())
    }

    pub(crate) fn load(&self, op: LoadOp, addr: u32, offset: u32) -> Result<u64, Trap> {
        match self.memory {
            Some(memory) => memory.borrow().load(op, addr, offset),
            None => Err(Trap::OutOfBoundsMemoryAccess),
        }
    }

    pub(crate) fn store(&mut self, op: StoreOp, addr: u32, offset: u32, value: u64) -> Result<(), Trap> {
        match self.memory {
            Some(memory) => memory.borrow_mut().store(op, addr, offset, value),
            None => Err(Trap::OutOfBoundsMemoryAccess),
        }
    }

    pub(crate) fn memory_size(&self) -> u64 {
        self.memory.map_or(0, |memory| memory.borrow().size()) as u64
    }

    pub(crate) fn memory_grow(&mut self, delta: u32) -> u64 {
        let previous = match self.memory {
            Some(memory) => memory.borrow_mut().grow(delta),
            None => -1,
        };
        previous as u32 as u64
    }

    #[inline]
    pub(crate) fn global(&self, index: u32) -> u64 {
        self.globals[index as usize]
    }

    #[inline]
    pub(crate) fn set_global(&mut self, index: u32, value: u64) {
        self.globals[index as usize] = value;
    }
}

/// The icode of a body next to its fcode translation.
pub(crate) struct Listing {
    function: u32,
    fcode: fcode::Fcode,
}

impl Listing {
    pub(crate) fn new(function: u32, body: Body, ty: &FuncType, num_locals: usize, scope: &dyn Scope) -> Self {
        Listing {
            function,
            fcode: fcode::compile(Rc::new(body), ty, num_locals, scope),
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = &self.fcode.body;
        writeln!(f, "=== function {} ===", self.function)?;
        writeln!(f, "{:?}", body.metrics)?;
        writeln!(f, "--- icode ({} instructions) ---", body.instructions.len())?;
        for (ip, instr) in body.instructions.iter().enumerate() {
            writeln!(f, "  [{ip:3}] {instr}")?;
        }
        write!(f, "{}", self.fcode)
    }
}
