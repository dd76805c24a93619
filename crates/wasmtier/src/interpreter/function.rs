//! Per-function tier state.
//!
//! ```text
//! Bytecode --decode--> Icode                  (long, loop-free)
//!                  \-> CountingIcode(n) --n reaches promote_after--> Fcode
//!                  \-> Fcode                  (contains a loop)
//! ```
//!
//! Promotion is one-way. Every transition happens in `WasmFunction::prepare`,
//! the only place that mutates the state.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::fcode::{self, Fcode};
use super::host::HostFunc;
use super::machine::FrameLayout;
use crate::code::{self, Body, Scope, ValidationError};
use crate::engine::{Config, TierMode};
use crate::types::{FuncType, ValType};

/// Observable tier of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    /// Not yet decoded.
    Bytecode,
    /// Running on the stack interpreter, counting calls toward promotion.
    CountingIcode { invocations: u32 },
    /// Running on the stack interpreter for good.
    Icode,
    /// Compiled for the register interpreter.
    Fcode,
    /// Implemented by the embedder.
    Host,
}

enum Tier {
    Bytecode(Arc<[u8]>),
    CountingIcode { body: Rc<Body>, invocations: u32 },
    Icode(Rc<Body>),
    Fcode(Rc<Fcode>),
}

/// Executable form handed to an interpreter loop for one call.
pub(crate) enum Code {
    Icode(Rc<Body>),
    Fcode(Rc<Fcode>),
}

impl Code {
    /// The icode behind either tier; fcode keeps its source for tracing.
    pub(crate) fn body(&self) -> &Body {
        match self {
            Code::Icode(body) => body,
            Code::Fcode(fcode) => &fcode.body,
        }
    }
}

/// A function defined by the module.
pub(crate) struct WasmFunction {
    pub(crate) index: u32,
    pub(crate) ty: FuncType,
    /// Params followed by declared locals.
    pub(crate) locals: Box<[ValType]>,
    state: RefCell<Tier>,
}

/// An entry in an instance's function index space.
pub(crate) enum Function {
    Host(HostFunc),
    Wasm(WasmFunction),
}

impl Function {
    pub(crate) fn ty(&self) -> &FuncType {
        match self {
            Function::Host(host) => host.ty(),
            Function::Wasm(wasm) => &wasm.ty,
        }
    }

    pub(crate) fn tier(&self) -> TierKind {
        match self {
            Function::Host(_) => TierKind::Host,
            Function::Wasm(wasm) => wasm.tier(),
        }
    }
}

impl WasmFunction {
    pub(crate) fn new(index: u32, ty: FuncType, locals: Box<[ValType]>, bytecode: Arc<[u8]>) -> Self {
        WasmFunction {
            index,
            ty,
            locals,
            state: RefCell::new(Tier::Bytecode(bytecode)),
        }
    }

    pub(crate) fn tier(&self) -> TierKind {
        match &*self.state.borrow() {
            Tier::Bytecode(_) => TierKind::Bytecode,
            Tier::CountingIcode { invocations, .. } => TierKind::CountingIcode {
                invocations: *invocations,
            },
            Tier::Icode(_) => TierKind::Icode,
            Tier::Fcode(_) => TierKind::Fcode,
        }
    }

    /// Advance the tier state for one invocation and return the code to run.
    pub(crate) fn prepare(&self, config: &Config, scope: &dyn Scope) -> Result<Code, ValidationError> {
        let mut state = self.state.borrow_mut();
        if let Tier::Bytecode(bytes) = &*state {
            let body = Rc::new(code::decode(bytes, &self.ty, scope)?);
            let next = match config.tier_mode {
                TierMode::IcodeOnly => Tier::Icode(body),
                TierMode::FcodeOnly => Tier::Fcode(self.compile(body, scope)),
                TierMode::Natural if body.metrics.has_loops => Tier::Fcode(self.compile(body, scope)),
                TierMode::Natural if body.instructions.len() < config.tiering.short_function_len => {
                    Tier::CountingIcode {
                        body,
                        invocations: 0,
                    }
                }
                TierMode::Natural => Tier::Icode(body),
            };
            *state = next;
        }

        let promoted = match &mut *state {
            Tier::Bytecode(_) => unreachable!("decoded above"),
            Tier::Icode(body) => return Ok(Code::Icode(body.clone())),
            Tier::Fcode(fcode) => return Ok(Code::Fcode(fcode.clone())),
            Tier::CountingIcode { body, invocations } => {
                *invocations += 1;
                if *invocations < config.tiering.promote_after {
                    return Ok(Code::Icode(body.clone()));
                }
                self.compile(body.clone(), scope)
            }
        };
        *state = Tier::Fcode(promoted.clone());
        Ok(Code::Fcode(promoted))
    }

    fn compile(&self, body: Rc<Body>, scope: &dyn Scope) -> Rc<Fcode> {
        let fcode = fcode::compile(body, &self.ty, self.locals.len(), scope);
        tracing::debug!(
            function = self.index,
            icode = fcode.body.instructions.len(),
            fcode = fcode.instructions.len(),
            "promoted to fcode"
        );
        Rc::new(fcode)
    }

    /// Frame windows for running `code`. The continuation stack is only
    /// needed by the stack interpreter.
    pub(crate) fn layout(&self, code: &Code, tracing: bool) -> FrameLayout {
        let metrics = code.body().metrics;
        let max_blocks = match code {
            Code::Fcode(_) if !tracing => 0,
            _ => metrics.max_nesting as usize * 2,
        };
        FrameLayout {
            num_params: self.ty.params().len(),
            num_locals: self.locals.len(),
            max_blocks,
            max_stack: metrics.max_stack_depth as usize,
        }
    }
}
