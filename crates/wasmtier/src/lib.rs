//! A tiered WebAssembly interpreter.
//!
//! Function bodies are decoded lazily into validated icode and run on a
//! stack interpreter. Functions with loops, and short functions that are
//! called again, are compiled to register-addressed fcode and run on a
//! second interpreter with identical semantics.

mod code;
mod engine;
mod error;
mod instance;
mod interpreter;
mod linker;
mod module;
mod runtime;
mod types;
mod value;

pub use code::{
    BinOp, BlockType, Body, Immediate, Instruction, LoadOp, Metrics, OpKind, Opcode, Scope,
    StoreOp, UnOp, ValidationError,
};
pub use engine::{Config, Engine, TierMode, TieringPolicy};
pub use error::Error;
pub use instance::{Func, Instance};
pub use interpreter::{Caller, HostFunc, LogTracer, TierKind, TraceEvent, Tracer, Trap};
pub use linker::Linker;
pub use module::{Export, Module};
pub use runtime::{Memory, SharedMemory, Table, PAGE_SIZE};
pub use types::{FuncType, GlobalType, Limits, ValType};
pub use value::{Val, WasmArgs, WasmResults, WasmVal};
