use crate::types::ValType;

/// Why a function body was rejected by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: ValType, actual: ValType },
    #[error("unknown local {0}")]
    UnknownLocal(u32),
    #[error("unknown global {0}")]
    UnknownGlobal(u32),
    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),
    #[error("unknown function {0}")]
    UnknownFunction(u32),
    #[error("unknown type {0}")]
    UnknownType(u32),
    #[error("unknown table {0}")]
    UnknownTable(u32),
    #[error("unknown memory {0}")]
    UnknownMemory(u32),
    #[error("invalid label depth {0}")]
    InvalidLabel(u32),
    #[error("type mismatch: values remaining on stack at end of block")]
    UnbalancedStack,
    #[error("else without matching if")]
    InvalidNesting,
    #[error("br_table targets disagree on arity")]
    BrTableArityMismatch,
    #[error("end of function reached before end of bytecode")]
    UnexpectedEnd,
    #[error("control stack underflow")]
    LabelStackUnderflow,
    #[error("unexpected end of bytecode")]
    UnexpectedEof,
    #[error("malformed LEB128 integer")]
    MalformedLeb,
    #[error("invalid block type")]
    InvalidBlockType,
    #[error("unsupported opcode {0:#x}")]
    UnsupportedOpcode(u16),
}
