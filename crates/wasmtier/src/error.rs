use crate::code::ValidationError;
use crate::interpreter::Trap;

/// Failure of a call into the engine.
///
/// Function bodies are decoded on first call, so a call can surface a
/// validation error as well as a trap.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Trap(#[from] Trap),
    #[error("invalid function body: {0}")]
    Validation(#[from] ValidationError),
}

impl Error {
    pub fn as_trap(&self) -> Option<&Trap> {
        match self {
            Error::Trap(trap) => Some(trap),
            Error::Validation(_) => None,
        }
    }
}

/// A failure inside another instance, reported to the calling one as a
/// trap of the import that reached it.
impl From<Error> for Trap {
    fn from(err: Error) -> Self {
        match err {
            Error::Trap(trap) => trap,
            Error::Validation(err) => Trap::Host(err.to_string()),
        }
    }
}
