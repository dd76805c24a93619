//! Module-level state shared by every call chain of an instance: linear
//! memory, table 0 and globals. Memory may also be shared with other
//! instances.

mod const_expr;
mod memory;
mod table;

pub(crate) use const_expr::{ConstExpr, ConstOp, ConstValue};
pub use memory::{Memory, SharedMemory, PAGE_SIZE};
pub use table::Table;
