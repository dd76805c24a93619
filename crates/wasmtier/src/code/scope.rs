use crate::types::{FuncType, GlobalType, ValType};

/// Resolves the index spaces a function body refers to.
///
/// The decoder, the fcode compiler and the tracer only see a module through
/// this trait; the module layer owns the storage behind it.
pub trait Scope {
    fn local_type(&self, index: u32) -> Option<ValType>;
    fn global_type(&self, index: u32) -> Option<GlobalType>;
    fn function_signature(&self, index: u32) -> Option<&FuncType>;
    fn func_type(&self, index: u32) -> Option<&FuncType>;
    fn has_table(&self, index: u32) -> bool;
    fn has_memory(&self, index: u32) -> bool;
}
