use std::collections::HashMap;
use std::sync::Arc;

use crate::code::{self, Scope};
use crate::engine::{Config, Engine};
use crate::interpreter::Listing;
use crate::runtime::ConstExpr;
use crate::types::{FuncType, GlobalType, Limits, ValType};

mod parse;

/// What an import provides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImportKind {
    Func(u32),
    Global(GlobalType),
    Memory(Limits),
}

#[derive(Debug, Clone)]
pub(crate) struct Import {
    pub(crate) module: String,
    pub(crate) name: String,
    pub(crate) kind: ImportKind,
}

/// An exported entity, by index into its index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Export {
    Func(u32),
    Global(u32),
    Memory(u32),
    Table(u32),
}

#[derive(Debug, Clone)]
pub(crate) struct ElementSegment {
    pub(crate) offset: ConstExpr,
    pub(crate) items: Vec<ConstExpr>,
}

#[derive(Debug, Clone)]
pub(crate) struct DataSegment {
    pub(crate) offset: ConstExpr,
    pub(crate) bytes: Box<[u8]>,
}

/// Undecoded body of a defined function.
#[derive(Debug, Clone)]
pub(crate) struct FunctionCode {
    /// Params followed by declared locals.
    pub(crate) locals: Box<[ValType]>,
    /// Operator bytes, up to and including the final `end`.
    pub(crate) bytecode: Arc<[u8]>,
}

#[derive(Debug, Default)]
pub(crate) struct ModuleInner {
    pub(crate) types: Vec<FuncType>,
    pub(crate) imports: Vec<Import>,
    /// Type index of every function, imported ones first.
    pub(crate) functions: Vec<u32>,
    pub(crate) num_imported_funcs: u32,
    /// Every global, imported ones first.
    pub(crate) globals: Vec<GlobalType>,
    pub(crate) num_imported_globals: u32,
    /// Initializers of the defined globals.
    pub(crate) global_inits: Vec<ConstExpr>,
    /// Memory 0, imported or defined.
    pub(crate) memory: Option<Limits>,
    pub(crate) memory_imported: bool,
    pub(crate) table: Option<Limits>,
    pub(crate) elements: Vec<ElementSegment>,
    pub(crate) data: Vec<DataSegment>,
    pub(crate) start: Option<u32>,
    pub(crate) exports: HashMap<String, Export>,
    pub(crate) code: Vec<FunctionCode>,
}

impl ModuleInner {
    pub(crate) fn func_type(&self, func: u32) -> Option<&FuncType> {
        let type_index = *self.functions.get(func as usize)?;
        self.types.get(type_index as usize)
    }
}

/// The index spaces seen from inside one function body.
pub(crate) struct FunctionScope<'a> {
    module: &'a ModuleInner,
    locals: &'a [ValType],
}

impl<'a> FunctionScope<'a> {
    pub(crate) fn new(module: &'a ModuleInner, locals: &'a [ValType]) -> Self {
        FunctionScope { module, locals }
    }
}

impl Scope for FunctionScope<'_> {
    fn local_type(&self, index: u32) -> Option<ValType> {
        self.locals.get(index as usize).copied()
    }

    fn global_type(&self, index: u32) -> Option<GlobalType> {
        self.module.globals.get(index as usize).copied()
    }

    fn function_signature(&self, index: u32) -> Option<&FuncType> {
        self.module.func_type(index)
    }

    fn func_type(&self, index: u32) -> Option<&FuncType> {
        self.module.types.get(index as usize)
    }

    fn has_table(&self, index: u32) -> bool {
        index == 0 && self.module.table.is_some()
    }

    fn has_memory(&self, index: u32) -> bool {
        index == 0 && self.module.memory.is_some()
    }
}

/// A parsed and validated WASM module (immutable).
///
/// Function bodies are kept as bytecode and decoded on first call, unless
/// the engine asks for eager validation.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) inner: Arc<ModuleInner>,
    pub(crate) config: Config,
}

impl Module {
    /// Parse a WAT string into a module.
    pub fn new(engine: &Engine, wat: &str) -> Result<Self, anyhow::Error> {
        let bytes = wat::parse_str(wat)?;
        Self::from_bytes(engine, &bytes)
    }

    /// Create a module from raw WASM bytes.
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, anyhow::Error> {
        let inner = parse::parse(engine, bytes)?;
        tracing::debug!(
            types = inner.types.len(),
            functions = inner.functions.len(),
            imports = inner.imports.len(),
            exports = inner.exports.len(),
            "module loaded"
        );
        let module = Module {
            inner: Arc::new(inner),
            config: engine.config().clone(),
        };
        if module.config.eager_validation {
            module.validate_bodies()?;
        }
        Ok(module)
    }

    /// Decode every function body, failing on the first invalid one.
    pub fn validate_bodies(&self) -> Result<(), anyhow::Error> {
        for (index, _) in self.inner.code.iter().enumerate() {
            let func = self.inner.num_imported_funcs + index as u32;
            self.decode(func)?;
        }
        Ok(())
    }

    pub(crate) fn decode(&self, func: u32) -> Result<code::Body, anyhow::Error> {
        let inner = &*self.inner;
        let (Some(ty), Some(body)) = (inner.func_type(func), self.code(func)) else {
            anyhow::bail!("function {func} has no body");
        };
        let scope = FunctionScope::new(inner, &body.locals);
        code::decode(&body.bytecode, ty, &scope)
            .map_err(|err| anyhow::Error::new(err).context(format!("function {func}")))
    }

    /// icode and fcode listing of defined function `func`.
    pub fn dump(&self, func: u32) -> Result<String, anyhow::Error> {
        let body = self.decode(func)?;
        let (Some(ty), Some(code)) = (self.func_type(func), self.code(func)) else {
            anyhow::bail!("function {func} is imported");
        };
        let scope = FunctionScope::new(&self.inner, &code.locals);
        Ok(Listing::new(func, body, ty, code.locals.len(), &scope).to_string())
    }

    pub(crate) fn code(&self, func: u32) -> Option<&FunctionCode> {
        let index = func.checked_sub(self.inner.num_imported_funcs)?;
        self.inner.code.get(index as usize)
    }

    pub fn exports(&self) -> impl Iterator<Item = (&str, Export)> + '_ {
        self.inner
            .exports
            .iter()
            .map(|(name, export)| (name.as_str(), *export))
    }

    /// Imports as `(module, name)` pairs, in index order.
    pub fn imports(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.inner
            .imports
            .iter()
            .map(|import| (import.module.as_str(), import.name.as_str()))
    }

    /// Signature of function `func` in the module's index space.
    pub fn func_type(&self, func: u32) -> Option<&FuncType> {
        self.inner.func_type(func)
    }

    pub fn num_functions(&self) -> u32 {
        self.inner.functions.len() as u32
    }

    pub fn num_imported_functions(&self) -> u32 {
        self.inner.num_imported_funcs
    }
}
