//! Named import registry for module instantiation.
//!
//! The [`Linker`] collects host functions, globals and the exports of
//! registered instances under `(module, name)` and resolves them against a
//! module's declared imports during instantiation.

use std::collections::HashMap;

use crate::instance::{Imports, Instance};
use crate::interpreter::{Caller, HostFunc, Trap};
use crate::module::{Export, ImportKind, Module};
use crate::runtime::SharedMemory;
use crate::types::{FuncType, GlobalType};
use crate::value::Val;

enum Extern {
    Func(HostFunc),
    Global { ty: GlobalType, bits: u64 },
    Memory(SharedMemory),
}

/// A named import registry.
///
/// # Examples
///
/// ```
/// # use wasmtier::{Engine, FuncType, Linker, Module, ValType};
/// # fn main() -> Result<(), anyhow::Error> {
/// let engine = Engine::default();
/// let module = Module::new(&engine, r#"
///     (module
///       (import "env" "double" (func $double (param i32) (result i32)))
///       (func (export "quad") (param i32) (result i32)
///         (call $double (call $double (local.get 0)))))
/// "#)?;
/// let mut linker = Linker::new();
/// let ty = FuncType::new([ValType::I32], [ValType::I32]);
/// linker.func("env", "double", ty, |_caller, args, results| {
///     results[0] = (args[0] as u32).wrapping_mul(2) as u64;
///     Ok(())
/// });
/// let mut instance = linker.instantiate(&module)?;
/// assert_eq!(instance.call::<i32, i32>("quad", 5)?, 20);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Linker {
    entries: HashMap<(String, String), Extern>,
}

impl Linker {
    /// Create an empty linker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function over raw slot words.
    pub fn func(
        &mut self,
        module: &str,
        name: &str,
        ty: FuncType,
        func: impl Fn(&mut Caller<'_>, &[u64], &mut [u64]) -> Result<(), Trap> + 'static,
    ) -> &mut Self {
        self.define(module, name, Extern::Func(HostFunc::new(ty, func)))
    }

    /// Register an already built host function.
    pub fn host_func(&mut self, module: &str, name: &str, func: HostFunc) -> &mut Self {
        self.define(module, name, Extern::Func(func))
    }

    /// Register an immutable global.
    pub fn global(&mut self, module: &str, name: &str, value: Val) -> &mut Self {
        let ty = GlobalType {
            content: value.ty(),
            mutable: false,
        };
        self.define(
            module,
            name,
            Extern::Global {
                ty,
                bits: value.to_bits(),
            },
        )
    }

    /// Register every export of `instance` under the module name `name`.
    ///
    /// Functions are called through the host call path of the importing
    /// instance and run in `instance`. Memory is shared. Globals are
    /// linked by their current value, so only immutable ones can be
    /// imported.
    pub fn instance(&mut self, name: &str, instance: &Instance) -> &mut Self {
        let mut exports: Vec<_> = instance.module().inner.exports.iter().collect();
        exports.sort_by_key(|(export, _)| export.as_str());
        for (export, &entity) in exports {
            let item = match entity {
                Export::Func(_) => instance
                    .get_func(export)
                    .and_then(|func| instance.export_as_host(func))
                    .map(Extern::Func),
                Export::Global(index) => instance
                    .global_export(index)
                    .map(|(ty, bits)| Extern::Global { ty, bits }),
                Export::Memory(_) => instance.shared_memory().map(Extern::Memory),
                Export::Table(_) => None,
            };
            match item {
                Some(item) => {
                    self.define(name, export, item);
                }
                None => tracing::debug!(module = name, export = %export, "export not linkable"),
            }
        }
        self
    }

    /// Check whether an import name is already registered.
    pub fn has(&self, module: &str, name: &str) -> bool {
        self.entries
            .contains_key(&(module.to_string(), name.to_string()))
    }

    fn define(&mut self, module: &str, name: &str, item: Extern) -> &mut Self {
        self.entries
            .insert((module.to_string(), name.to_string()), item);
        self
    }

    /// Resolve a module's imports and instantiate it.
    ///
    /// Fails if an import is missing or its type differs from the
    /// registered item.
    pub fn instantiate(&self, module: &Module) -> Result<Instance, anyhow::Error> {
        let mut imports = Imports::default();
        for import in &module.inner.imports {
            let key = (import.module.clone(), import.name.clone());
            let Some(item) = self.entries.get(&key) else {
                anyhow::bail!("import {}::{} was not found", import.module, import.name);
            };
            match (&import.kind, item) {
                (ImportKind::Func(type_index), Extern::Func(func)) => {
                    let expected = module.inner.types.get(*type_index as usize);
                    anyhow::ensure!(
                        expected == Some(func.ty()),
                        "import {}::{} has type {}, expected {:?}",
                        import.module,
                        import.name,
                        func.ty(),
                        expected
                    );
                    imports.funcs.push(func.clone());
                }
                (ImportKind::Global(expected), Extern::Global { ty, bits }) => {
                    anyhow::ensure!(
                        expected == ty,
                        "import {}::{} is a {:?} global, expected {:?}",
                        import.module,
                        import.name,
                        ty,
                        expected
                    );
                    anyhow::ensure!(
                        !ty.mutable,
                        "import {}::{} is a mutable global, which cannot be shared",
                        import.module,
                        import.name
                    );
                    imports.globals.push(*bits);
                }
                (ImportKind::Memory(expected), Extern::Memory(memory)) => {
                    let (pages, max_pages) = {
                        let memory = memory.borrow();
                        (memory.size(), memory.max_pages())
                    };
                    anyhow::ensure!(
                        pages >= expected.min && expected.max.map_or(true, |max| max_pages <= max),
                        "import {}::{} is a memory of {pages}..{max_pages} pages, expected {:?}",
                        import.module,
                        import.name,
                        expected
                    );
                    imports.memory = Some(memory.clone());
                }
                _ => anyhow::bail!(
                    "import {}::{} has the wrong kind",
                    import.module,
                    import.name
                ),
            }
        }
        Instance::new(module, imports)
    }
}
