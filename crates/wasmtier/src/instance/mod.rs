use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::error::Error;
use crate::interpreter::{
    Executor, Function, HostFunc, Machine, Thread, TierKind, Tracer, Trap, WasmFunction,
};
use crate::module::{Export, Module};
use crate::runtime::{ConstValue, Memory, SharedMemory, Table};
use crate::types::{FuncType, GlobalType};
use crate::value::{Val, WasmArgs, WasmResults};

/// Handle to a function of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Func(u32);

impl Func {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Imports resolved by a [`Linker`](crate::Linker), in declaration order.
#[derive(Default)]
pub(crate) struct Imports {
    pub(crate) funcs: Vec<HostFunc>,
    pub(crate) globals: Vec<u64>,
    pub(crate) memory: Option<SharedMemory>,
}

struct InstanceState {
    module: Module,
    functions: Vec<Function>,
    memory: Option<SharedMemory>,
    table: Option<Table>,
    globals: RefCell<Vec<u64>>,
    machine: RefCell<Machine>,
}

impl InstanceState {
    fn run<'t>(
        &self,
        func: u32,
        args: &[u64],
        tracer: Option<&'t mut (dyn Tracer + 't)>,
    ) -> Result<Vec<u64>, Error> {
        let (Ok(mut globals), Ok(mut machine)) =
            (self.globals.try_borrow_mut(), self.machine.try_borrow_mut())
        else {
            return Err(Trap::Host("instance re-entered while running".into()).into());
        };
        let config = &self.module.config;
        let mut executor = Executor {
            module: &self.module.inner,
            functions: &self.functions,
            memory: self.memory.as_deref(),
            table: self.table.as_ref(),
            globals: &mut globals[..],
            config,
            machine: &mut *machine,
            thread: Thread::new(config.max_call_depth, config.max_stack_bytes, tracer),
        };
        executor.execute(func, args)
    }
}

/// An instantiated WASM module.
///
/// An instance is a handle: a [`Linker`](crate::Linker) that registers it
/// keeps the same functions, globals and memory alive for the modules it
/// links against them.
pub struct Instance {
    state: Rc<InstanceState>,
}

impl Instance {
    /// Build an instance from resolved imports, apply segments and run the
    /// start function.
    pub(crate) fn new(module: &Module, imports: Imports) -> Result<Self, anyhow::Error> {
        let inner = &*module.inner;
        let config = &module.config;
        let Imports {
            funcs: imported_funcs,
            globals: imported_globals,
            memory: imported_memory,
        } = imports;
        anyhow::ensure!(
            imported_globals.len() == inner.num_imported_globals as usize,
            "expected {} imported globals, got {}",
            inner.num_imported_globals,
            imported_globals.len()
        );
        anyhow::ensure!(
            imported_memory.is_some() == inner.memory_imported,
            "memory import was not resolved"
        );

        let mut functions: Vec<Function> = imported_funcs.into_iter().map(Function::Host).collect();
        for (offset, code) in inner.code.iter().enumerate() {
            let index = inner.num_imported_funcs + offset as u32;
            let Some(ty) = inner.func_type(index) else {
                anyhow::bail!("function {index} has no type");
            };
            functions.push(Function::Wasm(WasmFunction::new(
                index,
                ty.clone(),
                code.locals.clone(),
                code.bytecode.clone(),
            )));
        }

        let mut globals = imported_globals;
        for (offset, init) in inner.global_inits.iter().enumerate() {
            match init.eval(&globals) {
                Some(ConstValue::Num(value)) => globals.push(value),
                other => anyhow::bail!("global {offset} has unsupported initializer {other:?}"),
            }
        }

        let memory = match (imported_memory, inner.memory) {
            (Some(shared), _) => Some(shared),
            (None, Some(limits)) => {
                let max = limits
                    .max
                    .unwrap_or(config.max_memory_pages)
                    .min(config.max_memory_pages);
                anyhow::ensure!(
                    limits.min <= max,
                    "memory of {} pages exceeds the limit of {max}",
                    limits.min
                );
                Some(Rc::new(RefCell::new(Memory::new(limits.min, max))))
            }
            (None, None) => None,
        };
        let mut table = inner.table.map(|limits| Table::new(limits.min));

        for segment in &inner.elements {
            let offset = segment.offset.eval_offset(&globals)?;
            let items = segment
                .items
                .iter()
                .map(|item| match item.eval(&globals) {
                    Some(ConstValue::FuncRef(func)) => Ok(func),
                    other => Err(anyhow::anyhow!("unsupported element {other:?}")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let Some(table) = table.as_mut() else {
                anyhow::bail!("element segment without a table");
            };
            table.initialize(offset, &items)?;
        }

        for segment in &inner.data {
            let offset = segment.offset.eval_offset(&globals)?;
            let Some(memory) = memory.as_ref() else {
                anyhow::bail!("data segment without a memory");
            };
            memory.borrow_mut().write(offset, &segment.bytes)?;
        }

        tracing::debug!(
            functions = functions.len(),
            globals = globals.len(),
            memory_pages = memory.as_ref().map(|memory| memory.borrow().size()),
            "instantiated"
        );

        let instance = Instance {
            state: Rc::new(InstanceState {
                module: module.clone(),
                functions,
                memory,
                table,
                globals: RefCell::new(globals),
                machine: RefCell::new(Machine::new(config.initial_arena_slots)),
            }),
        };
        if let Some(start) = inner.start {
            instance.run(start, &[], None)?;
        }
        Ok(instance)
    }

    fn run<'t>(
        &self,
        func: u32,
        args: &[u64],
        tracer: Option<&'t mut (dyn Tracer + 't)>,
    ) -> Result<Vec<u64>, Error> {
        self.state.run(func, args, tracer)
    }

    /// A host function that calls `func` of this instance. Params and
    /// results pass through the caller's frame as raw words.
    pub(crate) fn export_as_host(&self, func: Func) -> Option<HostFunc> {
        let ty = self.func_type(func)?.clone();
        let state = Rc::clone(&self.state);
        Some(HostFunc::new(ty, move |_caller, args, results| {
            let out = state.run(func.0, args, None).map_err(Trap::from)?;
            results.copy_from_slice(&out[..results.len()]);
            Ok(())
        }))
    }

    pub(crate) fn global_export(&self, index: u32) -> Option<(GlobalType, u64)> {
        let ty = *self.state.module.inner.globals.get(index as usize)?;
        let value = *self.state.globals.try_borrow().ok()?.get(index as usize)?;
        Some((ty, value))
    }

    pub(crate) fn shared_memory(&self) -> Option<SharedMemory> {
        self.state.memory.clone()
    }

    /// Call an exported function by name (typed API).
    pub fn call<A: WasmArgs, R: WasmResults>(&mut self, name: &str, args: A) -> Result<R, anyhow::Error> {
        let vals = self.call_dynamic(name, &args.to_vals())?;
        R::from_vals(&vals)
    }

    /// Call an exported function by name (dynamic API). Arguments are
    /// checked against the signature.
    pub fn call_dynamic(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, anyhow::Error> {
        let func = self.export_func(name)?;
        let raw = self.check_args(func, args)?;
        let results = self.run(func.0, &raw, None)?;
        Ok(self.typed_results(func, &results))
    }

    /// Call with raw slot words and no signature check. 32-bit values are
    /// passed zero-extended.
    pub fn call_unchecked(&mut self, func: Func, args: &[u64]) -> Result<Vec<u64>, Error> {
        if func.0 as usize >= self.state.functions.len() {
            return Err(Trap::UndefinedElement.into());
        }
        self.run(func.0, args, None)
    }

    /// Like [`Instance::call_dynamic`], reporting every executed
    /// instruction to `tracer`.
    pub fn call_traced(
        &mut self,
        name: &str,
        args: &[Val],
        tracer: &mut dyn Tracer,
    ) -> Result<Vec<Val>, anyhow::Error> {
        let func = self.export_func(name)?;
        let raw = self.check_args(func, args)?;
        let results = self.run(func.0, &raw, Some(tracer))?;
        Ok(self.typed_results(func, &results))
    }

    pub fn get_func(&self, name: &str) -> Option<Func> {
        match self.state.module.inner.exports.get(name)? {
            Export::Func(index) => Some(Func(*index)),
            _ => None,
        }
    }

    pub fn func_type(&self, func: Func) -> Option<&FuncType> {
        self.state.functions.get(func.0 as usize).map(Function::ty)
    }

    /// Current tier of an exported function.
    pub fn function_tier(&self, name: &str) -> Option<TierKind> {
        let func = self.get_func(name)?;
        self.state.functions.get(func.0 as usize).map(Function::tier)
    }

    /// Get an exported global's value by name.
    pub fn get_global(&self, name: &str) -> Option<Val> {
        let Export::Global(index) = *self.state.module.inner.exports.get(name)? else {
            return None;
        };
        let (ty, bits) = self.global_export(index)?;
        Some(Val::from_bits(ty.content, bits))
    }

    /// Memory 0. The guard must be dropped before the next call.
    pub fn memory(&self) -> Option<Ref<'_, Memory>> {
        self.state.memory.as_deref().map(RefCell::borrow)
    }

    pub fn memory_mut(&mut self) -> Option<RefMut<'_, Memory>> {
        self.state.memory.as_deref().map(RefCell::borrow_mut)
    }

    pub fn module(&self) -> &Module {
        &self.state.module
    }

    /// Number of times the value arena has been reallocated.
    pub fn arena_growths(&self) -> u32 {
        self.state.machine.try_borrow().map_or(0, |machine| machine.growths())
    }

    /// icode and fcode listing of an exported function.
    pub fn dump_function(&self, name: &str) -> Result<String, anyhow::Error> {
        let func = self.export_func(name)?;
        self.state.module.dump(func.0)
    }

    fn export_func(&self, name: &str) -> Result<Func, anyhow::Error> {
        self.get_func(name)
            .ok_or_else(|| anyhow::anyhow!("export {name} not found"))
    }

    fn check_args(&self, func: Func, args: &[Val]) -> Result<Vec<u64>, anyhow::Error> {
        let ty = self.state.functions[func.0 as usize].ty();
        anyhow::ensure!(
            args.len() == ty.params().len()
                && args.iter().zip(ty.params()).all(|(arg, &param)| arg.ty() == param),
            "arguments {args:?} do not match signature {ty}"
        );
        Ok(args.iter().map(Val::to_bits).collect())
    }

    fn typed_results(&self, func: Func, raw: &[u64]) -> Vec<Val> {
        let ty = self.state.functions[func.0 as usize].ty();
        ty.results()
            .iter()
            .zip(raw)
            .map(|(&ty, &bits)| Val::from_bits(ty, bits))
            .collect()
    }
}

