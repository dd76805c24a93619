use std::sync::Arc;

use wasmparser::{
    DataKind, ElementItems, ElementKind, ExternalKind, FunctionBody, Parser, Payload, TypeRef,
};

use super::{DataSegment, ElementSegment, Export, FunctionCode, Import, ImportKind, ModuleInner};
use crate::engine::Engine;
use crate::runtime::{ConstExpr, ConstOp};
use crate::types::{FuncType, GlobalType, Limits, ValType};

pub(crate) fn parse(engine: &Engine, bytes: &[u8]) -> Result<ModuleInner, anyhow::Error> {
    let mut validator = engine.new_validator();
    validator.validate_all(bytes)?;

    let mut builder = ModuleBuilder::default();
    let parser = Parser::new(0);
    for payload in parser.parse_all(bytes) {
        builder.process_payload(payload?)?;
    }
    builder.build()
}

#[derive(Default)]
struct ModuleBuilder {
    module: ModuleInner,
    /// Declared locals of each body, in code section order.
    bodies: Vec<(Vec<ValType>, Arc<[u8]>)>,
}

fn limits(initial: u64, maximum: Option<u64>) -> Result<Limits, anyhow::Error> {
    Ok(Limits {
        min: u32::try_from(initial)?,
        max: maximum.map(u32::try_from).transpose()?,
    })
}

fn global_type(ty: wasmparser::GlobalType) -> Result<GlobalType, anyhow::Error> {
    Ok(GlobalType {
        content: ValType::try_from(ty.content_type)?,
        mutable: ty.mutable,
    })
}

impl ModuleBuilder {
    fn process_payload(&mut self, payload: Payload) -> Result<(), anyhow::Error> {
        let module = &mut self.module;
        match payload {
            Payload::TypeSection(reader) => {
                for ty in reader.into_iter_err_on_gc_types() {
                    module.types.push(FuncType::try_from(&ty?)?);
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    let kind = match import.ty {
                        TypeRef::Func(type_index) => {
                            module.functions.push(type_index);
                            module.num_imported_funcs += 1;
                            ImportKind::Func(type_index)
                        }
                        TypeRef::Global(ty) => {
                            let ty = global_type(ty)?;
                            module.globals.push(ty);
                            module.num_imported_globals += 1;
                            ImportKind::Global(ty)
                        }
                        TypeRef::Memory(ty) => {
                            anyhow::ensure!(
                                module.memory.is_none(),
                                "at most one memory is supported"
                            );
                            let limits = limits(ty.initial, ty.maximum)?;
                            module.memory = Some(limits);
                            module.memory_imported = true;
                            ImportKind::Memory(limits)
                        }
                        other => anyhow::bail!(
                            "unsupported import {}::{} of kind {other:?}",
                            import.module,
                            import.name
                        ),
                    };
                    module.imports.push(Import {
                        module: import.module.to_string(),
                        name: import.name.to_string(),
                        kind,
                    });
                }
            }
            Payload::FunctionSection(reader) => {
                for type_index in reader {
                    module.functions.push(type_index?);
                }
            }
            Payload::TableSection(reader) => {
                for table in reader {
                    let ty = table?.ty;
                    anyhow::ensure!(module.table.is_none(), "at most one table is supported");
                    module.table = Some(limits(ty.initial.into(), ty.maximum.map(Into::into))?);
                }
            }
            Payload::MemorySection(reader) => {
                for memory in reader {
                    let memory = memory?;
                    anyhow::ensure!(module.memory.is_none(), "at most one memory is supported");
                    module.memory = Some(limits(memory.initial, memory.maximum)?);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    module.globals.push(global_type(global.ty)?);
                    module.global_inits.push(ConstExpr::parse(&global.init_expr)?);
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    let entity = match export.kind {
                        ExternalKind::Func => Export::Func(export.index),
                        ExternalKind::Global => Export::Global(export.index),
                        ExternalKind::Memory => Export::Memory(export.index),
                        ExternalKind::Table => Export::Table(export.index),
                        ExternalKind::Tag => continue,
                    };
                    module.exports.insert(export.name.to_string(), entity);
                }
            }
            Payload::StartSection { func, .. } => module.start = Some(func),
            Payload::ElementSection(reader) => {
                for element in reader {
                    let element = element?;
                    // Passive and declared segments only matter to bulk memory.
                    let ElementKind::Active { offset_expr, .. } = element.kind else {
                        continue;
                    };
                    let items = match element.items {
                        ElementItems::Functions(funcs) => funcs
                            .into_iter()
                            .map(|func| Ok(ConstExpr::from_ops(vec![ConstOp::RefFunc(func?)])))
                            .collect::<Result<Vec<_>, anyhow::Error>>()?,
                        ElementItems::Expressions(_, exprs) => exprs
                            .into_iter()
                            .map(|expr| ConstExpr::parse(&expr?))
                            .collect::<Result<Vec<_>, _>>()?,
                    };
                    module.elements.push(ElementSegment {
                        offset: ConstExpr::parse(&offset_expr)?,
                        items,
                    });
                }
            }
            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data?;
                    if let DataKind::Active { offset_expr, .. } = data.kind {
                        module.data.push(DataSegment {
                            offset: ConstExpr::parse(&offset_expr)?,
                            bytes: data.data.into(),
                        });
                    }
                }
            }
            Payload::CodeSectionEntry(body) => self.parse_body(body)?,
            _ => {}
        }
        Ok(())
    }

    fn parse_body(&mut self, body: FunctionBody) -> Result<(), anyhow::Error> {
        let mut locals = Vec::new();
        for local in body.get_locals_reader()? {
            let (count, ty) = local?;
            let ty = ValType::try_from(ty)?;
            locals.extend(std::iter::repeat(ty).take(count as usize));
        }
        let start = body.get_operators_reader()?.original_position();
        let range = body.range();
        let bytes = body.as_bytes();
        let operators = &bytes[start - range.start..];
        self.bodies.push((locals, operators.into()));
        Ok(())
    }

    fn build(self) -> Result<ModuleInner, anyhow::Error> {
        let mut module = self.module;
        let defined = &module.functions[module.num_imported_funcs as usize..];
        anyhow::ensure!(
            defined.len() == self.bodies.len(),
            "{} functions declared but {} bodies present",
            defined.len(),
            self.bodies.len()
        );

        let mut code = Vec::with_capacity(self.bodies.len());
        for (&type_index, (declared, bytecode)) in defined.iter().zip(self.bodies) {
            let Some(ty) = module.types.get(type_index as usize) else {
                anyhow::bail!("unknown type {type_index}");
            };
            let locals: Box<[ValType]> = ty.params().iter().copied().chain(declared).collect();
            code.push(FunctionCode { locals, bytecode });
        }
        module.code = code;
        Ok(module)
    }
}
