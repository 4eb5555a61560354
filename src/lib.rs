//! tidewasm: a WebAssembly MVP engine.
//!
//! The pipeline runs in one direction: bytes are decoded into a section
//! stream, validated, assembled into an immutable [`Module`] whose bodies
//! are compiled into one of two internal forms, instantiated against
//! host-provided imports inside a [`Store`], and executed by the matching
//! stack-machine interpreter.
//!
//! ```no_run
//! use tidewasm::{Engine, Imports, Store, Value};
//!
//! # let wasm_bytes: Vec<u8> = vec![];
//! let engine = Engine::default();
//! let module = std::sync::Arc::new(engine.compile(&wasm_bytes)?);
//! let mut store = Store::new();
//! let instance = engine.instantiate(&mut store, module, &Imports::new())?;
//! let sum = engine.invoke(&mut store, instance, "add", &[Value::I32(7), Value::I32(5)])?;
//! # Ok::<(), tidewasm::EngineError>(())
//! ```

pub mod binary;
pub mod compile;
pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod runtime;
pub mod validate;
pub mod vm;

use std::path::Path;
use std::sync::Arc;

use log::debug;

pub use config::{Backend, ByteOrder, CodeFormat, EngineConfig, StackLimits};
pub use error::{CompileError, DecodeError, EngineError, LinkError, Trap, ValidationError};
pub use host::{Extern, HostFunc, ImportResolver, Imports};
pub use model::{FuncType, Module, Section, ValType, Value};
pub use runtime::{ExportAddr, InstanceHandle, Store, PAGE_SIZE};

use error::LinkError as LE;
use model::{ExportDesc, ImportDesc};
use runtime::{FuncInstance, GlobalInstance, MemoryInstance, ModuleInstance, TableInstance};

/// The engine: configuration plus the compile/instantiate/invoke entry
/// points. Engines are cheap to clone and safe to share; every piece of
/// per-instance state lives in a [`Store`].
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decode and validate without compiling.
    pub fn validate(&self, bytes: &[u8]) -> Result<(), EngineError> {
        let sections = binary::sections::decode_sections(bytes).map_err(DecodeError::from)?;
        validate::validate(&sections)?;
        Ok(())
    }

    /// Compile a binary module.
    pub fn compile(&self, bytes: &[u8]) -> Result<Module, EngineError> {
        let sections = binary::sections::decode_sections(bytes).map_err(DecodeError::from)?;
        self.compile_sections(sections)
    }

    /// Compile a module read from a file.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Module, EngineError> {
        let bytes = std::fs::read(path).map_err(DecodeError::from)?;
        self.compile(&bytes)
    }

    /// Compile a pre-decoded section stream. The stream is validated
    /// before any code is generated.
    pub fn compile_sections(&self, sections: Vec<Section>) -> Result<Module, EngineError> {
        validate::validate(&sections)?;
        let format = CodeFormat::from_config(&self.config);
        Ok(compile::assemble(sections, format)?)
    }

    /// Instantiate a compiled module against the resolver's imports. On
    /// any failure the store is rolled back to its state at entry and no
    /// instance is exposed.
    pub fn instantiate(
        &self,
        store: &mut Store,
        module: Arc<Module>,
        resolver: &impl ImportResolver,
    ) -> Result<InstanceHandle, EngineError> {
        let mark = store.watermark();
        match self.instantiate_inner(store, module, resolver) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                store.rollback(mark);
                Err(err.into())
            }
        }
    }

    fn instantiate_inner(
        &self,
        store: &mut Store,
        module: Arc<Module>,
        resolver: &impl ImportResolver,
    ) -> Result<InstanceHandle, LE> {
        let handle = store.alloc_module(ModuleInstance::new(module.clone()));
        let order = module.format.byte_order;

        let mut funcs: Vec<usize> = Vec::with_capacity(module.total_funcs() as usize);
        let mut tables: Vec<usize> = Vec::with_capacity(module.total_tables() as usize);
        let mut memories: Vec<usize> = Vec::with_capacity(module.total_memories() as usize);
        let mut globals: Vec<usize> = Vec::with_capacity(module.total_globals() as usize);

        // 1) Resolve imports, in declaration order.
        for imp in &module.imports {
            let unresolved = || LE::UnresolvedImport {
                module: imp.module.clone(),
                name: imp.name.clone(),
            };
            let bad_addr = || LE::BadImportAddress {
                module: imp.module.clone(),
                name: imp.name.clone(),
            };
            match &imp.desc {
                ImportDesc::Func(type_idx) => {
                    let ty = module
                        .types
                        .get(*type_idx as usize)
                        .ok_or(LE::TypeMismatch {
                            context: "import type index",
                            expected: "a declared type".into(),
                            found: format!("type index {type_idx}"),
                        })?;
                    let f = resolver
                        .resolve_func(&imp.module, &imp.name, ty)
                        .ok_or_else(unresolved)?;
                    funcs.push(store.alloc_func(FuncInstance::Host { ty: ty.clone(), f }));
                }
                ImportDesc::Table(tt) => {
                    let addr = resolver
                        .resolve_table(&imp.module, &imp.name, tt)
                        .ok_or_else(unresolved)?;
                    let table = store.get_table(addr).ok_or_else(bad_addr)?;
                    check_limits_compat(
                        &imp.module,
                        &imp.name,
                        (tt.limits.min, tt.limits.max),
                        table.limits(),
                    )?;
                    tables.push(addr);
                }
                ImportDesc::Memory(mt) => {
                    let addr = resolver
                        .resolve_memory(&imp.module, &imp.name, mt)
                        .ok_or_else(unresolved)?;
                    let mem = store.get_memory(addr).ok_or_else(bad_addr)?;
                    check_limits_compat(
                        &imp.module,
                        &imp.name,
                        (mt.limits.min, mt.limits.max),
                        mem.limits(),
                    )?;
                    memories.push(addr);
                }
                ImportDesc::Global(gt) => {
                    let addr = resolver
                        .resolve_global(&imp.module, &imp.name, gt)
                        .ok_or_else(unresolved)?;
                    let g = store.get_global(addr).ok_or_else(bad_addr)?;
                    if g.ty() != gt {
                        return Err(LE::TypeMismatch {
                            context: "global import",
                            expected: format!("{gt:?}"),
                            found: format!("{:?}", g.ty()),
                        });
                    }
                    globals.push(addr);
                }
            }
        }

        // 2) Allocate defined functions, tables, and memories.
        for idx in module.imported_funcs..module.total_funcs() {
            funcs.push(store.alloc_func(FuncInstance::Wasm {
                func_idx: idx,
                module: handle.0,
            }));
        }
        for tt in &module.tables {
            tables.push(store.alloc_table(TableInstance::new(tt)));
        }
        for mt in &module.memories {
            memories.push(store.alloc_memory(MemoryInstance::new(mt, !self.config.data_on_heap)));
        }

        // 3) Defined globals: evaluate compiled initializers in restricted
        // mode. Only the already-resolved (imported) globals are visible.
        for g in &module.globals {
            let value = vm::eval_init(&g.init, order, store, &globals).map_err(LE::InitTrap)?;
            if value.ty() != g.ty.val_type {
                return Err(LE::TypeMismatch {
                    context: "global initializer",
                    expected: format!("{:?}", g.ty.val_type),
                    found: format!("{:?}", value.ty()),
                });
            }
            globals.push(store.alloc_global(GlobalInstance::new(g.ty, value)));
        }

        // 4) Element segments, in declared order.
        for seg in &module.elements {
            let taddr = *tables
                .get(seg.table as usize)
                .ok_or(LE::ElemOutOfBounds)?;
            let base = match vm::eval_init(&seg.offset, order, store, &globals)
                .map_err(LE::InitTrap)?
            {
                Value::I32(v) if v >= 0 => v as u32,
                _ => return Err(LE::ElemOutOfBounds),
            };
            let size = store
                .get_table(taddr)
                .ok_or(LE::ElemOutOfBounds)?
                .size();
            let end = base.saturating_add(seg.init.len() as u32);
            if end > size {
                return Err(LE::ElemOutOfBounds);
            }
            for (i, func_idx) in seg.init.iter().enumerate() {
                let faddr = *funcs.get(*func_idx as usize).ok_or(LE::TypeMismatch {
                    context: "element segment function index",
                    expected: format!("index below {}", funcs.len()),
                    found: format!("{func_idx}"),
                })?;
                store
                    .get_table_mut(taddr)
                    .ok_or(LE::ElemOutOfBounds)?
                    .set(base + i as u32, Some(faddr))
                    .map_err(|_| LE::ElemOutOfBounds)?;
            }
        }

        // 5) Data segments, in declared order.
        for seg in &module.data {
            let maddr = *memories
                .get(seg.memory as usize)
                .ok_or(LE::DataOutOfBounds)?;
            let base = match vm::eval_init(&seg.offset, order, store, &globals)
                .map_err(LE::InitTrap)?
            {
                Value::I32(v) if v >= 0 => v as u32,
                _ => return Err(LE::DataOutOfBounds),
            };
            store
                .get_memory_mut(maddr)
                .ok_or(LE::DataOutOfBounds)?
                .write(base, &seg.init)
                .map_err(|_| LE::DataOutOfBounds)?;
        }

        // 6) Export index.
        let mut exports = std::collections::HashMap::new();
        for ex in &module.exports {
            let resolved = match ex.desc {
                ExportDesc::Func(i) => funcs.get(i as usize).map(|a| ExportAddr::Func(*a)),
                ExportDesc::Table(i) => tables.get(i as usize).map(|a| ExportAddr::Table(*a)),
                ExportDesc::Memory(i) => memories.get(i as usize).map(|a| ExportAddr::Memory(*a)),
                ExportDesc::Global(i) => globals.get(i as usize).map(|a| ExportAddr::Global(*a)),
            }
            .ok_or(LE::TypeMismatch {
                context: "export index",
                expected: "an allocated entity".into(),
                found: ex.name.clone(),
            })?;
            exports.insert(ex.name.clone(), resolved);
        }

        // 7) Commit the instance, then run the start function against it.
        let start_addr = module
            .start
            .map(|idx| funcs.get(idx as usize).copied().ok_or(LE::TypeMismatch {
                context: "start function index",
                expected: format!("index below {}", funcs.len()),
                found: format!("{idx}"),
            }))
            .transpose()?;
        {
            let inst = store
                .get_module_mut(handle.0)
                .ok_or(LE::TypeMismatch {
                    context: "instance commit",
                    expected: "a live instance".into(),
                    found: "none".into(),
                })?;
            inst.funcs = funcs;
            inst.tables = tables;
            inst.memories = memories;
            inst.globals = globals;
            inst.exports = exports;
        }

        if let Some(addr) = start_addr {
            vm::run_function(store, handle, addr, &[], &self.config.stack)
                .map_err(LE::StartTrap)?;
        }

        debug!(
            "instantiated module: {} funcs, {} tables, {} memories, {} globals",
            module.total_funcs(),
            module.total_tables(),
            module.total_memories(),
            module.total_globals(),
        );
        Ok(handle)
    }

    /// Invoke an exported function. Arguments are marshalled into operand
    /// slots per the export's signature; the zero-or-one result comes back
    /// as a typed [`Value`].
    pub fn invoke(
        &self,
        store: &mut Store,
        instance: InstanceHandle,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>, EngineError> {
        let module_inst = store.get_module(instance.0).ok_or(EngineError::BadInstance)?;
        let addr = match module_inst.resolve_export(name) {
            Some(ExportAddr::Func(addr)) => addr,
            Some(_) => return Err(EngineError::NotCallable(name.to_string())),
            None => return Err(EngineError::UnknownExport(name.to_string())),
        };

        let ty = match store.get_func(addr) {
            Some(FuncInstance::Host { ty, .. }) => ty.clone(),
            Some(FuncInstance::Wasm { func_idx, module }) => store
                .get_module(*module)
                .and_then(|m| m.func_type(*func_idx))
                .cloned()
                .ok_or(EngineError::BadInstance)?,
            None => return Err(EngineError::BadInstance),
        };

        let given: Vec<ValType> = args.iter().map(Value::ty).collect();
        if given != ty.params {
            return Err(EngineError::ArgumentMismatch {
                expected: format!("{:?}", ty.params),
                found: format!("{given:?}"),
            });
        }

        Ok(vm::run_function(store, instance, addr, args, &self.config.stack)?)
    }
}

fn check_limits_compat(
    module: &str,
    name: &str,
    import: (u32, Option<u32>),
    host: (u32, Option<u32>),
) -> Result<(), LE> {
    let (imp_min, imp_max) = import;
    let (host_min, host_max) = host;
    let compatible = host_min >= imp_min
        && match imp_max {
            None => true,
            Some(imp_max) => host_max.is_some_and(|host_max| host_max <= imp_max),
        };
    if compatible {
        Ok(())
    } else {
        Err(LE::IncompatibleLimits {
            module: module.to_string(),
            name: name.to_string(),
        })
    }
}
