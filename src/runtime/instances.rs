//! Instance records: function instances (wasm-defined or host-provided)
//! and module instances with their resolved index spaces and export map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::host::HostFunc;
use crate::model::{CompiledFunction, FuncIdx, FuncType, Module};

/// A function instance: a wasm-defined function of some instantiated
/// module, or a host callable with a declared signature.
#[derive(Clone)]
pub enum FuncInstance {
    Wasm {
        /// Index into the module's function index space.
        func_idx: FuncIdx,
        /// Owning module-instance index in the store.
        module: usize,
    },
    Host {
        ty: FuncType,
        f: Arc<HostFunc>,
    },
}

impl std::fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuncInstance::Wasm { func_idx, module } => f
                .debug_struct("Wasm")
                .field("func_idx", func_idx)
                .field("module", module)
                .finish(),
            FuncInstance::Host { ty, .. } => f.debug_struct("Host").field("ty", ty).finish(),
        }
    }
}

/// Resolved export: a store address of the named entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportAddr {
    Func(usize),
    Table(usize),
    Memory(usize),
    Global(usize),
}

/// A module instance: store addresses for every index space (imports
/// first), the export index, and the originating compiled module.
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    pub funcs: Vec<usize>,
    pub tables: Vec<usize>,
    pub memories: Vec<usize>,
    pub globals: Vec<usize>,
    pub exports: HashMap<String, ExportAddr>,
    pub module: Arc<Module>,
}

impl ModuleInstance {
    pub fn new(module: Arc<Module>) -> Self {
        Self {
            funcs: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            exports: HashMap::new(),
            module,
        }
    }

    pub fn resolve_export(&self, name: &str) -> Option<ExportAddr> {
        self.exports.get(name).copied()
    }

    /// Compiled body of a function in this module's index space.
    pub fn compiled_func(&self, func_idx: FuncIdx) -> Option<&CompiledFunction> {
        self.module.local_func(func_idx)
    }

    pub fn func_type(&self, func_idx: FuncIdx) -> Option<&FuncType> {
        self.module.func_type(func_idx)
    }
}
