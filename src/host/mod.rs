//! Host embedding surface: the import resolver trait and the standard
//! keyed `Imports` container.

pub mod func;

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{FuncType, GlobalType, MemoryType, TableType};
pub use func::HostFunc;

/// Resolver for the instantiator. Functions resolve to host callables;
/// tables, memories, and globals resolve to pre-allocated store addresses,
/// which is what lets one host memory be shared by many instances.
pub trait ImportResolver {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<Arc<HostFunc>>;
    fn resolve_table(&self, module: &str, name: &str, tt: &TableType) -> Option<usize>;
    fn resolve_memory(&self, module: &str, name: &str, mt: &MemoryType) -> Option<usize>;
    fn resolve_global(&self, module: &str, name: &str, gt: &GlobalType) -> Option<usize>;
}

/// One importable entity.
#[derive(Clone)]
pub enum Extern {
    Func(FuncType, Arc<HostFunc>),
    Table(usize),
    Memory(usize),
    Global(usize),
}

/// Keyed `(module, field) -> Extern` collection, the standard resolver.
#[derive(Clone, Default)]
pub struct Imports {
    entries: HashMap<(String, String), Extern>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity under `(module, field)`. Later definitions win.
    pub fn define(&mut self, module: &str, name: &str, value: Extern) -> &mut Self {
        self.entries
            .insert((module.to_string(), name.to_string()), value);
        self
    }

    /// Register a host function.
    pub fn func<F>(&mut self, module: &str, name: &str, ty: FuncType, f: F) -> &mut Self
    where
        F: Fn(&[crate::model::Value]) -> Result<Option<crate::model::Value>, crate::error::Trap>
            + Send
            + Sync
            + 'static,
    {
        self.define(module, name, Extern::Func(ty, Arc::new(f)))
    }

    fn lookup(&self, module: &str, name: &str) -> Option<&Extern> {
        self.entries.get(&(module.to_string(), name.to_string()))
    }
}

impl ImportResolver for Imports {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<Arc<HostFunc>> {
        match self.lookup(module, name)? {
            // Signatures must match exactly; a near miss is a link error,
            // not a candidate.
            Extern::Func(host_ty, f) if host_ty == ty => Some(f.clone()),
            _ => None,
        }
    }

    fn resolve_table(&self, module: &str, name: &str, _tt: &TableType) -> Option<usize> {
        match self.lookup(module, name)? {
            Extern::Table(addr) => Some(*addr),
            _ => None,
        }
    }

    fn resolve_memory(&self, module: &str, name: &str, _mt: &MemoryType) -> Option<usize> {
        match self.lookup(module, name)? {
            Extern::Memory(addr) => Some(*addr),
            _ => None,
        }
    }

    fn resolve_global(&self, module: &str, name: &str, _gt: &GlobalType) -> Option<usize> {
        match self.lookup(module, name)? {
            Extern::Global(addr) => Some(*addr),
            _ => None,
        }
    }
}
