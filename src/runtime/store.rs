//! Central store for all runtime instances. Owns function, table, memory,
//! global, and module instances; hands out vector indices as addresses.
//!
//! Instantiation records a watermark before allocating and truncates back
//! to it on abort, so a failed instantiation leaves the store exactly as
//! it found it.

use super::{
    global::GlobalInstance,
    instances::{FuncInstance, ModuleInstance},
    memory::MemoryInstance,
    table::TableInstance,
    InstanceHandle,
};

#[derive(Debug, Default)]
pub struct Store {
    pub funcs: Vec<FuncInstance>,
    pub tables: Vec<TableInstance>,
    pub mems: Vec<MemoryInstance>,
    pub globals: Vec<GlobalInstance>,
    pub modules: Vec<ModuleInstance>,
}

/// Allocation state of a store at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    funcs: usize,
    tables: usize,
    mems: usize,
    globals: usize,
    modules: usize,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_func(&mut self, f: FuncInstance) -> usize {
        self.funcs.push(f);
        self.funcs.len() - 1
    }

    pub fn alloc_table(&mut self, t: TableInstance) -> usize {
        self.tables.push(t);
        self.tables.len() - 1
    }

    pub fn alloc_memory(&mut self, m: MemoryInstance) -> usize {
        self.mems.push(m);
        self.mems.len() - 1
    }

    pub fn alloc_global(&mut self, g: GlobalInstance) -> usize {
        self.globals.push(g);
        self.globals.len() - 1
    }

    pub fn alloc_module(&mut self, m: ModuleInstance) -> InstanceHandle {
        self.modules.push(m);
        InstanceHandle(self.modules.len() - 1)
    }

    pub fn get_func(&self, addr: usize) -> Option<&FuncInstance> {
        self.funcs.get(addr)
    }

    pub fn get_table(&self, addr: usize) -> Option<&TableInstance> {
        self.tables.get(addr)
    }

    pub fn get_table_mut(&mut self, addr: usize) -> Option<&mut TableInstance> {
        self.tables.get_mut(addr)
    }

    pub fn get_memory(&self, addr: usize) -> Option<&MemoryInstance> {
        self.mems.get(addr)
    }

    pub fn get_memory_mut(&mut self, addr: usize) -> Option<&mut MemoryInstance> {
        self.mems.get_mut(addr)
    }

    pub fn get_global(&self, addr: usize) -> Option<&GlobalInstance> {
        self.globals.get(addr)
    }

    pub fn get_global_mut(&mut self, addr: usize) -> Option<&mut GlobalInstance> {
        self.globals.get_mut(addr)
    }

    pub fn get_module(&self, idx: usize) -> Option<&ModuleInstance> {
        self.modules.get(idx)
    }

    pub fn get_module_mut(&mut self, idx: usize) -> Option<&mut ModuleInstance> {
        self.modules.get_mut(idx)
    }

    pub fn watermark(&self) -> Watermark {
        Watermark {
            funcs: self.funcs.len(),
            tables: self.tables.len(),
            mems: self.mems.len(),
            globals: self.globals.len(),
            modules: self.modules.len(),
        }
    }

    /// Release everything allocated after `mark`.
    pub fn rollback(&mut self, mark: Watermark) {
        self.funcs.truncate(mark.funcs);
        self.tables.truncate(mark.tables);
        self.mems.truncate(mark.mems);
        self.globals.truncate(mark.globals);
        self.modules.truncate(mark.modules);
    }
}
