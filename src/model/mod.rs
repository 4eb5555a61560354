//! Data model: core types, the structured instruction ADT produced by the
//! decoder, section records, and the compiled immutable module.

pub mod instr;
pub mod module;
pub mod section;
pub mod types;

pub use instr::{BlockType, Inst};
pub use module::{
    CompiledData, CompiledElem, CompiledFunction, CompiledGlobal, CustomSection, FuncDef, Module,
};
pub use section::{DataSegment, ElementSegment, FuncBody, Global, LocalDecl, Section};
pub use types::{
    Export, ExportDesc, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc, Limits,
    MemIdx, MemoryType, RefType, TableIdx, TableType, TypeIdx, ValType, Value,
};
