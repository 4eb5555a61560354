//! Section assembly and body compilation.
//!
//! The assembler folds a decoded `Section` stream into a `Context`
//! accumulator, then constructs the immutable `Module`. Function bodies and
//! every initializer expression are compiled here, eagerly, so that
//! instantiation performs no further code generation.

pub mod high;
pub mod low;
pub mod opcodes;

use log::debug;

use crate::config::{Backend, CodeFormat};
use crate::error::CompileError;
use crate::model::{
    CompiledData, CompiledElem, CompiledFunction, CompiledGlobal, CustomSection, DataSegment,
    ElementSegment, Export, FuncBody, FuncDef, FuncType, Global, Import, ImportDesc, Inst,
    MemoryType, Module, Section, TableType, TypeIdx, ValType,
};

/// Type lookups the low-level compiler needs for operand accounting.
pub struct BodyContext<'a> {
    pub types: &'a [FuncType],
    /// Type index of every function in the index space, imports included.
    pub func_types: &'a [TypeIdx],
}

impl BodyContext<'_> {
    fn arity_of(&self, type_idx: TypeIdx) -> Result<(i64, i64), CompileError> {
        let ty = self
            .types
            .get(type_idx as usize)
            .ok_or(CompileError::UnknownType(type_idx))?;
        Ok((ty.params.len() as i64, ty.results.len() as i64))
    }

    /// `(params, results)` of a function in the index space.
    pub fn func_arity(&self, func_idx: u32) -> Result<(i64, i64), CompileError> {
        let type_idx = *self
            .func_types
            .get(func_idx as usize)
            .ok_or(CompileError::UnknownFunction(func_idx))?;
        self.arity_of(type_idx)
    }

    /// `(params, results)` of a type, for `call_indirect`.
    pub fn type_arity(&self, type_idx: TypeIdx) -> Result<(i64, i64), CompileError> {
        self.arity_of(type_idx)
    }
}

/// Compile one body with the selected back-end.
fn compile_expr(
    insts: &[Inst],
    ctx: &BodyContext<'_>,
    format: CodeFormat,
    result_arity: usize,
) -> Result<Vec<u8>, CompileError> {
    match format.backend {
        Backend::High => high::compile_body(insts),
        Backend::Low => low::compile_body(insts, ctx, format.byte_order, result_arity),
    }
}

/// Accumulator the section fold fills in.
#[derive(Default)]
struct Context {
    types: Vec<FuncType>,
    imports: Vec<Import>,
    func_type_indices: Vec<TypeIdx>,
    tables: Vec<TableType>,
    memories: Vec<MemoryType>,
    globals: Vec<Global>,
    exports: Vec<Export>,
    start: Option<u32>,
    elements: Vec<ElementSegment>,
    code: Vec<FuncBody>,
    data: Vec<DataSegment>,
    customs: Vec<CustomSection>,
    seen: [bool; 12],
}

impl Context {
    fn fold(&mut self, section: Section) -> Result<(), CompileError> {
        let kind = section.kind_name();
        let slot = match &section {
            Section::Custom { .. } => None,
            Section::Types(_) => Some(1),
            Section::Imports(_) => Some(2),
            Section::Functions(_) => Some(3),
            Section::Tables(_) => Some(4),
            Section::Memories(_) => Some(5),
            Section::Globals(_) => Some(6),
            Section::Exports(_) => Some(7),
            Section::Start(_) => Some(8),
            Section::Elements(_) => Some(9),
            Section::Code(_) => Some(10),
            Section::Data(_) => Some(11),
        };
        if let Some(slot) = slot {
            if self.seen[slot] {
                return Err(CompileError::DuplicateSection(kind));
            }
            self.seen[slot] = true;
        }

        match section {
            Section::Types(v) => self.types = v,
            Section::Imports(v) => self.imports = v,
            Section::Functions(v) => self.func_type_indices = v,
            Section::Tables(v) => self.tables = v,
            Section::Memories(v) => self.memories = v,
            Section::Globals(v) => self.globals = v,
            Section::Exports(v) => self.exports = v,
            Section::Start(f) => self.start = Some(f),
            Section::Elements(v) => self.elements = v,
            Section::Code(v) => self.code = v,
            Section::Data(v) => self.data = v,
            Section::Custom { name, bytes } => self.customs.push(CustomSection { name, bytes }),
        }
        Ok(())
    }
}

fn expand_locals(body: &FuncBody) -> Vec<ValType> {
    let total: usize = body.locals.iter().map(|d| d.count as usize).sum();
    let mut out = Vec::with_capacity(total);
    for decl in &body.locals {
        out.extend(std::iter::repeat(decl.val_type).take(decl.count as usize));
    }
    out
}

/// Fold a section stream into a compiled module.
pub fn assemble(sections: Vec<Section>, format: CodeFormat) -> Result<Module, CompileError> {
    let mut ctx = Context::default();
    for section in sections {
        ctx.fold(section)?;
    }

    // Imports extend four parallel vectors so defined entities index right
    // after them in each space.
    let mut imported_func_types: Vec<TypeIdx> = Vec::new();
    let mut imported_tables = 0u32;
    let mut imported_memories = 0u32;
    let mut imported_globals = 0u32;
    for imp in &ctx.imports {
        match &imp.desc {
            ImportDesc::Func(type_idx) => imported_func_types.push(*type_idx),
            ImportDesc::Table(_) => imported_tables += 1,
            ImportDesc::Memory(_) => imported_memories += 1,
            ImportDesc::Global(_) => imported_globals += 1,
        }
    }
    let imported_funcs = imported_func_types.len() as u32;

    let mut func_types = imported_func_types;
    func_types.extend_from_slice(&ctx.func_type_indices);
    let body_ctx = BodyContext {
        types: &ctx.types,
        func_types: &func_types,
    };

    // Function index space: import placeholders, then compiled bodies.
    let mut funcs: Vec<FuncDef> = func_types[..imported_funcs as usize]
        .iter()
        .map(|t| FuncDef::Imported(*t))
        .collect();
    for (def_index, body) in ctx.code.iter().enumerate() {
        let type_idx = *ctx
            .func_type_indices
            .get(def_index)
            .ok_or(CompileError::UnknownFunction(
                imported_funcs + def_index as u32,
            ))?;
        let result_arity = body_ctx.arity_of(type_idx)?.1 as usize;
        let code = compile_expr(&body.body, &body_ctx, format, result_arity)?;
        funcs.push(FuncDef::Local(CompiledFunction {
            type_idx,
            locals: expand_locals(body),
            code,
        }));
    }

    let globals = ctx
        .globals
        .iter()
        .map(|g| {
            Ok(CompiledGlobal {
                ty: g.ty,
                init: compile_expr(&g.init, &body_ctx, format, 1)?,
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    let elements = ctx
        .elements
        .iter()
        .map(|seg| {
            Ok(CompiledElem {
                table: seg.table,
                offset: compile_expr(&seg.offset, &body_ctx, format, 1)?,
                init: seg.init.clone(),
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    let data = ctx
        .data
        .iter()
        .map(|seg| {
            Ok(CompiledData {
                memory: seg.memory,
                offset: compile_expr(&seg.offset, &body_ctx, format, 1)?,
                init: seg.init.clone(),
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    debug!(
        "assembled module: {} funcs ({} imported), {} globals, {} elements, {} data segments, backend {:?}",
        funcs.len(),
        imported_funcs,
        globals.len(),
        elements.len(),
        data.len(),
        format.backend,
    );

    Ok(Module {
        types: ctx.types,
        imports: ctx.imports,
        exports: ctx.exports,
        customs: ctx.customs,
        funcs,
        tables: ctx.tables,
        memories: ctx.memories,
        globals,
        elements,
        data,
        start: ctx.start,
        imported_funcs,
        imported_tables,
        imported_memories,
        imported_globals,
        format,
    })
}
