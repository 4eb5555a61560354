//! Section-stream validator.
//!
//! Performs the structural and index-space checks the execution core relies
//! on: every index a compiled body can mention is in range, branch depths
//! stay within their nesting, initializer expressions are constant, and the
//! MVP single-result limit holds. Full operand-stack typing is the concern
//! of an upstream validator; the interpreters do not re-typecheck at
//! runtime.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::model::{
    ExportDesc, FuncType, GlobalType, ImportDesc, Inst, Limits, Section, TypeIdx, ValType,
};

type VResult<T> = Result<T, ValidationError>;

/// Index-space view assembled from the section stream.
#[derive(Default)]
struct Env<'a> {
    types: &'a [FuncType],
    /// Type index per function, imports first.
    func_types: Vec<TypeIdx>,
    /// Global type per global, imports first.
    globals: Vec<GlobalType>,
    imported_funcs: u32,
    imported_globals: u32,
    tables: u32,
    memories: u32,
}

impl Env<'_> {
    fn func_type(&self, idx: u32) -> VResult<&FuncType> {
        let type_idx = *self
            .func_types
            .get(idx as usize)
            .ok_or(ValidationError::UnknownFunction { index: idx })?;
        self.types
            .get(type_idx as usize)
            .ok_or(ValidationError::UnknownType {
                index: type_idx,
                count: self.types.len(),
            })
    }
}

fn check_limits(limits: &Limits) -> VResult<()> {
    if let Some(max) = limits.max {
        if max < limits.min {
            return Err(ValidationError::BadLimits {
                min: limits.min,
                max,
            });
        }
    }
    Ok(())
}

/// An initializer must be a single constant instruction (or `global.get`
/// of an imported immutable global) of the expected type.
fn check_init_expr(env: &Env<'_>, init: &[Inst], expected: ValType) -> VResult<()> {
    let found = match init {
        [Inst::I32Const(_)] => ValType::I32,
        [Inst::I64Const(_)] => ValType::I64,
        [Inst::F32Const(_)] => ValType::F32,
        [Inst::F64Const(_)] => ValType::F64,
        [Inst::GlobalGet(idx)] => {
            if *idx >= env.imported_globals {
                return Err(ValidationError::BadInitExpr);
            }
            let gt = env
                .globals
                .get(*idx as usize)
                .ok_or(ValidationError::UnknownGlobal { index: *idx })?;
            if gt.mutable {
                return Err(ValidationError::BadInitExpr);
            }
            gt.val_type
        }
        _ => return Err(ValidationError::BadInitExpr),
    };
    if found != expected {
        return Err(ValidationError::BadInitExpr);
    }
    Ok(())
}

struct BodyChecker<'a> {
    env: &'a Env<'a>,
    func: u32,
    locals: u32,
}

impl BodyChecker<'_> {
    /// `nesting` counts enclosing labels including the function label, so a
    /// branch depth is valid iff it is strictly below it.
    fn check(&self, insts: &[Inst], nesting: u32) -> VResult<()> {
        for inst in insts {
            match inst {
                Inst::Block(_, body) | Inst::Loop(_, body) => {
                    self.check(body, nesting + 1)?;
                }
                Inst::If(_, then_body, else_body) => {
                    self.check(then_body, nesting + 1)?;
                    self.check(else_body, nesting + 1)?;
                }
                Inst::Br(depth) | Inst::BrIf(depth) => {
                    self.check_depth(*depth, nesting)?;
                }
                Inst::BrTable(labels, default) => {
                    for depth in labels {
                        self.check_depth(*depth, nesting)?;
                    }
                    self.check_depth(*default, nesting)?;
                }
                Inst::Call(idx) => {
                    self.env.func_type(*idx)?;
                }
                Inst::CallIndirect(type_idx) => {
                    if *type_idx as usize >= self.env.types.len() {
                        return Err(ValidationError::UnknownType {
                            index: *type_idx,
                            count: self.env.types.len(),
                        });
                    }
                    if self.env.tables == 0 {
                        return Err(ValidationError::UnknownTable { index: 0 });
                    }
                }
                Inst::LocalGet(idx) | Inst::LocalSet(idx) | Inst::LocalTee(idx) => {
                    if *idx >= self.locals {
                        return Err(ValidationError::UnknownLocal {
                            func: self.func,
                            index: *idx,
                        });
                    }
                }
                Inst::GlobalGet(idx) => {
                    if *idx as usize >= self.env.globals.len() {
                        return Err(ValidationError::UnknownGlobal { index: *idx });
                    }
                }
                Inst::GlobalSet(idx) => {
                    let gt = self
                        .env
                        .globals
                        .get(*idx as usize)
                        .ok_or(ValidationError::UnknownGlobal { index: *idx })?;
                    if !gt.mutable {
                        return Err(ValidationError::ImmutableGlobal(*idx));
                    }
                }
                Inst::Load(..) | Inst::Store(..) | Inst::MemorySize | Inst::MemoryGrow => {
                    if self.env.memories == 0 {
                        return Err(ValidationError::UnknownMemory { index: 0 });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_depth(&self, depth: u32, nesting: u32) -> VResult<()> {
        if depth >= nesting {
            return Err(ValidationError::BranchDepth {
                func: self.func,
                depth,
                nesting,
            });
        }
        Ok(())
    }
}

/// Validate a decoded section stream. On success the stream can be fed to
/// the assembler and the resulting module executed without index checks.
pub fn validate(sections: &[Section]) -> VResult<()> {
    let mut seen: HashSet<&'static str> = HashSet::new();
    for section in sections {
        if !matches!(section, Section::Custom { .. }) && !seen.insert(section.kind_name()) {
            return Err(ValidationError::DuplicateSection(section.kind_name()));
        }
    }

    let mut env = Env::default();
    let mut defined_globals: &[crate::model::Global] = &[];
    let mut func_section: &[TypeIdx] = &[];
    let mut code_section: &[crate::model::FuncBody] = &[];
    let mut exports = None;
    let mut start = None;
    let mut elements: &[crate::model::ElementSegment] = &[];
    let mut data: &[crate::model::DataSegment] = &[];
    let mut tables: &[crate::model::TableType] = &[];
    let mut memories: &[crate::model::MemoryType] = &[];
    let mut imports: &[crate::model::Import] = &[];

    for section in sections {
        match section {
            Section::Types(v) => env.types = v,
            Section::Imports(v) => imports = v,
            Section::Functions(v) => func_section = v,
            Section::Tables(v) => tables = v,
            Section::Memories(v) => memories = v,
            Section::Globals(v) => defined_globals = v,
            Section::Exports(v) => exports = Some(v),
            Section::Start(f) => start = Some(*f),
            Section::Elements(v) => elements = v,
            Section::Code(v) => code_section = v,
            Section::Data(v) => data = v,
            Section::Custom { .. } => {}
        }
    }

    // MVP: at most one result per signature.
    for ty in env.types {
        if ty.results.len() > 1 {
            return Err(ValidationError::MultiValue(ty.results.len()));
        }
    }

    // Index spaces: imports first, then definitions.
    for imp in imports {
        match &imp.desc {
            ImportDesc::Func(type_idx) => {
                if *type_idx as usize >= env.types.len() {
                    return Err(ValidationError::UnknownType {
                        index: *type_idx,
                        count: env.types.len(),
                    });
                }
                env.func_types.push(*type_idx);
                env.imported_funcs += 1;
            }
            ImportDesc::Table(tt) => {
                check_limits(&tt.limits)?;
                env.tables += 1;
            }
            ImportDesc::Memory(mt) => {
                check_limits(&mt.limits)?;
                env.memories += 1;
            }
            ImportDesc::Global(gt) => {
                env.globals.push(*gt);
                env.imported_globals += 1;
            }
        }
    }
    for type_idx in func_section {
        if *type_idx as usize >= env.types.len() {
            return Err(ValidationError::UnknownType {
                index: *type_idx,
                count: env.types.len(),
            });
        }
        env.func_types.push(*type_idx);
    }
    for tt in tables {
        check_limits(&tt.limits)?;
        env.tables += 1;
    }
    for mt in memories {
        check_limits(&mt.limits)?;
        env.memories += 1;
    }
    if env.memories > 1 {
        return Err(ValidationError::MultipleMemories);
    }
    for g in defined_globals {
        env.globals.push(g.ty);
    }

    // Globals: constant initializers of the declared type. The env only
    // exposes imported globals to initializers.
    for g in defined_globals {
        check_init_expr(&env, &g.init, g.ty.val_type)?;
    }

    // Exports: unique names, indices in range.
    if let Some(exports) = exports {
        let mut names = HashSet::new();
        for ex in exports {
            if !names.insert(ex.name.as_str()) {
                return Err(ValidationError::DuplicateExport(ex.name.clone()));
            }
            match ex.desc {
                ExportDesc::Func(f) => {
                    env.func_type(f)?;
                }
                ExportDesc::Table(t) => {
                    if t >= env.tables {
                        return Err(ValidationError::UnknownTable { index: t });
                    }
                }
                ExportDesc::Memory(m) => {
                    if m >= env.memories {
                        return Err(ValidationError::UnknownMemory { index: m });
                    }
                }
                ExportDesc::Global(g) => {
                    if g as usize >= env.globals.len() {
                        return Err(ValidationError::UnknownGlobal { index: g });
                    }
                }
            }
        }
    }

    // Start function: declared and of type [] -> [].
    if let Some(start_idx) = start {
        let ty = env.func_type(start_idx)?;
        if !ty.params.is_empty() || !ty.results.is_empty() {
            return Err(ValidationError::BadStartSignature(start_idx));
        }
    }

    // Element segments: existing table, known functions, i32 offsets.
    for seg in elements {
        if seg.table >= env.tables {
            return Err(ValidationError::UnknownTable { index: seg.table });
        }
        check_init_expr(&env, &seg.offset, ValType::I32)?;
        for func_idx in &seg.init {
            env.func_type(*func_idx)?;
        }
    }

    // Data segments: existing memory, i32 offsets.
    for seg in data {
        if seg.memory >= env.memories {
            return Err(ValidationError::UnknownMemory { index: seg.memory });
        }
        check_init_expr(&env, &seg.offset, ValType::I32)?;
    }

    // Code bodies: one per declared function, all indices and branch
    // depths in range.
    if func_section.len() != code_section.len() {
        return Err(ValidationError::FunctionCodeMismatch {
            functions: func_section.len(),
            bodies: code_section.len(),
        });
    }
    for (def_index, body) in code_section.iter().enumerate() {
        let func = env.imported_funcs + def_index as u32;
        let params = env.func_type(func)?.params.len() as u32;
        let declared: u32 = body.locals.iter().map(|d| d.count).sum();
        let checker = BodyChecker {
            env: &env,
            func,
            locals: params + declared,
        };
        checker.check(&body.body, 1)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FuncBody, Global, Section};

    fn minimal(body: Vec<Inst>) -> Vec<Section> {
        vec![
            Section::Types(vec![FuncType::new(vec![], vec![])]),
            Section::Functions(vec![0]),
            Section::Code(vec![FuncBody {
                locals: vec![],
                body,
            }]),
        ]
    }

    #[test]
    fn accepts_branch_to_function_label() {
        validate(&minimal(vec![Inst::Br(0)])).unwrap();
    }

    #[test]
    fn rejects_branch_past_nesting() {
        let err = validate(&minimal(vec![Inst::Br(1)])).unwrap_err();
        assert!(matches!(err, ValidationError::BranchDepth { depth: 1, .. }));
    }

    #[test]
    fn rejects_unknown_local() {
        let err = validate(&minimal(vec![Inst::LocalGet(0)])).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownLocal { .. }));
    }

    #[test]
    fn rejects_memory_op_without_memory() {
        let err = validate(&minimal(vec![Inst::MemorySize, Inst::Drop])).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownMemory { .. }));
    }

    #[test]
    fn rejects_non_constant_initializer() {
        let sections = vec![Section::Globals(vec![Global {
            ty: GlobalType::new(ValType::I32, false),
            init: vec![Inst::LocalGet(0)],
        }])];
        assert!(matches!(
            validate(&sections),
            Err(ValidationError::BadInitExpr)
        ));
    }

    #[test]
    fn rejects_mutable_import_in_initializer() {
        let sections = vec![
            Section::Imports(vec![crate::model::Import {
                module: "env".into(),
                name: "g".into(),
                desc: ImportDesc::Global(GlobalType::new(ValType::I32, true)),
            }]),
            Section::Globals(vec![Global {
                ty: GlobalType::new(ValType::I32, false),
                init: vec![Inst::GlobalGet(0)],
            }]),
        ];
        assert!(matches!(
            validate(&sections),
            Err(ValidationError::BadInitExpr)
        ));
    }

    #[test]
    fn rejects_duplicate_export_names() {
        let mut sections = minimal(vec![]);
        sections.insert(
            2,
            Section::Exports(vec![
                crate::model::Export {
                    name: "f".into(),
                    desc: ExportDesc::Func(0),
                },
                crate::model::Export {
                    name: "f".into(),
                    desc: ExportDesc::Func(0),
                },
            ]),
        );
        assert!(matches!(
            validate(&sections),
            Err(ValidationError::DuplicateExport(_))
        ));
    }
}
