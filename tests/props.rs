//! Property tests: back-end parity on randomized programs, compile
//! idempotence, and fixup-target bounds on the flat form.

use std::sync::Arc;

use proptest::prelude::*;

use tidewasm::compile::opcodes::op;
use tidewasm::model::{BlockType, FuncBody, Inst};
use tidewasm::{
    Backend, ByteOrder, Engine, EngineConfig, FuncType, Imports, Section, Store, ValType, Value,
};

/// A tiny expression language that lowers to i32 wasm code with nested
/// control flow.
#[derive(Debug, Clone)]
enum Expr {
    Const(i32),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Block(Box<Expr>),
    If(bool, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self) -> i32 {
        match self {
            Expr::Const(v) => *v,
            Expr::Add(a, b) => a.eval().wrapping_add(b.eval()),
            Expr::Sub(a, b) => a.eval().wrapping_sub(b.eval()),
            Expr::Mul(a, b) => a.eval().wrapping_mul(b.eval()),
            Expr::Block(e) => e.eval(),
            Expr::If(c, t, e) => {
                if *c {
                    t.eval()
                } else {
                    e.eval()
                }
            }
        }
    }

    fn lower(&self, out: &mut Vec<Inst>) {
        match self {
            Expr::Const(v) => out.push(Inst::I32Const(*v)),
            Expr::Add(a, b) => {
                a.lower(out);
                b.lower(out);
                out.push(Inst::Numeric(op::I32_ADD));
            }
            Expr::Sub(a, b) => {
                a.lower(out);
                b.lower(out);
                out.push(Inst::Numeric(op::I32_SUB));
            }
            Expr::Mul(a, b) => {
                a.lower(out);
                b.lower(out);
                out.push(Inst::Numeric(op::I32_MUL));
            }
            Expr::Block(e) => {
                let mut body = Vec::new();
                e.lower(&mut body);
                out.push(Inst::Block(BlockType(Some(ValType::I32)), body));
            }
            Expr::If(c, t, e) => {
                let mut then_body = Vec::new();
                t.lower(&mut then_body);
                let mut else_body = Vec::new();
                e.lower(&mut else_body);
                out.push(Inst::I32Const(i32::from(*c)));
                out.push(Inst::If(
                    BlockType(Some(ValType::I32)),
                    then_body,
                    else_body,
                ));
            }
        }
    }
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    let leaf = any::<i32>().prop_map(Expr::Const);
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Expr::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Expr::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Expr::Mul(Box::new(a), Box::new(b))),
            inner.clone().prop_map(|e| Expr::Block(Box::new(e))),
            (any::<bool>(), inner.clone(), inner)
                .prop_map(|(c, t, e)| Expr::If(c, Box::new(t), Box::new(e))),
        ]
    })
}

fn sections_for(expr: &Expr) -> Vec<Section> {
    let mut body = Vec::new();
    expr.lower(&mut body);
    vec![
        Section::Types(vec![FuncType::new(vec![], vec![ValType::I32])]),
        Section::Functions(vec![0]),
        Section::Exports(vec![tidewasm::model::Export {
            name: "f".to_string(),
            desc: tidewasm::model::ExportDesc::Func(0),
        }]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body,
        }]),
    ]
}

fn run_with(engine: &Engine, sections: Vec<Section>) -> i32 {
    let module = Arc::new(engine.compile_sections(sections).unwrap());
    let mut store = Store::new();
    let inst = engine
        .instantiate(&mut store, module, &Imports::new())
        .unwrap();
    match engine.invoke(&mut store, inst, "f", &[]).unwrap() {
        Some(Value::I32(v)) => v,
        other => panic!("expected i32, got {other:?}"),
    }
}

/// Walk a flat body and yield every absolute jump target it contains.
fn collect_low_targets(code: &[u8], order: ByteOrder) -> Vec<usize> {
    let mut targets = Vec::new();
    let mut pc = 0usize;
    let read = |pc: &mut usize| {
        let v = order.read_u32(code, *pc).unwrap() as usize;
        *pc += 4;
        v
    };
    while pc < code.len() {
        let opcode = code[pc];
        pc += 1;
        match opcode {
            op::JUMP | op::JUMP_IF => targets.push(read(&mut pc)),
            op::BR | op::BR_IF => {
                pc += 1; // arity
                let _drop = read(&mut pc);
                targets.push(read(&mut pc));
            }
            op::BR_TABLE => {
                let count = read(&mut pc);
                for _ in 0..=count {
                    pc += 1;
                    let _drop = read(&mut pc);
                    targets.push(read(&mut pc));
                }
            }
            op::CALL
            | op::CALL_INDIRECT
            | op::LOCAL_GET
            | op::LOCAL_SET
            | op::LOCAL_TEE
            | op::GLOBAL_GET
            | op::GLOBAL_SET
            | op::I32_CONST
            | op::F32_CONST
            | 0x28..=0x3E => pc += 4,
            op::I64_CONST | op::F64_CONST => pc += 8,
            _ => {}
        }
    }
    targets
}

proptest! {
    // Property: both back-ends agree with direct evaluation, under every
    // immediate byte order.
    #[test]
    fn backends_agree_on_random_programs(expr in expr_strategy()) {
        let expected = expr.eval();
        let high = Engine::new(EngineConfig::new().backend(Backend::High));
        let low = Engine::new(EngineConfig::new().backend(Backend::Low));
        let low_be = Engine::new(
            EngineConfig::new()
                .backend(Backend::Low)
                .low_byte_order(ByteOrder::Big),
        );
        prop_assert_eq!(run_with(&high, sections_for(&expr)), expected);
        prop_assert_eq!(run_with(&low, sections_for(&expr)), expected);
        prop_assert_eq!(run_with(&low_be, sections_for(&expr)), expected);
    }

    // Property: compiling the same section stream twice yields
    // byte-identical bodies under a fixed configuration.
    #[test]
    fn compilation_is_deterministic(expr in expr_strategy()) {
        for backend in [Backend::High, Backend::Low] {
            let engine = Engine::new(
                EngineConfig::new().backend(backend).low_byte_order(ByteOrder::Little),
            );
            let a = engine.compile_sections(sections_for(&expr)).unwrap();
            let b = engine.compile_sections(sections_for(&expr)).unwrap();
            prop_assert_eq!(a, b);
        }
    }

    // Property: every resolved fixup target in a flat body lies within
    // [0, body_len].
    #[test]
    fn low_level_jump_targets_stay_in_bounds(expr in expr_strategy()) {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let engine = Engine::new(
                EngineConfig::new().backend(Backend::Low).low_byte_order(order),
            );
            let module = engine.compile_sections(sections_for(&expr)).unwrap();
            let code = &module.local_func(0).unwrap().code;
            for target in collect_low_targets(code, order) {
                prop_assert!(target <= code.len(), "target {} past {}", target, code.len());
            }
        }
    }
}
