//! End-to-end execution scenarios, each run under the high-level back-end,
//! the low-level back-end with native byte order, and the low-level
//! back-end with big-endian immediates. The back-ends must be
//! observationally identical.

use std::sync::Arc;

use tidewasm::compile::opcodes::op;
use tidewasm::model::{
    BlockType, DataSegment, ElementSegment, Export, ExportDesc, FuncBody, Global, GlobalType,
    Import, ImportDesc, Inst, Limits, LocalDecl, MemoryType, RefType, TableType,
};
use tidewasm::runtime::{GlobalInstance, MemoryInstance};
use tidewasm::{
    Backend, ByteOrder, Engine, EngineConfig, EngineError, ExportAddr, Extern, FuncType, Imports,
    InstanceHandle, LinkError, Module, Section, Store, Trap, ValType, Value,
};

fn engines() -> Vec<(&'static str, Engine)> {
    vec![
        ("high", Engine::new(EngineConfig::new().backend(Backend::High))),
        ("low", Engine::new(EngineConfig::new().backend(Backend::Low))),
        (
            "low-be",
            Engine::new(
                EngineConfig::new()
                    .backend(Backend::Low)
                    .low_byte_order(ByteOrder::Big),
            ),
        ),
    ]
}

fn setup(engine: &Engine, sections: Vec<Section>) -> (Store, InstanceHandle) {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = Arc::new(engine.compile_sections(sections).unwrap());
    let mut store = Store::new();
    let instance = engine
        .instantiate(&mut store, module, &Imports::new())
        .unwrap();
    (store, instance)
}

fn invoke_i32(
    engine: &Engine,
    store: &mut Store,
    instance: InstanceHandle,
    name: &str,
    args: &[Value],
) -> i32 {
    match engine.invoke(store, instance, name, args).unwrap() {
        Some(Value::I32(v)) => v,
        other => panic!("expected an i32 result, got {other:?}"),
    }
}

fn export_memory(store: &Store, instance: InstanceHandle, name: &str) -> usize {
    match store.get_module(instance.0).unwrap().resolve_export(name) {
        Some(ExportAddr::Memory(addr)) => addr,
        other => panic!("expected a memory export, got {other:?}"),
    }
}

fn func_export(name: &str, idx: u32) -> Export {
    Export {
        name: name.to_string(),
        desc: ExportDesc::Func(idx),
    }
}

/// (module (func (export "add") (param i32 i32) (result i32) ...))
fn add_sections() -> Vec<Section> {
    vec![
        Section::Types(vec![FuncType::new(
            vec![ValType::I32, ValType::I32],
            vec![ValType::I32],
        )]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("add", 0)]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![
                Inst::LocalGet(0),
                Inst::LocalGet(1),
                Inst::Numeric(op::I32_ADD),
            ],
        }]),
    ]
}

#[test]
fn add_returns_sum_and_leaves_stack_empty() {
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, add_sections());
        let got = invoke_i32(&engine, &mut store, inst, "add", &[Value::I32(7), Value::I32(5)]);
        assert_eq!(got, 12, "backend {label}");
        // A second call sees a fresh operand stack.
        let got = invoke_i32(&engine, &mut store, inst, "add", &[Value::I32(-3), Value::I32(3)]);
        assert_eq!(got, 0, "backend {label}");
    }
}

#[test]
fn recursive_fibonacci() {
    // fib(n) = if n < 2 { n } else { fib(n-1) + fib(n-2) }
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![ValType::I32], vec![ValType::I32])]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("fib", 0)]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![
                Inst::LocalGet(0),
                Inst::I32Const(2),
                Inst::Numeric(op::I32_LT_S),
                Inst::If(
                    BlockType(Some(ValType::I32)),
                    vec![Inst::LocalGet(0)],
                    vec![
                        Inst::LocalGet(0),
                        Inst::I32Const(1),
                        Inst::Numeric(op::I32_SUB),
                        Inst::Call(0),
                        Inst::LocalGet(0),
                        Inst::I32Const(2),
                        Inst::Numeric(op::I32_SUB),
                        Inst::Call(0),
                        Inst::Numeric(op::I32_ADD),
                    ],
                ),
            ],
        }]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "fib", &[Value::I32(10)]),
            55,
            "backend {label}"
        );
    }
}

#[test]
fn loop_with_backward_branch() {
    // sum(n): acc = 0; while n != 0 { acc += n; n -= 1 }; acc
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![ValType::I32], vec![ValType::I32])]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("sum", 0)]),
        Section::Code(vec![FuncBody {
            locals: vec![LocalDecl {
                count: 1,
                val_type: ValType::I32,
            }],
            body: vec![
                Inst::Block(
                    BlockType::EMPTY,
                    vec![Inst::Loop(
                        BlockType::EMPTY,
                        vec![
                            Inst::LocalGet(0),
                            Inst::Numeric(op::I32_EQZ),
                            Inst::BrIf(1),
                            Inst::LocalGet(1),
                            Inst::LocalGet(0),
                            Inst::Numeric(op::I32_ADD),
                            Inst::LocalSet(1),
                            Inst::LocalGet(0),
                            Inst::I32Const(1),
                            Inst::Numeric(op::I32_SUB),
                            Inst::LocalSet(0),
                            Inst::Br(0),
                        ],
                    )],
                ),
                Inst::LocalGet(1),
            ],
        }]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "sum", &[Value::I32(10)]),
            55,
            "backend {label}"
        );
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "sum", &[Value::I32(0)]),
            0,
            "backend {label}"
        );
    }
}

#[test]
fn data_segment_initializes_memory() {
    let sections = vec![
        Section::Memories(vec![MemoryType {
            limits: Limits::new(1, None),
        }]),
        Section::Exports(vec![Export {
            name: "memory".to_string(),
            desc: ExportDesc::Memory(0),
        }]),
        Section::Data(vec![DataSegment {
            memory: 0,
            offset: vec![Inst::I32Const(100)],
            init: b"Hello".to_vec(),
        }]),
    ];
    for (label, engine) in engines() {
        let (store, inst) = setup(&engine, sections.clone());
        let mem = store
            .get_memory(export_memory(&store, inst, "memory"))
            .unwrap();
        assert_eq!(mem.read(100, 5).unwrap(), b"Hello", "backend {label}");
        assert_eq!(mem.read(0, 5).unwrap(), &[0, 0, 0, 0, 0], "backend {label}");
    }
}

#[test]
fn divide_by_zero_traps_and_instance_survives() {
    let sections = vec![
        Section::Types(vec![FuncType::new(
            vec![ValType::I32, ValType::I32],
            vec![ValType::I32],
        )]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("div", 0)]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![
                Inst::LocalGet(0),
                Inst::LocalGet(1),
                Inst::Numeric(op::I32_DIV_S),
            ],
        }]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        let err = engine
            .invoke(&mut store, inst, "div", &[Value::I32(1), Value::I32(0)])
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Trap(Trap::IntegerDivideByZero)),
            "backend {label}: {err:?}"
        );
        // The instance keeps working after the trap.
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "div", &[Value::I32(6), Value::I32(3)]),
            2,
            "backend {label}"
        );
    }
}

#[test]
fn br_table_selects_among_labels() {
    // sel(0)=10, sel(1)=20, sel(2)=30, anything else 99.
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![ValType::I32], vec![ValType::I32])]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("sel", 0)]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![
                Inst::Block(
                    BlockType::EMPTY,
                    vec![
                        Inst::Block(
                            BlockType::EMPTY,
                            vec![
                                Inst::Block(
                                    BlockType::EMPTY,
                                    vec![
                                        Inst::Block(
                                            BlockType::EMPTY,
                                            vec![
                                                Inst::LocalGet(0),
                                                Inst::BrTable(vec![0, 1, 2], 3),
                                            ],
                                        ),
                                        Inst::I32Const(10),
                                        Inst::Return,
                                    ],
                                ),
                                Inst::I32Const(20),
                                Inst::Return,
                            ],
                        ),
                        Inst::I32Const(30),
                        Inst::Return,
                    ],
                ),
                Inst::I32Const(99),
            ],
        }]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        for (input, expected) in [(0, 10), (1, 20), (2, 30), (7, 99)] {
            assert_eq!(
                invoke_i32(&engine, &mut store, inst, "sel", &[Value::I32(input)]),
                expected,
                "backend {label}, sel({input})"
            );
        }
    }
}

#[test]
fn memory_grow_returns_previous_size_then_minus_one() {
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![ValType::I32], vec![ValType::I32])]),
        Section::Functions(vec![0]),
        Section::Memories(vec![MemoryType {
            limits: Limits::new(1, Some(2)),
        }]),
        Section::Exports(vec![
            func_export("grow", 0),
            Export {
                name: "memory".to_string(),
                desc: ExportDesc::Memory(0),
            },
        ]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![Inst::LocalGet(0), Inst::MemoryGrow],
        }]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "grow", &[Value::I32(1)]),
            1,
            "backend {label}"
        );
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "grow", &[Value::I32(1)]),
            -1,
            "backend {label}"
        );
        let mem = store
            .get_memory(export_memory(&store, inst, "memory"))
            .unwrap();
        assert_eq!(mem.size_pages(), 2, "backend {label}");
    }
}

#[test]
fn host_function_import_round_trip() {
    let sig = FuncType::new(vec![ValType::I32], vec![ValType::I32]);
    let sections = vec![
        Section::Types(vec![sig.clone()]),
        Section::Imports(vec![Import {
            module: "env".to_string(),
            name: "add_ten".to_string(),
            desc: ImportDesc::Func(0),
        }]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("wrapped", 1)]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![Inst::LocalGet(0), Inst::Call(0)],
        }]),
    ];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile_sections(sections.clone()).unwrap());
        let mut store = Store::new();
        let mut imports = Imports::new();
        imports.func("env", "add_ten", sig.clone(), |args| match args {
            [Value::I32(v)] => Ok(Some(Value::I32(v + 10))),
            _ => Err(Trap::Host("bad arguments".into())),
        });
        let inst = engine.instantiate(&mut store, module, &imports).unwrap();
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "wrapped", &[Value::I32(32)]),
            42,
            "backend {label}"
        );
    }
}

#[test]
fn missing_import_is_a_link_error_with_rollback() {
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![], vec![])]),
        Section::Imports(vec![Import {
            module: "env".to_string(),
            name: "absent".to_string(),
            desc: ImportDesc::Func(0),
        }]),
    ];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile_sections(sections.clone()).unwrap());
        let mut store = Store::new();
        let mark = store.watermark();
        let err = engine
            .instantiate(&mut store, module, &Imports::new())
            .unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::Link(LinkError::UnresolvedImport { .. })
            ),
            "backend {label}: {err:?}"
        );
        assert_eq!(store.watermark(), mark, "backend {label}");
    }
}

#[test]
fn imported_global_feeds_initializer_and_export() {
    let sections = vec![
        Section::Imports(vec![Import {
            module: "env".to_string(),
            name: "base".to_string(),
            desc: ImportDesc::Global(GlobalType::new(ValType::I32, false)),
        }]),
        Section::Globals(vec![Global {
            ty: GlobalType::new(ValType::I32, true),
            init: vec![Inst::GlobalGet(0)],
        }]),
        Section::Exports(vec![Export {
            name: "counter".to_string(),
            desc: ExportDesc::Global(1),
        }]),
    ];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile_sections(sections.clone()).unwrap());
        let mut store = Store::new();
        let base = store.alloc_global(GlobalInstance::new(
            GlobalType::new(ValType::I32, false),
            Value::I32(40),
        ));
        let mut imports = Imports::new();
        imports.define("env", "base", Extern::Global(base));
        let inst = engine.instantiate(&mut store, module, &imports).unwrap();

        let addr = match store.get_module(inst.0).unwrap().resolve_export("counter") {
            Some(ExportAddr::Global(a)) => a,
            other => panic!("expected a global export, got {other:?}"),
        };
        assert_eq!(
            store.get_global(addr).unwrap().get(),
            Value::I32(40),
            "backend {label}"
        );
        // The export is mutable from the host side.
        store
            .get_global_mut(addr)
            .unwrap()
            .set(Value::I32(41))
            .unwrap();
        assert_eq!(store.get_global(addr).unwrap().get(), Value::I32(41));
    }
}

#[test]
fn globals_read_and_written_by_code() {
    let sections = vec![
        Section::Types(vec![
            FuncType::new(vec![], vec![ValType::I32]),
            FuncType::new(vec![ValType::I32], vec![]),
        ]),
        Section::Functions(vec![0, 1]),
        Section::Globals(vec![Global {
            ty: GlobalType::new(ValType::I32, true),
            init: vec![Inst::I32Const(5)],
        }]),
        Section::Exports(vec![func_export("get", 0), func_export("set", 1)]),
        Section::Code(vec![
            FuncBody {
                locals: vec![],
                body: vec![Inst::GlobalGet(0)],
            },
            FuncBody {
                locals: vec![],
                body: vec![Inst::LocalGet(0), Inst::GlobalSet(0)],
            },
        ]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        assert_eq!(invoke_i32(&engine, &mut store, inst, "get", &[]), 5);
        engine
            .invoke(&mut store, inst, "set", &[Value::I32(9)])
            .unwrap();
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "get", &[]),
            9,
            "backend {label}"
        );
    }
}

fn indirect_sections() -> Vec<Section> {
    // Table [f0: ()->i32 at 0, f1: (i32)->i32 at 1], slot 2 left empty.
    vec![
        Section::Types(vec![
            FuncType::new(vec![], vec![ValType::I32]),
            FuncType::new(vec![ValType::I32], vec![ValType::I32]),
            FuncType::new(vec![ValType::I32], vec![ValType::I32]),
        ]),
        Section::Functions(vec![0, 1, 2]),
        Section::Tables(vec![TableType {
            elem: RefType::FuncRef,
            limits: Limits::new(3, None),
        }]),
        Section::Exports(vec![func_export("pick", 2)]),
        Section::Elements(vec![ElementSegment {
            table: 0,
            offset: vec![Inst::I32Const(0)],
            init: vec![0, 1],
        }]),
        Section::Code(vec![
            FuncBody {
                locals: vec![],
                body: vec![Inst::I32Const(30)],
            },
            FuncBody {
                locals: vec![],
                body: vec![Inst::LocalGet(0)],
            },
            // pick(slot): call_indirect with type 0 (() -> i32)
            FuncBody {
                locals: vec![],
                body: vec![Inst::LocalGet(0), Inst::CallIndirect(0)],
            },
        ]),
    ]
}

#[test]
fn call_indirect_checks_table_and_signature() {
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, indirect_sections());
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "pick", &[Value::I32(0)]),
            30,
            "backend {label}"
        );
        // Slot 1 holds a function of a different signature.
        let err = engine
            .invoke(&mut store, inst, "pick", &[Value::I32(1)])
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Trap(Trap::IndirectCallTypeMismatch)),
            "backend {label}: {err:?}"
        );
        // Slot 2 is uninitialized.
        let err = engine
            .invoke(&mut store, inst, "pick", &[Value::I32(2)])
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Trap(Trap::UninitializedElement)),
            "backend {label}: {err:?}"
        );
        // Index 9 is outside the table.
        let err = engine
            .invoke(&mut store, inst, "pick", &[Value::I32(9)])
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Trap(Trap::TableOutOfBounds)),
            "backend {label}: {err:?}"
        );
    }
}

#[test]
fn element_segment_out_of_bounds_aborts_instantiation() {
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![], vec![])]),
        Section::Functions(vec![0]),
        Section::Tables(vec![TableType {
            elem: RefType::FuncRef,
            limits: Limits::new(1, None),
        }]),
        Section::Elements(vec![ElementSegment {
            table: 0,
            offset: vec![Inst::I32Const(5)],
            init: vec![0],
        }]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![],
        }]),
    ];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile_sections(sections.clone()).unwrap());
        let mut store = Store::new();
        let mark = store.watermark();
        let err = engine
            .instantiate(&mut store, module, &Imports::new())
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Link(LinkError::ElemOutOfBounds)),
            "backend {label}: {err:?}"
        );
        assert_eq!(store.watermark(), mark, "backend {label}");
    }
}

#[test]
fn start_function_runs_before_exports_are_used() {
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![], vec![])]),
        Section::Functions(vec![0]),
        Section::Memories(vec![MemoryType {
            limits: Limits::new(1, None),
        }]),
        Section::Exports(vec![Export {
            name: "memory".to_string(),
            desc: ExportDesc::Memory(0),
        }]),
        Section::Start(0),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![
                Inst::I32Const(0),
                Inst::I32Const(7),
                Inst::Store(op::I32_STORE, tidewasm::model::instr::MemArg::default()),
            ],
        }]),
    ];
    for (label, engine) in engines() {
        let (store, inst) = setup(&engine, sections.clone());
        let mem = store
            .get_memory(export_memory(&store, inst, "memory"))
            .unwrap();
        assert_eq!(mem.load(0, 4).unwrap(), 7, "backend {label}");
    }
}

#[test]
fn start_trap_aborts_instantiation_with_rollback() {
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![], vec![])]),
        Section::Functions(vec![0]),
        Section::Start(0),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![Inst::Unreachable],
        }]),
    ];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile_sections(sections.clone()).unwrap());
        let mut store = Store::new();
        let mark = store.watermark();
        let err = engine
            .instantiate(&mut store, module, &Imports::new())
            .unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::Link(LinkError::StartTrap(Trap::Unreachable))
            ),
            "backend {label}: {err:?}"
        );
        assert_eq!(store.watermark(), mark, "backend {label}");
    }
}

#[test]
fn host_memory_is_shared_between_instances() {
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![], vec![ValType::I32])]),
        Section::Imports(vec![Import {
            module: "env".to_string(),
            name: "memory".to_string(),
            desc: ImportDesc::Memory(MemoryType {
                limits: Limits::new(1, None),
            }),
        }]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("peek", 0)]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![
                Inst::I32Const(16),
                Inst::Load(op::I32_LOAD, tidewasm::model::instr::MemArg::default()),
            ],
        }]),
    ];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile_sections(sections.clone()).unwrap());
        let mut store = Store::new();
        let maddr = store.alloc_memory(MemoryInstance::new(
            &MemoryType {
                limits: Limits::new(1, None),
            },
            false,
        ));
        let mut imports = Imports::new();
        imports.define("env", "memory", Extern::Memory(maddr));

        let a = engine
            .instantiate(&mut store, module.clone(), &imports)
            .unwrap();
        let b = engine.instantiate(&mut store, module, &imports).unwrap();

        store.get_memory_mut(maddr).unwrap().store(16, 4, 123).unwrap();
        assert_eq!(
            invoke_i32(&engine, &mut store, a, "peek", &[]),
            123,
            "backend {label}"
        );
        assert_eq!(
            invoke_i32(&engine, &mut store, b, "peek", &[]),
            123,
            "backend {label}"
        );
    }
}

#[test]
fn incompatible_memory_import_limits_fail_to_link() {
    let sections = vec![Section::Imports(vec![Import {
        module: "env".to_string(),
        name: "memory".to_string(),
        desc: ImportDesc::Memory(MemoryType {
            limits: Limits::new(2, Some(2)),
        }),
    }])];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile_sections(sections.clone()).unwrap());
        let mut store = Store::new();
        // One page, no declared maximum: fails both limit rules.
        let maddr = store.alloc_memory(MemoryInstance::new(
            &MemoryType {
                limits: Limits::new(1, None),
            },
            false,
        ));
        let mut imports = Imports::new();
        imports.define("env", "memory", Extern::Memory(maddr));
        let err = engine
            .instantiate(&mut store, module, &imports)
            .unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::Link(LinkError::IncompatibleLimits { .. })
            ),
            "backend {label}: {err:?}"
        );
    }
}

#[test]
fn deep_recursion_exhausts_the_call_stack() {
    // f(n) = f(n + 1), forever.
    let sections = vec![
        Section::Types(vec![FuncType::new(vec![ValType::I32], vec![ValType::I32])]),
        Section::Functions(vec![0]),
        Section::Exports(vec![func_export("spin", 0)]),
        Section::Code(vec![FuncBody {
            locals: vec![],
            body: vec![
                Inst::LocalGet(0),
                Inst::I32Const(1),
                Inst::Numeric(op::I32_ADD),
                Inst::Call(0),
            ],
        }]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        let err = engine
            .invoke(&mut store, inst, "spin", &[Value::I32(0)])
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Trap(Trap::CallStackExhausted)),
            "backend {label}: {err:?}"
        );
    }
}

#[test]
fn unknown_export_and_bad_arguments_are_embedding_errors() {
    for (_, engine) in engines() {
        let (mut store, inst) = setup(&engine, add_sections());
        assert!(matches!(
            engine.invoke(&mut store, inst, "nope", &[]),
            Err(EngineError::UnknownExport(_))
        ));
        assert!(matches!(
            engine.invoke(&mut store, inst, "add", &[Value::I32(1)]),
            Err(EngineError::ArgumentMismatch { .. })
        ));
        assert!(matches!(
            engine.invoke(&mut store, inst, "add", &[Value::I64(1), Value::I64(2)]),
            Err(EngineError::ArgumentMismatch { .. })
        ));
    }
}

#[test]
fn compiles_and_runs_from_raw_binary() {
    // (module (func (export "add") (param i32 i32) (result i32)
    //   local.get 0 local.get 1 i32.add))
    let bytes: &[u8] = &[
        0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, //
        0x01, 0x07, 0x01, 0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7F, //
        0x03, 0x02, 0x01, 0x00, //
        0x07, 0x07, 0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00, //
        0x0A, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B,
    ];
    for (label, engine) in engines() {
        let module = Arc::new(engine.compile(bytes).unwrap());
        let mut store = Store::new();
        let inst = engine
            .instantiate(&mut store, module, &Imports::new())
            .unwrap();
        assert_eq!(
            invoke_i32(&engine, &mut store, inst, "add", &[Value::I32(30), Value::I32(12)]),
            42,
            "backend {label}"
        );
    }
}

#[test]
fn custom_sections_are_retained_on_the_module() {
    let mut sections = add_sections();
    sections.push(Section::Custom {
        name: "producers".to_string(),
        bytes: vec![1, 2, 3],
    });
    let engine = Engine::default();
    let module: Module = engine.compile_sections(sections).unwrap();
    assert_eq!(module.customs.len(), 1);
    assert_eq!(module.customs[0].name, "producers");
    assert_eq!(module.customs[0].bytes, vec![1, 2, 3]);
}

#[test]
fn i64_and_float_values_round_trip_through_exports() {
    let sections = vec![
        Section::Types(vec![
            FuncType::new(vec![ValType::I64, ValType::I64], vec![ValType::I64]),
            FuncType::new(vec![ValType::F64, ValType::F64], vec![ValType::F64]),
        ]),
        Section::Functions(vec![0, 1]),
        Section::Exports(vec![func_export("add64", 0), func_export("addf", 1)]),
        Section::Code(vec![
            FuncBody {
                locals: vec![],
                body: vec![
                    Inst::LocalGet(0),
                    Inst::LocalGet(1),
                    Inst::Numeric(op::I64_ADD),
                ],
            },
            FuncBody {
                locals: vec![],
                body: vec![
                    Inst::LocalGet(0),
                    Inst::LocalGet(1),
                    Inst::Numeric(op::F64_ADD),
                ],
            },
        ]),
    ];
    for (label, engine) in engines() {
        let (mut store, inst) = setup(&engine, sections.clone());
        let big = 1i64 << 40;
        assert_eq!(
            engine
                .invoke(
                    &mut store,
                    inst,
                    "add64",
                    &[Value::I64(big), Value::I64(2)]
                )
                .unwrap(),
            Some(Value::I64(big + 2)),
            "backend {label}"
        );
        assert_eq!(
            engine
                .invoke(
                    &mut store,
                    inst,
                    "addf",
                    &[Value::f64(1.5), Value::f64(2.25)]
                )
                .unwrap(),
            Some(Value::f64(3.75)),
            "backend {label}"
        );
    }
}
