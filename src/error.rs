//! Crate-level error types, one enum per failure domain.
//!
//! Nothing is caught internally: every error propagates to the embedding
//! boundary. `EngineError` is the umbrella the facade methods return.

use thiserror::Error;

/// Malformed input bytes. Raised by the binary decoder and passed through.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Binary(#[from] crate::binary::BinaryReadError),

    #[error("failed to read module bytes")]
    Io(#[from] std::io::Error),
}

/// Well-formed but ill-typed module.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown type index {index} (module declares {count} types)")]
    UnknownType { index: u32, count: usize },

    #[error("unknown function index {index}")]
    UnknownFunction { index: u32 },

    #[error("unknown table index {index}")]
    UnknownTable { index: u32 },

    #[error("unknown memory index {index}")]
    UnknownMemory { index: u32 },

    #[error("unknown global index {index}")]
    UnknownGlobal { index: u32 },

    #[error("unknown local index {index} in function {func}")]
    UnknownLocal { func: u32, index: u32 },

    #[error("branch depth {depth} exceeds block nesting {nesting} in function {func}")]
    BranchDepth { func: u32, depth: u32, nesting: u32 },

    #[error("duplicate export name `{0}`")]
    DuplicateExport(String),

    #[error("start function must have type [] -> [], index {0}")]
    BadStartSignature(u32),

    #[error("multiple memories are not allowed")]
    MultipleMemories,

    #[error("limits invalid: max {max} < min {min}")]
    BadLimits { min: u32, max: u32 },

    #[error("function and code section lengths differ ({functions} vs {bodies})")]
    FunctionCodeMismatch { functions: usize, bodies: usize },

    #[error("unsupported initializer instruction (only constants and imported immutable global.get)")]
    BadInitExpr,

    #[error("write to immutable global {0}")]
    ImmutableGlobal(u32),

    #[error("section `{0}` appears more than once")]
    DuplicateSection(&'static str),

    #[error("result arity {0} exceeds the single-value limit")]
    MultiValue(usize),
}

/// Instantiation failed: an import is missing or incompatible, an
/// initializer misbehaved, or the start function trapped.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("unresolved import: {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("import type mismatch ({context}): expected {expected}, found {found}")]
    TypeMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    #[error("incompatible limits for import {module}.{name}")]
    IncompatibleLimits { module: String, name: String },

    #[error("element segment does not fit in table")]
    ElemOutOfBounds,

    #[error("data segment does not fit in memory")]
    DataOutOfBounds,

    #[error("initializer evaluation failed")]
    InitTrap(#[source] Trap),

    #[error("trap while running the start function")]
    StartTrap(#[source] Trap),

    #[error("invalid store address for import {module}.{name}")]
    BadImportAddress { module: String, name: String },
}

/// Runtime abort inside the interpreter, visible to the host as a typed
/// error. Committed memory/global writes stay visible after a trap.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("integer divide by zero")]
    IntegerDivideByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,

    #[error("out of bounds memory access")]
    MemoryOutOfBounds,

    #[error("out of bounds table access")]
    TableOutOfBounds,

    #[error("uninitialized table element")]
    UninitializedElement,

    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,

    #[error("call stack exhausted")]
    CallStackExhausted,

    #[error("operand stack exhausted")]
    OperandStackExhausted,

    #[error("host function error: {0}")]
    Host(String),

    /// Compiled-code decoding went wrong at runtime. Never expected on
    /// bodies produced by this crate's compilers.
    #[error("corrupt compiled body: {0}")]
    CorruptCode(&'static str),
}

/// Internal invariant violation during compilation. Never expected on
/// validated input.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unresolved label {0} after fixup")]
    UnresolvedLabel(u32),

    #[error("branch depth {depth} has no matching label frame")]
    BranchDepthOutOfRange { depth: u32 },

    #[error("operand accounting underflow in label frame")]
    OperandUnderflow,

    #[error("section `{0}` appears more than once")]
    DuplicateSection(&'static str),

    #[error("unknown type index {0} during compilation")]
    UnknownType(u32),

    #[error("unknown function index {0} during compilation")]
    UnknownFunction(u32),

    #[error("compiled body exceeds 4 GiB")]
    BodyTooLarge,
}

/// Umbrella error for the engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Trap(#[from] Trap),

    #[error("unknown export `{0}`")]
    UnknownExport(String),

    #[error("export `{0}` is not a function")]
    NotCallable(String),

    #[error("argument mismatch: expected {expected}, found {found}")]
    ArgumentMismatch { expected: String, found: String },

    #[error("invalid instance handle")]
    BadInstance,
}
