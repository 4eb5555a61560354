//! Binary decoding for Wasm MVP modules: byte cursor, LEB128, vector/name
//! helpers, instruction decoding into the structured ADT, and the top-level
//! section parser.
//!
//! This layer reports `BinaryReadError`; the facade wraps it in
//! `DecodeError` at the embedding boundary.

pub mod cursor;
pub mod instr;
pub mod leb128;
pub mod reader;
pub mod sections;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, BinaryReadError>;

/// Errors raised while reading a Wasm binary stream.
#[derive(Debug, Error)]
pub enum BinaryReadError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("LEB128 value does not fit in {target_bits} bits at offset {offset}")]
    Leb128Overflow { target_bits: u8, offset: usize },

    #[error("LEB128 encoding longer than {limit} bytes at offset {offset}")]
    Leb128TooManyBytes { limit: u8, offset: usize },

    #[error("invalid UTF-8 name at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },

    #[error("malformed module at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}
