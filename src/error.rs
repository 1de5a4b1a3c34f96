//! Error types for rootio
//!
//! Provides a unified error type for all operations, plus the codec-level
//! error that byte buffers keep in their sticky error slot.

use std::io;

use thiserror::Error;

/// Result type alias using RootError
pub type Result<T> = std::result::Result<T, RootError>;

/// Unified error type for rootio operations
#[derive(Debug, Error)]
pub enum RootError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("short read at offset {offset}: want {want} bytes, got {got}")]
    ShortRead { offset: u64, want: usize, got: usize },

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("compression failed: {0}")]
    Compress(String),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("record at offset {offset} is a gap (free space)")]
    GapRecord { offset: i64 },

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("no registered factory for class {class:?} (key={key:?})")]
    UnknownClass { class: String, key: String },

    #[error("class {class:?} cannot decode itself from a buffer (key={key:?})")]
    NotUnmarshaler { class: String, key: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error recorded in a byte buffer's sticky slot.
///
/// Cloneable so every call after the first failure can hand back the very
/// same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("buffer too short at pos {pos}: want {want} bytes, have {have}")]
    ShortBuffer { pos: u64, want: usize, have: usize },

    #[error("write failed ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<io::Error> for BufferError {
    fn from(err: io::Error) -> Self {
        BufferError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
