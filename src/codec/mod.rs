//! Byte Codec Module
//!
//! Big-endian read/write buffers for the primitives every stored object is
//! made of.
//!
//! ## Responsibilities
//! - Fixed-width integers and floats, always big-endian
//! - Length-prefixed strings, C-strings, arrays
//! - Versioned class headers with byte counts
//! - Reference table for back-references between objects of one stream
//! - Sticky error slot: first failure wins, later calls are no-ops
//!
//! ## String Format
//! ```text
//! ┌──────────┬──────────────────────────┐
//! │ Len (1)  │ Data (Len bytes)         │   Len in 0..=254
//! └──────────┴──────────────────────────┘
//! ┌──────────┬──────────┬───────────────┐
//! │ 0xFF (1) │ Len (4)  │ Data          │   long strings
//! └──────────┴──────────┴───────────────┘
//! ```
//! The writer emits an empty string as two zero bytes; the reader consumes
//! the first zero byte only.
//!
//! ## Object Reference Format
//! ```text
//! ┌──────────────┬────────────────────┬───────────────────────┐
//! │ ByteCount(4) │ 0xFFFFFFFF (4)     │ ClassName\0 │ Payload │  new class
//! ├──────────────┼────────────────────┼───────────────────────┤
//! │ ByteCount(4) │ ClassRef|0x8000... │ Payload               │  known class
//! ├──────────────┴────────────────────┴───────────────────────┤
//! │ ObjectRef (4)                                             │  back-reference
//! ├───────────────────────────────────────────────────────────┤
//! │ 0x00000000 (4)                                            │  null
//! └───────────────────────────────────────────────────────────┘
//! ```

mod reader;
mod refs;
mod writer;

use std::collections::HashMap;
use std::sync::Arc;

use crate::object::Object;

pub use reader::{RBuffer, Version};
pub use writer::WBuffer;

// =============================================================================
// Shared Constants (used by reader, writer, refs)
// =============================================================================

/// Length byte announcing a 4-byte string length
pub const LONG_STRING_MARKER: u8 = 255;

/// Flag bit marking a byte count in front of a class version
pub const BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// Tag announcing a class name follows
pub const NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;

/// Flag bit marking a class back-reference
pub const CLASS_MASK: u32 = 0x8000_0000;

/// Bias added to stream positions to form reference indices
pub const MAP_OFFSET: i64 = 2;

/// Longest class name accepted in an object reference
pub const MAX_CLASS_NAME: usize = 80;

// =============================================================================
// Reference Table
// =============================================================================

/// An entry in a buffer's reference table
#[derive(Debug, Clone)]
pub enum Ref {
    /// A class announced earlier in the stream
    Class(String),
    /// An object decoded (or encoded) earlier in the stream
    Object(Arc<dyn Object>),
}

/// Reference index → previously seen class or object.
///
/// Hand the map from one buffer to the next to share objects across records.
pub type RefMap = HashMap<i64, Ref>;

/// Encoded size of a length-prefixed string, as produced by [`WBuffer::write_string`]
pub fn string_len(s: &str) -> usize {
    match s.len() {
        0 => 2,
        n if n > 254 => 5 + n,
        n => 1 + n,
    }
}
