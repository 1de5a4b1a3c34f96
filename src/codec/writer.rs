//! Write buffer
//!
//! Encodes big-endian primitives into an in-memory sink, mirroring
//! [`RBuffer`](super::RBuffer). The sink may be bounded to model a
//! fixed-size region; overflowing it is the buffer's failure mode.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::BufferError;

use super::{RefMap, BYTE_COUNT_MASK, LONG_STRING_MARKER};

/// Write-only buffer producing one record's bytes
#[derive(Debug)]
pub struct WBuffer {
    /// Bytes written so far
    data: BytesMut,
    /// Maximum number of bytes the sink accepts
    limit: Option<usize>,
    /// Position bias: stream position of the first byte
    offset: u32,
    /// Sticky error slot
    err: Option<BufferError>,
    /// Back-reference table
    pub(super) refs: RefMap,
}

macro_rules! write_primitive {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, v: $ty) {
            self.write(&v.to_be_bytes());
        }
    };
}

macro_rules! write_arrays {
    ($fast:ident, $stat:ident, $ty:ty) => {
        /// Write the elements without a count
        pub fn $fast(&mut self, vs: &[$ty]) {
            for v in vs {
                self.write(&v.to_be_bytes());
            }
        }

        /// Write an `i32` element count followed by the elements
        pub fn $stat(&mut self, vs: &[$ty]) {
            match i32::try_from(vs.len()) {
                Ok(n) => {
                    self.write_i32(n);
                    self.$fast(vs);
                }
                Err(_) => self.fail(BufferError::InvalidData(format!(
                    "array of {} elements too long",
                    vs.len()
                ))),
            }
        }
    };
}

impl WBuffer {
    /// Create an unbounded buffer whose first byte sits at stream position `offset`
    pub fn new(refs: Option<RefMap>, offset: u32) -> Self {
        Self {
            data: BytesMut::new(),
            limit: None,
            offset,
            err: None,
            refs: refs.unwrap_or_default(),
        }
    }

    /// Create a buffer that fails once more than `limit` bytes are written
    pub fn with_limit(limit: usize, refs: Option<RefMap>, offset: u32) -> Self {
        Self {
            data: BytesMut::with_capacity(limit),
            limit: Some(limit),
            ..Self::new(refs, offset)
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// The first error hit by this buffer, if any
    pub fn err(&self) -> Option<&BufferError> {
        self.err.as_ref()
    }

    /// `Err` with the sticky error, if one is set
    pub fn status(&self) -> Result<(), BufferError> {
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Stream position (bytes written plus offset bias)
    pub fn pos(&self) -> i64 {
        self.data.len() as i64 + i64::from(self.offset)
    }

    /// Number of bytes written
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes written so far
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the written bytes, or return the sticky error
    pub fn into_bytes(self) -> Result<Bytes, BufferError> {
        self.status()?;
        Ok(self.data.freeze())
    }

    /// Reference table collected so far
    pub fn refs(&self) -> &RefMap {
        &self.refs
    }

    /// Hand the reference table to the next buffer
    pub fn into_refs(self) -> RefMap {
        self.refs
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn fail(&mut self, err: BufferError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn write(&mut self, p: &[u8]) {
        if self.err.is_some() {
            return;
        }
        if let Some(limit) = self.limit {
            if self.data.len() + p.len() > limit {
                self.fail(
                    io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!(
                            "sink full: {} of {} bytes used, {} more requested",
                            self.data.len(),
                            limit,
                            p.len()
                        ),
                    )
                    .into(),
                );
                return;
            }
        }
        self.data.put_slice(p);
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    write_primitive!(write_i8, i8);
    write_primitive!(write_i16, i16);
    write_primitive!(write_i32, i32);
    write_primitive!(write_i64, i64);
    write_primitive!(write_u8, u8);
    write_primitive!(write_u16, u16);
    write_primitive!(write_u32, u32);
    write_primitive!(write_u64, u64);
    write_primitive!(write_f32, f32);
    write_primitive!(write_f64, f64);

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, p: &[u8]) {
        self.write(p);
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Write a length-prefixed string.
    ///
    /// An empty string is written as two zero bytes: the length byte and an
    /// extra zero. Files in the wild carry this framing, so it stays.
    pub fn write_string(&mut self, s: &str) {
        if self.err.is_some() {
            return;
        }
        if s.len() > 254 {
            match u32::try_from(s.len()) {
                Ok(n) => {
                    self.write_u8(LONG_STRING_MARKER);
                    self.write_u32(n);
                }
                Err(_) => {
                    self.fail(BufferError::InvalidData(format!(
                        "string of {} bytes too long",
                        s.len()
                    )));
                    return;
                }
            }
        } else {
            self.write_u8(s.len() as u8);
        }
        if s.is_empty() {
            self.write_u8(0);
        }
        self.write(s.as_bytes());
    }

    /// Write a NUL-terminated string
    pub fn write_cstring(&mut self, s: &str) {
        self.write(s.as_bytes());
        self.write_u8(0);
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    write_arrays!(write_fast_array_i8, write_static_array_i8, i8);
    write_arrays!(write_fast_array_i16, write_static_array_i16, i16);
    write_arrays!(write_fast_array_i32, write_static_array_i32, i32);
    write_arrays!(write_fast_array_i64, write_static_array_i64, i64);
    write_arrays!(write_fast_array_u8, write_static_array_u8, u8);
    write_arrays!(write_fast_array_u16, write_static_array_u16, u16);
    write_arrays!(write_fast_array_u32, write_static_array_u32, u32);
    write_arrays!(write_fast_array_u64, write_static_array_u64, u64);
    write_arrays!(write_fast_array_f32, write_static_array_f32, f32);
    write_arrays!(write_fast_array_f64, write_static_array_f64, f64);

    // =========================================================================
    // Class headers
    // =========================================================================

    /// Reserve a byte count and write a class version.
    ///
    /// Returns the header position to hand to [`WBuffer::set_byte_count`].
    pub fn write_version(&mut self, version: i16) -> i64 {
        let start = self.pos();
        self.write_u32(0);
        self.write_i16(version);
        start
    }

    /// Patch the byte count reserved at `start` to cover everything written since
    pub fn set_byte_count(&mut self, start: i64, class: &str) {
        if self.err.is_some() {
            return;
        }
        let rel = start - i64::from(self.offset);
        if rel < 0 || rel as usize + 4 > self.data.len() {
            self.fail(BufferError::InvalidData(format!(
                "{}: byte count position {} outside buffer",
                class, start
            )));
            return;
        }
        let count = self.pos() - start - 4;
        if count < 0 || count as u64 >= u64::from(BYTE_COUNT_MASK) {
            self.fail(BufferError::InvalidData(format!(
                "{}: byte count {} out of range",
                class, count
            )));
            return;
        }
        let rel = rel as usize;
        let patch = (count as u32 | BYTE_COUNT_MASK).to_be_bytes();
        self.data[rel..rel + 4].copy_from_slice(&patch);
    }
}
