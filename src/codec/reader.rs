//! Read buffer
//!
//! Decodes big-endian primitives from an in-memory byte slice. Every read
//! returns a plain value; the first failure is parked in the error slot and
//! all later reads return zero values without touching the data.

use bytes::{Buf, Bytes};

use crate::error::BufferError;

use super::{RefMap, BYTE_COUNT_MASK, LONG_STRING_MARKER};

/// Class version header, as returned by [`RBuffer::read_version`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Class version
    pub version: i16,
    /// Stream position of the header
    pub start: i64,
    /// Bytes following the byte-count field (0 if none was written)
    pub byte_count: u32,
}

/// Read-only buffer over one record's payload
#[derive(Debug)]
pub struct RBuffer {
    /// Payload bytes
    data: Bytes,
    /// Cursor into `data`
    cursor: usize,
    /// Position bias: stream position of `data[0]`
    offset: u32,
    /// Sticky error slot
    err: Option<BufferError>,
    /// Back-reference table
    pub(super) refs: RefMap,
}

macro_rules! read_primitive {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $get:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> $ty {
            self.take(std::mem::size_of::<$ty>())
                .map(|mut b| b.$get())
                .unwrap_or_default()
        }
    };
}

macro_rules! read_arrays {
    ($fast:ident, $stat:ident, $ty:ty, $get:ident) => {
        /// Read `n` consecutive elements
        pub fn $fast(&mut self, n: usize) -> Vec<$ty> {
            let size = std::mem::size_of::<$ty>();
            match n.checked_mul(size).and_then(|len| self.take(len)) {
                Some(mut b) => (0..n).map(|_| b.$get()).collect(),
                None => {
                    self.fail_short(n.saturating_mul(size));
                    Vec::new()
                }
            }
        }

        /// Read an `i32` element count followed by the elements
        pub fn $stat(&mut self) -> Vec<$ty> {
            let n = self.read_i32();
            if n < 0 {
                self.fail(BufferError::InvalidData(format!(
                    "negative array length {}",
                    n
                )));
                return Vec::new();
            }
            self.$fast(n as usize)
        }
    };
}

impl RBuffer {
    /// Create a buffer over `data`.
    ///
    /// `offset` is the stream position of the first byte (the record's
    /// header length when decoding a record payload); `refs` carries
    /// references over from a previous buffer.
    pub fn new(data: impl Into<Bytes>, refs: Option<RefMap>, offset: u32) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
            offset,
            err: None,
            refs: refs.unwrap_or_default(),
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

    /// Stream position (cursor plus offset bias)
    pub fn pos(&self) -> i64 {
        self.cursor as i64 + i64::from(self.offset)
    }

    /// Move the cursor to stream position `pos`
    pub fn set_pos(&mut self, pos: i64) {
        if self.err.is_some() {
            return;
        }
        let rel = pos - i64::from(self.offset);
        if rel < 0 || rel as usize > self.data.len() {
            self.fail(BufferError::InvalidData(format!(
                "position {} outside buffer [{}, {}]",
                pos,
                self.offset,
                i64::from(self.offset) + self.data.len() as i64
            )));
            return;
        }
        self.cursor = rel as usize;
    }

    /// Total payload length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
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

    fn fail_short(&mut self, want: usize) {
        let err = BufferError::ShortBuffer {
            pos: self.pos() as u64,
            want,
            have: self.remaining(),
        };
        self.fail(err);
    }

    /// Consume exactly `n` bytes, or record a short-buffer error
    fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.err.is_some() {
            return None;
        }
        if self.remaining() < n {
            self.fail_short(n);
            return None;
        }
        let start = self.cursor;
        self.cursor += n;
        Some(&self.data[start..start + n])
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    read_primitive!(read_i8, i8, get_i8);
    read_primitive!(read_i16, i16, get_i16);
    read_primitive!(read_i32, i32, get_i32);
    read_primitive!(read_i64, i64, get_i64);
    read_primitive!(read_u8, u8, get_u8);
    read_primitive!(read_u16, u16, get_u16);
    read_primitive!(read_u32, u32, get_u32);
    read_primitive!(read_u64, u64, get_u64);
    read_primitive!(read_f32, f32, get_f32);
    read_primitive!(read_f64, f64, get_f64);

    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Skip `n` bytes
    pub fn skip(&mut self, n: usize) {
        let _ = self.take(n);
    }

    /// Read `n` raw bytes without copying
    pub fn read_bytes(&mut self, n: usize) -> Bytes {
        let start = self.cursor;
        match self.take(n) {
            Some(_) => self.data.slice(start..start + n),
            None => Bytes::new(),
        }
    }

    // =========================================================================
    // Strings
    // =========================================================================

    /// Read a length-prefixed string.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_string(&mut self) -> String {
        let mut len = usize::from(self.read_u8());
        if len == usize::from(LONG_STRING_MARKER) {
            len = self.read_u32() as usize;
        }
        self.take(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Read a NUL-terminated string of at most `max` bytes.
    ///
    /// Stops after `max` bytes even if no terminator was found.
    pub fn read_cstring(&mut self, max: usize) -> String {
        if self.err.is_some() {
            return String::new();
        }
        let window = &self.data[self.cursor..];
        let limit = window.len().min(max);
        match window[..limit].iter().position(|&b| b == 0) {
            Some(nul) => {
                let s = String::from_utf8_lossy(&window[..nul]).into_owned();
                self.cursor += nul + 1;
                s
            }
            None if limit == max => {
                let s = String::from_utf8_lossy(&window[..limit]).into_owned();
                self.cursor += limit;
                s
            }
            None => {
                self.fail_short(limit + 1);
                String::new()
            }
        }
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    read_arrays!(read_fast_array_i8, read_static_array_i8, i8, get_i8);
    read_arrays!(read_fast_array_i16, read_static_array_i16, i16, get_i16);
    read_arrays!(read_fast_array_i32, read_static_array_i32, i32, get_i32);
    read_arrays!(read_fast_array_i64, read_static_array_i64, i64, get_i64);
    read_arrays!(read_fast_array_u8, read_static_array_u8, u8, get_u8);
    read_arrays!(read_fast_array_u16, read_static_array_u16, u16, get_u16);
    read_arrays!(read_fast_array_u32, read_static_array_u32, u32, get_u32);
    read_arrays!(read_fast_array_u64, read_static_array_u64, u64, get_u64);
    read_arrays!(read_fast_array_f32, read_static_array_f32, f32, get_f32);
    read_arrays!(read_fast_array_f64, read_static_array_f64, f64, get_f64);

    // =========================================================================
    // Class headers
    // =========================================================================

    /// Read a class version, with its byte count when one was written.
    ///
    /// Without the byte-count flag the first two bytes are the version.
    pub fn read_version(&mut self) -> Version {
        let start = self.pos();
        let mut version = Version {
            version: 0,
            start,
            byte_count: 0,
        };
        if self.err.is_some() {
            return version;
        }

        let has_count = self.remaining() >= 4
            && (&self.data[self.cursor..self.cursor + 4]).get_u32() & BYTE_COUNT_MASK != 0;
        if has_count {
            version.byte_count = self.read_u32() & !BYTE_COUNT_MASK;
        }
        version.version = self.read_i16();
        version
    }

    /// Verify a class payload against the announced byte count.
    ///
    /// A short read is realigned to the end of the payload; reading past it
    /// is an error.
    pub fn check_byte_count(&mut self, version: &Version, class: &str) -> Result<(), BufferError> {
        self.status()?;
        if version.byte_count == 0 {
            return Ok(());
        }
        let consumed = self.pos() - version.start;
        let expected = i64::from(version.byte_count) + 4;
        if consumed < expected {
            tracing::warn!(
                "{}: read {} bytes, byte count says {}; skipping the rest",
                class,
                consumed,
                expected
            );
            self.set_pos(version.start + expected);
        } else if consumed > expected {
            self.fail(BufferError::InvalidData(format!(
                "{}: byte count mismatch (read {} bytes, expected {})",
                class, consumed, expected
            )));
        }
        self.status()
    }
}
