//! Record walk
//!
//! Visits every record stored back to back in a byte range, in file order.
//! Each record starts with its header, whose total length gives the offset
//! of the next one; a negative total length marks that many free bytes.

use bytes::Buf;

use crate::codec::RBuffer;
use crate::error::{Result, RootError};
use crate::file::{FileRef, RangeReader};
use crate::key::{Key, FIXED_HEADER_LEN};

/// Iterator over the records in `[begin, end)` of a file
#[derive(Debug)]
pub struct RecordWalker {
    file: FileRef,
    pos: i64,
    end: i64,
}

impl RecordWalker {
    /// Walk from `begin` up to `end` (exclusive)
    pub fn new(file: FileRef, begin: i64, end: i64) -> Self {
        Self { file, pos: begin, end }
    }

    /// Walk from `begin` to the end of the file
    pub fn to_end(file: FileRef, begin: i64) -> Self {
        let end = file.size() as i64;
        Self::new(file, begin, end)
    }

    /// Offset of the next record
    pub fn position(&self) -> i64 {
        self.pos
    }

    fn next_record(&mut self) -> Result<Key> {
        let at = self.pos;
        let avail = (self.end - at) as usize;
        if at < 0 {
            return Err(RootError::Malformed(format!("negative record offset {}", at)));
        }

        let prefix_len = FIXED_HEADER_LEN.min(avail);
        let prefix = self.file.read_at(at as u64, prefix_len)?;
        if prefix.len() < 4 {
            return Err(RootError::Malformed(format!(
                "{} trailing bytes at {} cannot hold a record",
                avail, at
            )));
        }

        let bytes = (&prefix[..4]).get_i32();
        if bytes < 0 {
            let key = Key::gap(at, bytes);
            self.pos = at + i64::from(bytes.unsigned_abs());
            return Ok(key);
        }
        if bytes == 0 {
            return Err(RootError::Malformed(format!("zero-length record at {}", at)));
        }
        if prefix.len() < FIXED_HEADER_LEN {
            return Err(RootError::Malformed(format!(
                "record at {} truncated before its header",
                at
            )));
        }

        let keylen = (&prefix[14..16]).get_i16();
        if keylen <= 0 || i32::from(keylen) > bytes {
            return Err(RootError::Malformed(format!(
                "record at {}: header length {} with total length {}",
                at, keylen, bytes
            )));
        }
        let header = self
            .file
            .read_at(at as u64, (keylen as usize).min(avail))?;
        let mut r = RBuffer::new(header, None, 0);
        let mut key = Key::decode(&mut r, Some(self.file.clone()))?;

        if key.seek_key() != at {
            tracing::warn!(
                "record at {} claims to be at {}; trusting the walk",
                at,
                key.seek_key()
            );
            key.set_seek_key(at);
        }
        let next = at + i64::from(bytes);
        if next > self.end {
            tracing::warn!(
                "record {:?} at {} overruns the walk range by {} bytes",
                key.name(),
                at,
                next - self.end
            );
        }
        self.pos = next;
        Ok(key)
    }
}

impl Iterator for RecordWalker {
    type Item = Result<Key>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        match self.next_record() {
            Ok(key) => Some(Ok(key)),
            Err(err) => {
                // Nothing after a broken header can be located.
                self.pos = self.end;
                Some(Err(err))
            }
        }
    }
}

/// Collect every record header in `[begin, end)`
pub fn walk(file: FileRef, begin: i64, end: i64) -> Result<Vec<Key>> {
    RecordWalker::new(file, begin, end).collect()
}
