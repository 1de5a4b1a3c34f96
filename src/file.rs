//! File handle capability
//!
//! The record layer only ever needs one thing from a file: exactly `len`
//! bytes starting at an absolute offset. Partial reads are errors.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, RootError};

/// Random-access byte source
pub trait RangeReader: Send + Sync + fmt::Debug {
    /// Read exactly `len` bytes at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;

    /// Total size in bytes
    fn size(&self) -> u64;
}

/// Shared handle to the file records are read from
pub type FileRef = Arc<dyn RangeReader>;

fn short_read(offset: u64, want: usize, size: u64) -> RootError {
    RootError::ShortRead {
        offset,
        want,
        got: size.saturating_sub(offset).min(want as u64) as usize,
    }
}

// =============================================================================
// In-memory file
// =============================================================================

/// A whole file image held in memory
#[derive(Debug, Clone, Default)]
pub struct MemFile {
    data: Bytes,
}

impl MemFile {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn into_ref(self) -> FileRef {
        Arc::new(self)
    }
}

impl RangeReader for MemFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        let size = self.data.len() as u64;
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => Ok(self.data.slice(offset as usize..end as usize)),
            _ => Err(short_read(offset, len, size)),
        }
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

// =============================================================================
// On-disk file
// =============================================================================

/// A file on disk, read with seek + read under a lock
#[derive(Debug)]
pub struct DiskFile {
    file: Mutex<File>,
    size: u64,
}

impl DiskFile {
    /// Open a file for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        tracing::debug!("Opened {} ({} bytes)", path.as_ref().display(), size);
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }

    pub fn into_ref(self) -> FileRef {
        Arc::new(self)
    }
}

impl RangeReader for DiskFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size => {}
            _ => return Err(short_read(offset, len, self.size)),
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }
}
