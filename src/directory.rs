//! Directory
//!
//! A directory is a stored object whose payload points at a key list: one
//! record elsewhere in the file holding the headers of every child record.
//!
//! ## Payload Format
//! ```text
//! ┌─────────────┬───────────┬───────────┬────────────────┬────────────────┐
//! │ Version (2) │ CTime (4) │ MTime (4) │ NBytesKeys (4) │ NBytesName (4) │
//! ├─────────────┴───────────┴───────────┴────────────────┴────────────────┤
//! │ SeekDir │ SeekParent │ SeekKeys      (4 bytes each, 8 if Version > 1000) │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key List Format
//! ```text
//! ┌──────────────────┬────────────┬──────────┬──────────┬─────┐
//! │ List header key  │ NKeys (4)  │ Key 1    │ Key 2    │ ... │
//! └──────────────────┴────────────┴──────────┴──────────┴─────┘
//! ```
//! Child headers are kept in storage order.

use std::any::Any;

use crate::codec::{RBuffer, WBuffer};
use crate::datime::Datime;
use crate::error::{Result, RootError};
use crate::file::{FileRef, RangeReader};
use crate::key::{Key, Record, RecordBuilder, BIG_FILE_VERSION};
use crate::object::{DirectoryAware, FileAware, Marshaler, Object, Unmarshaler};

/// Directory version written for small files
pub const DIRECTORY_VERSION: i16 = 5;

/// A scope of child records
#[derive(Debug, Default)]
pub struct Directory {
    version: i16,
    ctime: Datime,
    mtime: Datime,
    /// Length of the key-list record
    nbytes_keys: i32,
    /// Length of the directory's own name/title block
    nbytes_name: i32,
    seek_dir: i64,
    seek_parent: i64,
    /// Offset of the key-list record (0 = no children)
    seek_keys: i64,

    file: Option<FileRef>,
    keys: Vec<Key>,
    scanned: bool,
}

impl Directory {
    /// Create an empty directory record
    pub fn new(version: i16, created: Datime) -> Self {
        Self {
            version,
            ctime: created,
            mtime: created,
            ..Self::default()
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn version(&self) -> i16 {
        self.version
    }

    pub fn created(&self) -> Datime {
        self.ctime
    }

    pub fn modified(&self) -> Datime {
        self.mtime
    }

    pub fn seek_dir(&self) -> i64 {
        self.seek_dir
    }

    pub fn seek_parent(&self) -> i64 {
        self.seek_parent
    }

    pub fn seek_keys(&self) -> i64 {
        self.seek_keys
    }

    pub fn nbytes_keys(&self) -> i32 {
        self.nbytes_keys
    }

    /// Whether the child records have been scanned
    pub fn is_scanned(&self) -> bool {
        self.scanned
    }

    /// Child record headers in storage order
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Record named `name` with the highest cycle
    pub fn key(&self, name: &str) -> Option<&Key> {
        self.keys
            .iter()
            .filter(|k| k.name() == name)
            .max_by_key(|k| k.cycle())
    }

    /// Record named `name` with exactly `cycle`
    pub fn key_cycle(&self, name: &str, cycle: i16) -> Option<&Key> {
        self.keys
            .iter()
            .find(|k| k.name() == name && k.cycle() == cycle)
    }

    /// Set where the directory record and its parent live
    pub fn set_location(&mut self, seek_dir: i64, seek_parent: i64, nbytes_name: i32) {
        self.seek_dir = seek_dir;
        self.seek_parent = seek_parent;
        self.nbytes_name = nbytes_name;
    }

    /// Append a child header (storage order is insertion order)
    pub fn push_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    // =========================================================================
    // Key list
    // =========================================================================

    /// Scan the key list from the file
    pub fn read_keys(&mut self) -> Result<()> {
        self.keys.clear();
        self.scanned = true;
        if self.seek_keys == 0 {
            return Ok(());
        }

        let file = self.file.clone().ok_or_else(|| {
            RootError::Malformed("directory is not attached to a file".to_string())
        })?;
        if self.seek_keys < 0 || self.nbytes_keys < 0 {
            return Err(RootError::Malformed(format!(
                "key list at {} with {} bytes",
                self.seek_keys, self.nbytes_keys
            )));
        }

        let data = file.read_at(self.seek_keys as u64, self.nbytes_keys as usize)?;
        let mut r = RBuffer::new(data, None, 0);

        let header = decode_listed_key(&mut r, &file)?;
        let nkeys = r.read_i32();
        r.status()?;
        if nkeys < 0 {
            return Err(RootError::Malformed(format!(
                "key list {:?} declares {} keys",
                header.name(),
                nkeys
            )));
        }

        let mut keys = Vec::with_capacity((nkeys as usize).min(r.remaining() / 4));
        for _ in 0..nkeys {
            keys.push(decode_listed_key(&mut r, &file)?);
        }
        tracing::debug!(
            "Scanned {} keys from key list at {} ({} bytes)",
            keys.len(),
            self.seek_keys,
            self.nbytes_keys
        );
        self.keys = keys;
        Ok(())
    }

    /// Encode the key list as a record at `seek_keys` and point the directory at it
    pub fn write_keys(&mut self, seek_keys: i64, name: &str) -> Result<Record> {
        let nkeys = i32::try_from(self.keys.len())
            .map_err(|_| RootError::Malformed(format!("{} keys do not fit", self.keys.len())))?;

        let mut w = WBuffer::new(None, 0);
        w.write_i32(nkeys);
        for key in &self.keys {
            key.marshal_root(&mut w)?;
        }
        let list = w.into_bytes()?;

        let mut builder = RecordBuilder::new("TDirectory", name)
            .directory_offset(self.seek_dir)
            .datetime(self.mtime)
            .compression_level(0);
        if self.version > BIG_FILE_VERSION {
            builder = builder.big_file();
        }
        let record = builder.build(seek_keys, &list)?;

        self.seek_keys = seek_keys;
        self.nbytes_keys = record.key.total_len();
        Ok(record)
    }
}

/// Decode one header of a key list and leave the cursor at the next one.
///
/// The cursor is realigned from the header length, so headers written with
/// the two-byte empty-string framing still line up.
fn decode_listed_key(r: &mut RBuffer, file: &FileRef) -> Result<Key> {
    let start = r.pos();
    let key = Key::decode(r, Some(file.clone()))?;
    if !key.is_gap() {
        let end = start + i64::from(key.key_len());
        if r.pos() != end {
            tracing::trace!("realigning key list cursor from {} to {}", r.pos(), end);
            r.set_pos(end);
            r.status()?;
        }
    }
    Ok(key)
}

// =============================================================================
// Streaming
// =============================================================================

impl Unmarshaler for Directory {
    fn unmarshal_root(&mut self, r: &mut RBuffer) -> Result<()> {
        r.status()?;

        self.version = r.read_i16();
        self.ctime = Datime::from_raw(r.read_u32());
        self.mtime = Datime::from_raw(r.read_u32());
        self.nbytes_keys = r.read_i32();
        self.nbytes_name = r.read_i32();

        if self.version > BIG_FILE_VERSION {
            self.seek_dir = r.read_i64();
            self.seek_parent = r.read_i64();
            self.seek_keys = r.read_i64();
        } else {
            self.seek_dir = i64::from(r.read_i32());
            self.seek_parent = i64::from(r.read_i32());
            self.seek_keys = i64::from(r.read_i32());
        }
        r.status()?;

        self.keys.clear();
        self.scanned = false;
        Ok(())
    }
}

impl Marshaler for Directory {
    fn marshal_root(&self, w: &mut WBuffer) -> Result<()> {
        w.write_i16(self.version);
        w.write_u32(self.ctime.raw());
        w.write_u32(self.mtime.raw());
        w.write_i32(self.nbytes_keys);
        w.write_i32(self.nbytes_name);

        if self.version > BIG_FILE_VERSION {
            w.write_i64(self.seek_dir);
            w.write_i64(self.seek_parent);
            w.write_i64(self.seek_keys);
        } else {
            for v in [self.seek_dir, self.seek_parent, self.seek_keys] {
                let v = i32::try_from(v).map_err(|_| {
                    RootError::Malformed(format!(
                        "offset {} needs a directory version above {}",
                        v, BIG_FILE_VERSION
                    ))
                })?;
                w.write_i32(v);
            }
        }
        Ok(w.status()?)
    }
}

impl Object for Directory {
    fn class(&self) -> &str {
        "TDirectory"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_unmarshaler(&mut self) -> Option<&mut dyn Unmarshaler> {
        Some(self)
    }

    fn as_marshaler(&self) -> Option<&dyn Marshaler> {
        Some(self)
    }

    fn as_file_aware(&mut self) -> Option<&mut dyn FileAware> {
        Some(self)
    }

    fn as_directory(&self) -> Option<&dyn DirectoryAware> {
        Some(self)
    }

    fn as_directory_mut(&mut self) -> Option<&mut dyn DirectoryAware> {
        Some(self)
    }
}

impl FileAware for Directory {
    fn set_file(&mut self, file: FileRef) {
        self.file = Some(file);
    }
}

impl DirectoryAware for Directory {
    fn read_keys(&mut self) -> Result<()> {
        Directory::read_keys(self)
    }

    fn keys(&self) -> &[Key] {
        &self.keys
    }
}
