//! Record Header (Key) Module
//!
//! A key is the self-describing header in front of every stored object.
//!
//! ## Responsibilities
//! - Decode/encode the header fields (offset width picked by version)
//! - Recognise gap records (negative total length)
//! - Load the payload, inflating it when compressed
//! - Resolve the payload into a typed object through the class registry,
//!   once, and cache it
//!
//! ## Record Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (keylen bytes, big-endian)                           │
//! │   Bytes: i32 (4)     total length, < 0 ⇒ gap, stop          │
//! │   Version: i16 (2)   > 1000 ⇒ 8-byte offsets                │
//! │   ObjLen: i32 (4)    uncompressed payload length            │
//! │   Datime: u32 (4)    packed date/time                       │
//! │   KeyLen: i16 (2)    header length                          │
//! │   Cycle: i16 (2)                                            │
//! │   SeekKey: i32|i64   offset of this record                  │
//! │   SeekPdir: i32|i64  offset of the owning directory         │
//! │   Class, Name, Title: length-prefixed strings               │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Payload (Bytes - KeyLen bytes)                              │
//! │   compressed iff ObjLen != Bytes - KeyLen                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod resolve;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{string_len, RBuffer, WBuffer};
use crate::datime::Datime;
use crate::error::{Result, RootError};
use crate::file::FileRef;
use crate::object::{FileAware, Marshaler, Named, Object, Unmarshaler};

pub use builder::{Record, RecordBuilder};

// =============================================================================
// Shared Constants (used by builder, resolve, directory, scan)
// =============================================================================

/// Class name given to gap records
pub const GAP_CLASS: &str = "[GAP]";

/// Versions above this use 8-byte offsets
pub const BIG_FILE_VERSION: i16 = 1000;

/// Header version written for small files
pub const KEY_VERSION: i16 = 4;

/// Fixed part of the header: Bytes, Version, ObjLen, Datime, KeyLen, Cycle
pub const FIXED_HEADER_LEN: usize = 18;

/// Header length for the given version and strings
pub fn header_len(version: i16, class: &str, name: &str, title: &str) -> usize {
    let offsets = if version > BIG_FILE_VERSION { 16 } else { 8 };
    FIXED_HEADER_LEN + offsets + string_len(class) + string_len(name) + string_len(title)
}

// =============================================================================
// Key
// =============================================================================

/// Header of one stored record
#[derive(Default)]
pub struct Key {
    /// File the record lives in
    file: Option<FileRef>,

    /// Bytes for header + (possibly compressed) payload
    bytes: i32,
    /// Header format version
    version: i16,
    /// Uncompressed payload length
    objlen: i32,
    /// Creation time
    datetime: Datime,
    /// Header length
    keylen: i32,
    /// Disambiguates records sharing a name
    cycle: i16,

    /// Offset of this record; redundant, used as a cross-check
    seek_key: i64,
    /// Offset of the directory owning this record
    seek_pdir: i64,

    class: String,
    name: String,
    title: String,

    /// Decoded object, filled on first resolution
    obj: Mutex<Option<Arc<dyn Object>>>,
}

impl Key {
    /// Empty key bound to `file`, ready to be decoded
    pub fn with_file(file: FileRef) -> Self {
        Self {
            file: Some(file),
            ..Self::default()
        }
    }

    /// Decode a header from `r`
    pub fn decode(r: &mut RBuffer, file: Option<FileRef>) -> Result<Self> {
        let mut key = Self {
            file,
            ..Self::default()
        };
        key.unmarshal_root(r)?;
        Ok(key)
    }

    /// A gap record of `len` free bytes at `offset`
    pub fn gap(offset: i64, len: i32) -> Self {
        Self {
            bytes: if len < 0 { len } else { -len },
            seek_key: offset,
            class: GAP_CLASS.to_string(),
            ..Self::default()
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cycle(&self) -> i16 {
        self.cycle
    }

    pub fn version(&self) -> i16 {
        self.version
    }

    /// Total on-disk length (header + stored payload)
    pub fn total_len(&self) -> i32 {
        self.bytes
    }

    /// Uncompressed payload length
    pub fn obj_len(&self) -> i32 {
        self.objlen
    }

    /// Header length
    pub fn key_len(&self) -> i32 {
        self.keylen
    }

    pub fn datetime(&self) -> Datime {
        self.datetime
    }

    /// Offset of this record in its file
    pub fn seek_key(&self) -> i64 {
        self.seek_key
    }

    /// Offset of the owning directory
    pub fn seek_pdir(&self) -> i64 {
        self.seek_pdir
    }

    pub fn file(&self) -> Option<&FileRef> {
        self.file.as_ref()
    }

    /// Whether this header marks free space
    pub fn is_gap(&self) -> bool {
        self.bytes < 0
    }

    /// Size of the free space, for gap records
    pub fn gap_len(&self) -> Option<u32> {
        self.is_gap().then(|| self.bytes.unsigned_abs())
    }

    /// Whether the payload is stored compressed.
    ///
    /// There is no flag: a payload is compressed iff its uncompressed length
    /// differs from the stored length.
    pub fn is_compressed(&self) -> bool {
        i64::from(self.objlen) != i64::from(self.bytes) - i64::from(self.keylen)
    }

    /// Whether the object has already been resolved
    pub fn is_resolved(&self) -> bool {
        self.obj.lock().is_some()
    }

    pub(crate) fn set_seek_key(&mut self, offset: i64) {
        self.seek_key = offset;
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("class", &self.class)
            .field("name", &self.name)
            .field("title", &self.title)
            .field("cycle", &self.cycle)
            .field("bytes", &self.bytes)
            .field("objlen", &self.objlen)
            .field("keylen", &self.keylen)
            .field("version", &self.version)
            .field("seek_key", &self.seek_key)
            .field("seek_pdir", &self.seek_pdir)
            .field("datetime", &self.datetime)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

// =============================================================================
// Streaming
// =============================================================================

impl Unmarshaler for Key {
    fn unmarshal_root(&mut self, r: &mut RBuffer) -> Result<()> {
        r.status()?;

        self.bytes = r.read_i32();
        r.status()?;
        if self.bytes < 0 {
            self.class = GAP_CLASS.to_string();
            tracing::trace!("key: gap of {} bytes", -i64::from(self.bytes));
            return Ok(());
        }

        self.version = r.read_i16();
        self.objlen = r.read_i32();
        self.datetime = Datime::from_raw(r.read_u32());
        self.keylen = i32::from(r.read_i16());
        self.cycle = r.read_i16();

        if self.version > BIG_FILE_VERSION {
            self.seek_key = r.read_i64();
            self.seek_pdir = r.read_i64();
        } else {
            self.seek_key = i64::from(r.read_i32());
            self.seek_pdir = i64::from(r.read_i32());
        }

        self.class = r.read_string();
        self.name = r.read_string();
        self.title = r.read_string();
        r.status()?;

        tracing::trace!(
            version = self.version,
            objlen = self.objlen,
            keylen = self.keylen,
            cycle = self.cycle,
            seek_key = self.seek_key,
            seek_pdir = self.seek_pdir,
            compressed = self.is_compressed(),
            "key: {} {:?} {:?}",
            self.class,
            self.name,
            self.title
        );
        Ok(())
    }
}

impl Marshaler for Key {
    fn marshal_root(&self, w: &mut WBuffer) -> Result<()> {
        w.write_i32(self.bytes);
        if self.is_gap() {
            return Ok(w.status()?);
        }

        let keylen = i16::try_from(self.keylen).map_err(|_| {
            RootError::Malformed(format!("header length {} does not fit 16 bits", self.keylen))
        })?;

        w.write_i16(self.version);
        w.write_i32(self.objlen);
        w.write_u32(self.datetime.raw());
        w.write_i16(keylen);
        w.write_i16(self.cycle);

        if self.version > BIG_FILE_VERSION {
            w.write_i64(self.seek_key);
            w.write_i64(self.seek_pdir);
        } else {
            let narrow = |v: i64| {
                i32::try_from(v).map_err(|_| {
                    RootError::Malformed(format!(
                        "offset {} needs a header version above {}",
                        v, BIG_FILE_VERSION
                    ))
                })
            };
            w.write_i32(narrow(self.seek_key)?);
            w.write_i32(narrow(self.seek_pdir)?);
        }

        w.write_string(&self.class);
        w.write_string(&self.name);
        w.write_string(&self.title);
        Ok(w.status()?)
    }
}

impl Object for Key {
    fn class(&self) -> &str {
        "TKey"
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

    fn as_named(&self) -> Option<&dyn Named> {
        Some(self)
    }
}

impl FileAware for Key {
    fn set_file(&mut self, file: FileRef) {
        self.file = Some(file);
    }
}

impl Named for Key {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }
}
