//! Record Builder
//!
//! Produces the on-disk image of one record: header followed by the payload,
//! compressed when that makes it smaller.

use std::sync::Arc;

use crate::codec::WBuffer;
use crate::compress;
use crate::config::Config;
use crate::datime::Datime;
use crate::error::{Result, RootError};
use crate::object::{Marshaler, Object};

use super::{header_len, Key, BIG_FILE_VERSION, KEY_VERSION};

/// Payloads at or below this size are never compressed
pub const COMPRESSION_THRESHOLD: usize = 256;

/// An encoded record: its header and the bytes to place at `key.seek_key()`
#[derive(Debug)]
pub struct Record {
    pub key: Key,
    pub data: Vec<u8>,
}

/// Builder for record images
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    class: String,
    name: String,
    title: Option<String>,
    cycle: i16,
    version: i16,
    datetime: Datime,
    seek_pdir: i64,
    compression_level: u32,
}

impl RecordBuilder {
    /// Start a record of class `class` named `name`.
    ///
    /// The title defaults to the name.
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
            title: None,
            cycle: 1,
            version: KEY_VERSION,
            datetime: Datime::now(),
            seek_pdir: 0,
            compression_level: Config::default().compression_level,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn cycle(mut self, cycle: i16) -> Self {
        self.cycle = cycle;
        self
    }

    /// Set the header version; above 1000 the offsets are written on 8 bytes
    pub fn version(mut self, version: i16) -> Self {
        self.version = version;
        self
    }

    /// Use 8-byte offsets
    pub fn big_file(self) -> Self {
        let version = KEY_VERSION + BIG_FILE_VERSION;
        self.version(version)
    }

    pub fn datetime(mut self, datetime: Datime) -> Self {
        self.datetime = datetime;
        self
    }

    /// Offset of the directory owning the record
    pub fn directory_offset(mut self, seek_pdir: i64) -> Self {
        self.seek_pdir = seek_pdir;
        self
    }

    /// zlib level, 0 stores the payload as is
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Take encode settings from `config`
    pub fn config(self, config: &Config) -> Self {
        self.compression_level(config.compression_level)
    }

    fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// Header length the record will have
    pub fn key_len(&self) -> usize {
        header_len(self.version, &self.class, &self.name, self.title_str())
    }

    /// Encode `obj` and build its record at `seek_key`
    pub fn build_object(&self, seek_key: i64, obj: &dyn Object) -> Result<Record> {
        let marshaler = obj.as_marshaler().ok_or_else(|| {
            RootError::Malformed(format!("class {:?} cannot encode itself", obj.class()))
        })?;
        let keylen = self.key_len_u32()?;
        let mut w = WBuffer::new(None, keylen);
        marshaler.marshal_root(&mut w)?;
        let payload = w.into_bytes()?;
        self.build(seek_key, &payload)
    }

    /// Encode a shared object (see [`RecordBuilder::build_object`])
    pub fn build_shared(&self, seek_key: i64, obj: &Arc<dyn Object>) -> Result<Record> {
        self.build_object(seek_key, obj.as_ref())
    }

    /// Build the record for an already-encoded payload at `seek_key`
    pub fn build(&self, seek_key: i64, payload: &[u8]) -> Result<Record> {
        let keylen = self.key_len_u32()? as usize;

        let stored = self.stored_payload(payload)?;
        let total = keylen + stored.as_ref().map_or(payload.len(), Vec::len);
        let bytes = i32::try_from(total)
            .map_err(|_| RootError::Malformed(format!("record of {} bytes is too large", total)))?;
        let objlen = i32::try_from(payload.len()).map_err(|_| {
            RootError::Malformed(format!("payload of {} bytes is too large", payload.len()))
        })?;

        let key = Key {
            file: None,
            bytes,
            version: self.version,
            objlen,
            datetime: self.datetime,
            keylen: keylen as i32,
            cycle: self.cycle,
            seek_key,
            seek_pdir: self.seek_pdir,
            class: self.class.clone(),
            name: self.name.clone(),
            title: self.title_str().to_string(),
            obj: Default::default(),
        };

        let mut w = WBuffer::with_limit(total, None, 0);
        key.marshal_root(&mut w)?;
        if w.len() != keylen {
            return Err(RootError::Malformed(format!(
                "encoded header is {} bytes, expected {}",
                w.len(),
                keylen
            )));
        }
        w.write_bytes(stored.as_deref().unwrap_or(payload));
        let data = w.into_bytes()?.to_vec();

        tracing::debug!(
            "Built record {} {:?} at {}: {} bytes ({} raw, compressed={})",
            key.class,
            key.name,
            seek_key,
            data.len(),
            payload.len(),
            key.is_compressed()
        );
        Ok(Record { key, data })
    }

    fn key_len_u32(&self) -> Result<u32> {
        let keylen = self.key_len();
        if keylen > i16::MAX as usize {
            return Err(RootError::Malformed(format!(
                "header of {} bytes does not fit 16 bits",
                keylen
            )));
        }
        Ok(keylen as u32)
    }

    /// Compressed block when compression is enabled and pays off
    fn stored_payload(&self, payload: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.compression_level == 0
            || payload.len() <= COMPRESSION_THRESHOLD
            || payload.len() > compress::MAX_BLOCK_LEN
        {
            return Ok(None);
        }
        let block = compress::compress(payload, self.compression_level)?;
        // A block as long as the payload would read back as uncompressed.
        if block.len() >= payload.len() {
            return Ok(None);
        }
        Ok(Some(block))
    }
}
