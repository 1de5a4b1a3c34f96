//! Payload loading and object resolution

use std::sync::Arc;

use bytes::Bytes;

use crate::codec::RBuffer;
use crate::compress::{self, BlockHeader, HEADER_SIZE};
use crate::config::Config;
use crate::error::{Result, RootError};
use crate::file::RangeReader;
use crate::object::Object;
use crate::registry::{factory, Factory};

use super::Key;

impl Key {
    /// Resolve the stored object with the process-wide registry
    pub fn object(&self) -> Result<Arc<dyn Object>> {
        self.object_with(factory(), &Config::default())
    }

    /// Resolve the stored object.
    ///
    /// The first successful call decodes the payload and caches the result;
    /// every later call returns the same instance. A failed call leaves the
    /// key untouched, so it can be retried (e.g. after registering a class).
    pub fn object_with(&self, factory: &Factory, config: &Config) -> Result<Arc<dyn Object>> {
        let mut slot = self.obj.lock();
        if let Some(obj) = slot.as_ref() {
            return Ok(Arc::clone(obj));
        }

        if self.is_gap() {
            return Err(RootError::GapRecord {
                offset: self.seek_key,
            });
        }

        let payload = self.load(config)?;

        let ctor = factory
            .get(&self.class)
            .ok_or_else(|| RootError::UnknownClass {
                class: self.class.clone(),
                key: self.name.clone(),
            })?;
        let mut obj = ctor();

        let decoder = obj
            .as_unmarshaler()
            .ok_or_else(|| RootError::NotUnmarshaler {
                class: self.class.clone(),
                key: self.name.clone(),
            })?;
        let mut r = RBuffer::new(payload, None, self.keylen as u32);
        decoder.unmarshal_root(&mut r)?;

        if let (Some(file), Some(aware)) = (self.file.as_ref(), obj.as_file_aware()) {
            aware.set_file(Arc::clone(file));
        }
        if config.scan_directories {
            if let Some(dir) = obj.as_directory_mut() {
                dir.read_keys()?;
            }
        }

        tracing::debug!(
            "Resolved {} {:?} (cycle {}) from {} payload bytes",
            self.class,
            self.name,
            self.cycle,
            self.objlen
        );

        let obj: Arc<dyn Object> = Arc::from(obj);
        *slot = Some(Arc::clone(&obj));
        Ok(obj)
    }

    /// Uncompressed payload bytes
    pub fn payload(&self) -> Result<Bytes> {
        self.load(&Config::default())
    }

    /// Read the payload from the file, inflating it when compressed
    pub fn load(&self, config: &Config) -> Result<Bytes> {
        let file = self.file.as_ref().ok_or_else(|| {
            RootError::Malformed(format!("key {:?} is not attached to a file", self.name))
        })?;

        if self.objlen < 0 || self.objlen as usize > config.max_object_len {
            return Err(RootError::Malformed(format!(
                "key {:?}: object length {} outside [0, {}]",
                self.name, self.objlen, config.max_object_len
            )));
        }
        let objlen = self.objlen as usize;

        let start = self.seek_key + i64::from(self.keylen);
        if self.seek_key < 0 || self.keylen < 0 {
            return Err(RootError::Malformed(format!(
                "key {:?}: payload offset {} is negative",
                self.name, start
            )));
        }
        let start = start as u64;

        if !self.is_compressed() {
            return file.read_at(start, objlen);
        }

        let stored = self.bytes - self.keylen;
        if stored < HEADER_SIZE as i32 {
            return Err(RootError::Decompress(format!(
                "key {:?}: {} stored bytes cannot hold a compressed block",
                self.name, stored
            )));
        }
        let block = file.read_at(start, stored as usize)?;
        if config.verify_compression_header {
            BlockHeader::parse(&block)?.check(objlen)?;
        }
        let raw = compress::decompress(&block, objlen)?;
        Ok(Bytes::from(raw))
    }
}
