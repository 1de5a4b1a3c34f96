//! Compressed payload blocks
//!
//! A compressed record payload is one block: a 9-byte sub-header followed by
//! a zlib stream.
//!
//! ```text
//! ┌─────────┬────────────┬──────────────────┬──────────────────┬───────────────┐
//! │ "ZL"(2) │ Method (1) │ Compressed (3,LE)│ Raw length (3,LE)│ zlib stream   │
//! └─────────┴────────────┴──────────────────┴──────────────────┴───────────────┘
//! ```
//! The decoder skips the sub-header and trusts the record header's
//! uncompressed length; [`BlockHeader::check`] is the optional cross-check.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Result, RootError};

/// Sub-header size in front of every compressed block
pub const HEADER_SIZE: usize = 9;

/// Algorithm tag for zlib blocks
pub const ZLIB_TAG: &[u8; 2] = b"ZL";

/// Deflate method byte
pub const DEFLATE_METHOD: u8 = 8;

/// Largest block length representable in a 3-byte size field
pub const MAX_BLOCK_LEN: usize = 0xFF_FFFF;

/// Parsed compression sub-header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub tag: [u8; 2],
    pub method: u8,
    pub compressed_len: u32,
    pub uncompressed_len: u32,
}

impl BlockHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(RootError::Decompress(format!(
                "compression header needs {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }
        Ok(Self {
            tag: [data[0], data[1]],
            method: data[2],
            compressed_len: u24_le(&data[3..6]),
            uncompressed_len: u24_le(&data[6..9]),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let c = self.compressed_len.to_le_bytes();
        let u = self.uncompressed_len.to_le_bytes();
        [
            self.tag[0], self.tag[1], self.method, c[0], c[1], c[2], u[0], u[1], u[2],
        ]
    }

    /// Verify the header describes a zlib block of `objlen` raw bytes
    pub fn check(&self, objlen: usize) -> Result<()> {
        if &self.tag != ZLIB_TAG || self.method != DEFLATE_METHOD {
            return Err(RootError::Decompress(format!(
                "unsupported compression algorithm {:?}/{}",
                String::from_utf8_lossy(&self.tag),
                self.method
            )));
        }
        if self.uncompressed_len as usize != objlen & MAX_BLOCK_LEN {
            return Err(RootError::Decompress(format!(
                "compression header declares {} raw bytes, record declares {}",
                self.uncompressed_len, objlen
            )));
        }
        Ok(())
    }
}

fn u24_le(b: &[u8]) -> u32 {
    u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16
}

/// Compress `payload` into one block (sub-header + zlib stream)
pub fn compress(payload: &[u8], level: u32) -> Result<Vec<u8>> {
    if payload.len() > MAX_BLOCK_LEN {
        return Err(RootError::Compress(format!(
            "payload of {} bytes exceeds block limit {}",
            payload.len(),
            MAX_BLOCK_LEN
        )));
    }

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::new(level));
    encoder
        .write_all(payload)
        .map_err(|e| RootError::Compress(e.to_string()))?;
    let stream = encoder
        .finish()
        .map_err(|e| RootError::Compress(e.to_string()))?;
    if stream.len() > MAX_BLOCK_LEN {
        return Err(RootError::Compress(format!(
            "compressed stream of {} bytes exceeds block limit",
            stream.len()
        )));
    }

    let header = BlockHeader {
        tag: *ZLIB_TAG,
        method: DEFLATE_METHOD,
        compressed_len: stream.len() as u32,
        uncompressed_len: payload.len() as u32,
    };
    let mut block = Vec::with_capacity(HEADER_SIZE + stream.len());
    block.extend_from_slice(&header.encode());
    block.extend_from_slice(&stream);
    Ok(block)
}

/// Decompress a block into exactly `objlen` bytes
pub fn decompress(block: &[u8], objlen: usize) -> Result<Vec<u8>> {
    if block.len() < HEADER_SIZE {
        return Err(RootError::Decompress(format!(
            "compressed block of {} bytes is shorter than its header",
            block.len()
        )));
    }

    let mut out = vec![0u8; objlen];
    let mut decoder = ZlibDecoder::new(&block[HEADER_SIZE..]);
    decoder
        .read_exact(&mut out)
        .map_err(|e| RootError::Decompress(format!("inflating {} bytes: {}", objlen, e)))?;
    tracing::debug!(
        "Decompressed {} -> {} bytes",
        block.len() - HEADER_SIZE,
        objlen
    );
    Ok(out)
}
