//! Configuration for rootio
//!
//! Centralized decode/encode configuration with sensible defaults.

use crate::error::{Result, RootError};

/// Main configuration for record decoding and encoding
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Decode Configuration
    // -------------------------------------------------------------------------
    /// Largest uncompressed payload a record header may declare (in bytes).
    /// Anything above is rejected before allocating.
    pub max_object_len: usize,

    /// Parse and check the 9-byte compression sub-header instead of skipping it
    pub verify_compression_header: bool,

    /// Scan the child records of a directory as soon as it is resolved
    pub scan_directories: bool,

    // -------------------------------------------------------------------------
    // Encode Configuration
    // -------------------------------------------------------------------------
    /// zlib level used when building records (0 = store uncompressed)
    pub compression_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_object_len: 256 * 1024 * 1024, // 256 MB
            verify_compression_header: false,
            scan_directories: true,
            compression_level: 1,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the values are usable
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(RootError::Config(format!(
                "compression level must be in 0..=9, got {}",
                self.compression_level
            )));
        }
        if self.max_object_len == 0 {
            return Err(RootError::Config(
                "max_object_len must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the largest accepted uncompressed payload (in bytes)
    pub fn max_object_len(mut self, len: usize) -> Self {
        self.config.max_object_len = len;
        self
    }

    /// Enable or disable compression sub-header checks
    pub fn verify_compression_header(mut self, verify: bool) -> Self {
        self.config.verify_compression_header = verify;
        self
    }

    /// Enable or disable directory scans on resolution
    pub fn scan_directories(mut self, scan: bool) -> Self {
        self.config.scan_directories = scan;
        self
    }

    /// Set the zlib level for written records
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
