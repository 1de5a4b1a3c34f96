//! # rootio
//!
//! Reader/writer for the ROOT binary container format:
//! - Big-endian byte codecs with sticky errors and back-reference tables
//! - Self-describing record headers (keys) with lazy, cached object decoding
//! - zlib-compressed payload blocks
//! - An open class registry mapping class names to constructors
//! - Directories that scan their child records on resolution
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  File Handle (RangeReader)                   │
//! │              read exactly N bytes at offset O                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Record Header (Key)                     │
//! │          locate → inflate → resolve → cache object           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Byte Codec  │          │  Registry   │
//!   │ (RBuffer)   │          │  (Factory)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │  Directory  │
//!                           │ (key list)  │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod datime;
pub mod registry;
pub mod object;
pub mod file;
pub mod compress;
pub mod key;
pub mod directory;
pub mod objects;
pub mod scan;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BufferError, Result, RootError};
pub use config::Config;
pub use codec::{RBuffer, WBuffer};
pub use datime::Datime;
pub use registry::{factory, Factory, FactoryFn};
pub use object::{DirectoryAware, FileAware, Marshaler, Named, Object, Unmarshaler};
pub use file::{DiskFile, FileRef, MemFile, RangeReader};
pub use key::{Key, Record, RecordBuilder, GAP_CLASS};
pub use directory::Directory;
pub use objects::{ObjString, TObject};
pub use scan::RecordWalker;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rootio
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
