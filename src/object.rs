//! Object capabilities
//!
//! Stored records carry only a class name. Resolution constructs an instance
//! from the registry and then asks it which capabilities it has: decoding
//! itself, encoding itself, holding a file handle, listing child records.

use std::any::Any;
use std::fmt;

use crate::codec::{RBuffer, WBuffer};
use crate::error::Result;
use crate::file::FileRef;
use crate::key::Key;

/// A storable object.
///
/// Every capability probe defaults to "not supported"; concrete types
/// override the ones they implement.
pub trait Object: Any + Send + Sync + fmt::Debug {
    /// Class name as written in record headers
    fn class(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn as_unmarshaler(&mut self) -> Option<&mut dyn Unmarshaler> {
        None
    }

    fn as_marshaler(&self) -> Option<&dyn Marshaler> {
        None
    }

    fn as_file_aware(&mut self) -> Option<&mut dyn FileAware> {
        None
    }

    fn as_directory(&self) -> Option<&dyn DirectoryAware> {
        None
    }

    fn as_directory_mut(&mut self) -> Option<&mut dyn DirectoryAware> {
        None
    }

    fn as_named(&self) -> Option<&dyn Named> {
        None
    }
}

impl dyn Object {
    /// Downcast to a concrete type
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Decodes an object from a read buffer
pub trait Unmarshaler {
    fn unmarshal_root(&mut self, r: &mut RBuffer) -> Result<()>;
}

/// Encodes an object into a write buffer
pub trait Marshaler {
    fn marshal_root(&self, w: &mut WBuffer) -> Result<()>;
}

/// Accepts a back-reference to the file it was read from
pub trait FileAware {
    fn set_file(&mut self, file: FileRef);
}

/// Owns child records that live elsewhere in the same file
pub trait DirectoryAware {
    /// Scan the child record headers from the file
    fn read_keys(&mut self) -> Result<()>;

    /// Child record headers in storage order
    fn keys(&self) -> &[Key];
}

/// Objects with a name and a title
pub trait Named {
    fn name(&self) -> &str;
    fn title(&self) -> &str;
}
