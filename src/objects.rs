//! Built-in object types
//!
//! `TObject` is the base every stored class starts with; `TObjString` is the
//! simplest complete stored class: a base object and one string.

use std::any::Any;

use crate::codec::{RBuffer, WBuffer};
use crate::error::Result;
use crate::object::{Marshaler, Named, Object, Unmarshaler};

/// Object lives on the heap (always set after reading)
pub const IS_ON_HEAP: u32 = 0x0100_0000;

/// Object is referenced: a 2-byte process id follows the bits
pub const IS_REFERENCED: u32 = 1 << 4;

/// Version written for `TObject`
pub const TOBJECT_VERSION: i16 = 1;

/// Version written for `TObjString`
pub const OBJSTRING_VERSION: i16 = 1;

// =============================================================================
// TObject
// =============================================================================

/// Base fields shared by stored classes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TObject {
    pub id: u32,
    pub bits: u32,
}

impl Unmarshaler for TObject {
    fn unmarshal_root(&mut self, r: &mut RBuffer) -> Result<()> {
        r.status()?;
        let version = r.read_version();
        self.id = r.read_u32();
        self.bits = r.read_u32() | IS_ON_HEAP;
        if self.bits & IS_REFERENCED != 0 {
            r.skip(2); // process id
        }
        r.check_byte_count(&version, "TObject")?;
        Ok(())
    }
}

impl Marshaler for TObject {
    fn marshal_root(&self, w: &mut WBuffer) -> Result<()> {
        w.write_i16(TOBJECT_VERSION);
        w.write_u32(self.id);
        w.write_u32(self.bits & !IS_ON_HEAP);
        if self.bits & IS_REFERENCED != 0 {
            w.write_u16(0);
        }
        Ok(w.status()?)
    }
}

impl Object for TObject {
    fn class(&self) -> &str {
        "TObject"
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
}

// =============================================================================
// TObjString
// =============================================================================

/// A stored string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjString {
    pub base: TObject,
    pub value: String,
}

impl ObjString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            base: TObject::default(),
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Unmarshaler for ObjString {
    fn unmarshal_root(&mut self, r: &mut RBuffer) -> Result<()> {
        r.status()?;
        let version = r.read_version();
        self.base.unmarshal_root(r)?;
        self.value = r.read_string();
        // Empty strings are written with a second zero byte.
        if self.value.is_empty()
            && version.byte_count != 0
            && r.pos() + 1 == version.start + i64::from(version.byte_count) + 4
        {
            r.skip(1);
        }
        r.check_byte_count(&version, "TObjString")?;
        Ok(())
    }
}

impl Marshaler for ObjString {
    fn marshal_root(&self, w: &mut WBuffer) -> Result<()> {
        let start = w.write_version(OBJSTRING_VERSION);
        self.base.marshal_root(w)?;
        w.write_string(&self.value);
        w.set_byte_count(start, "TObjString");
        Ok(w.status()?)
    }
}

impl Object for ObjString {
    fn class(&self) -> &str {
        "TObjString"
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

    fn as_named(&self) -> Option<&dyn Named> {
        Some(self)
    }
}

impl Named for ObjString {
    fn name(&self) -> &str {
        &self.value
    }

    fn title(&self) -> &str {
        "Collectable string class"
    }
}
