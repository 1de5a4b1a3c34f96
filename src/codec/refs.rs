//! Object references
//!
//! Streams polymorphic objects through a buffer: the first occurrence of a
//! class writes its name, the first occurrence of an object writes its
//! payload, and every later occurrence is a 4-byte back-reference into the
//! buffer's reference table.

use std::sync::Arc;

use crate::error::{Result, RootError};
use crate::object::Object;
use crate::registry::Factory;

use super::{
    RBuffer, Ref, WBuffer, BYTE_COUNT_MASK, CLASS_MASK, MAP_OFFSET, MAX_CLASS_NAME, NEW_CLASS_TAG,
};

impl RBuffer {
    /// Read an object reference: null, back-reference, or a new object
    /// constructed through `factory`.
    pub fn read_object_any(&mut self, factory: &Factory) -> Result<Option<Arc<dyn Object>>> {
        self.status()?;

        let beg = self.pos();
        let first = self.read_u32();
        let (tag, byte_count, start) = if first & BYTE_COUNT_MASK == 0 || first == NEW_CLASS_TAG {
            (first, None, 0)
        } else {
            let start = self.pos();
            (self.read_u32(), Some(first & !BYTE_COUNT_MASK), start)
        };
        self.status()?;

        if tag & CLASS_MASK == 0 {
            if tag == 0 {
                return Ok(None);
            }
            if tag == 1 {
                return Err(RootError::Malformed(
                    "self-reference in object stream is not supported".to_string(),
                ));
            }
            return match self.refs.get(&i64::from(tag)) {
                Some(Ref::Object(obj)) => Ok(Some(Arc::clone(obj))),
                _ => {
                    tracing::warn!("unresolved object reference {} at pos {}", tag, beg);
                    if let Some(count) = byte_count {
                        self.set_pos(beg + i64::from(count) + 4);
                    }
                    self.status()?;
                    Ok(None)
                }
            };
        }

        let class = if tag == NEW_CLASS_TAG {
            let class = self.read_cstring(MAX_CLASS_NAME);
            self.status()?;
            let class_ref = match byte_count {
                Some(_) => start + MAP_OFFSET,
                None => self.refs.len() as i64 + 1,
            };
            self.refs.insert(class_ref, Ref::Class(class.clone()));
            class
        } else {
            let class_ref = i64::from(tag & !CLASS_MASK);
            match self.refs.get(&class_ref) {
                Some(Ref::Class(class)) => class.clone(),
                _ => {
                    return Err(RootError::Malformed(format!(
                        "unresolved class reference {} at pos {}",
                        class_ref, beg
                    )))
                }
            }
        };

        let ctor = factory.get(&class).ok_or_else(|| RootError::UnknownClass {
            class: class.clone(),
            key: String::new(),
        })?;
        let mut obj = ctor();
        obj.as_unmarshaler()
            .ok_or_else(|| RootError::NotUnmarshaler {
                class: class.clone(),
                key: String::new(),
            })?
            .unmarshal_root(self)?;

        if let Some(count) = byte_count {
            let end = beg + i64::from(count) + 4;
            if self.pos() != end {
                tracing::warn!(
                    "{}: object consumed {} bytes, byte count says {}",
                    class,
                    self.pos() - beg,
                    i64::from(count) + 4
                );
                self.set_pos(end);
                self.status()?;
            }
        }

        let obj: Arc<dyn Object> = Arc::from(obj);
        let obj_ref = match byte_count {
            Some(_) => beg + MAP_OFFSET,
            None => self.refs.len() as i64 + 1,
        };
        self.refs.insert(obj_ref, Ref::Object(Arc::clone(&obj)));
        Ok(Some(obj))
    }
}

impl WBuffer {
    /// Write an object reference: null, back-reference to an object already
    /// in this stream, or the object itself preceded by its class.
    pub fn write_object_any(&mut self, obj: Option<&Arc<dyn Object>>) -> Result<()> {
        self.status()?;

        let obj = match obj {
            Some(obj) => obj,
            None => {
                self.write_u32(0);
                return Ok(self.status()?);
            }
        };

        if let Some(idx) = self.object_ref(obj) {
            self.write_u32(idx as u32);
            return Ok(self.status()?);
        }

        let marshaler = obj.as_marshaler().ok_or_else(|| {
            RootError::Malformed(format!("class {:?} cannot encode itself", obj.class()))
        })?;

        let beg = self.pos();
        self.write_u32(0);

        let class = obj.class().to_string();
        match self.class_ref(&class) {
            Some(idx) => self.write_u32(idx as u32 | CLASS_MASK),
            None => {
                let start = self.pos();
                self.write_u32(NEW_CLASS_TAG);
                self.write_cstring(&class);
                self.refs.insert(start + MAP_OFFSET, Ref::Class(class.clone()));
            }
        }

        self.refs
            .insert(beg + MAP_OFFSET, Ref::Object(Arc::clone(obj)));
        marshaler.marshal_root(self)?;
        self.set_byte_count(beg, &class);
        Ok(self.status()?)
    }

    fn object_ref(&self, obj: &Arc<dyn Object>) -> Option<i64> {
        let ptr = Arc::as_ptr(obj) as *const ();
        self.refs.iter().find_map(|(idx, entry)| match entry {
            Ref::Object(seen) if Arc::as_ptr(seen) as *const () == ptr => Some(*idx),
            _ => None,
        })
    }

    fn class_ref(&self, class: &str) -> Option<i64> {
        self.refs.iter().find_map(|(idx, entry)| match entry {
            Ref::Class(seen) if seen == class => Some(*idx),
            _ => None,
        })
    }
}
