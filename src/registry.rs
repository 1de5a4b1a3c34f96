//! Class registry
//!
//! Maps the class-name strings found in record headers to constructors.
//!
//! ## Contract
//! - Registration happens during start-up, before any decode begins
//! - At most one constructor per class name: the last registration wins
//! - Nothing is ever removed
//!
//! A process-wide instance pre-loaded with the built-in classes is available
//! through [`factory()`]; explicit instances can be built with
//! [`Factory::new`] and passed to [`Key::object_with`](crate::Key::object_with).

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::directory::Directory;
use crate::key::Key;
use crate::object::Object;
use crate::objects::{ObjString, TObject};

/// Zero-argument constructor producing a fresh instance
pub type FactoryFn = fn() -> Box<dyn Object>;

/// Registry of constructors, keyed by class name
#[derive(Default)]
pub struct Factory {
    entries: RwLock<HashMap<String, FactoryFn>>,
}

impl Factory {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the crate's built-in classes
    pub fn with_builtins() -> Self {
        let factory = Self::new();
        factory.register("TKey", || Box::new(Key::default()));
        factory.register("TDirectory", || Box::new(Directory::default()));
        factory.register("TDirectoryFile", || Box::new(Directory::default()));
        factory.register("TObject", || Box::new(TObject::default()));
        factory.register("TObjString", || Box::new(ObjString::default()));
        factory
    }

    /// Register `ctor` under `class`.
    ///
    /// Returns the constructor it replaced, if any.
    pub fn register(&self, class: impl Into<String>, ctor: FactoryFn) -> Option<FactoryFn> {
        let class = class.into();
        let previous = self.entries.write().insert(class.clone(), ctor);
        if previous.is_some() {
            tracing::debug!("Replaced factory for class {:?}", class);
        } else {
            tracing::debug!("Registered factory for class {:?}", class);
        }
        previous
    }

    /// Look up the constructor for `class`
    pub fn get(&self, class: &str) -> Option<FactoryFn> {
        self.entries.read().get(class).copied()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.entries.read().contains_key(class)
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered class names, sorted
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.entries.read().keys().cloned().collect();
        classes.sort();
        classes
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("classes", &self.classes())
            .finish()
    }
}

/// The process-wide registry, initialised with the built-in classes on first use
pub fn factory() -> &'static Factory {
    static FACTORY: OnceLock<Factory> = OnceLock::new();
    FACTORY.get_or_init(Factory::with_builtins)
}
