//! Class loader interface.
//!
//! The runtime asks its loader for a descriptor whenever execution or
//! linking needs a class name that is not in the class table. Where the
//! bytes come from (archives, class paths, generated code) is the loader's
//! business.

use std::collections::HashMap;
use std::fmt;

use bytecode_system::ClassDescriptor;

/// Source of class descriptors by name
pub trait ClassLoader: fmt::Debug {
    /// Descriptor for `name`, or `None` if this loader cannot supply it
    fn load(&mut self, name: &str) -> Option<ClassDescriptor>;
}

/// In-memory loader over a fixed set of descriptors
///
/// Descriptors stay available after loading, so an unloaded class can be
/// loaded again.
///
/// # Examples
///
/// ```
/// use bytecode_system::ClassBuilder;
/// use interpreter::{ClassLoader, MapLoader};
///
/// let mut loader = MapLoader::new();
/// loader.add(ClassBuilder::new("Greeter").build());
/// assert!(loader.load("Greeter").is_some());
/// assert!(loader.load("Missing").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapLoader {
    classes: HashMap<String, ClassDescriptor>,
}

impl MapLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a descriptor loadable, replacing any with the same name
    pub fn add(&mut self, descriptor: ClassDescriptor) {
        self.classes.insert(descriptor.name.clone(), descriptor);
    }

    /// Whether `name` is loadable
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of loadable classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether nothing is loadable
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl FromIterator<ClassDescriptor> for MapLoader {
    fn from_iter<I: IntoIterator<Item = ClassDescriptor>>(iter: I) -> Self {
        let mut loader = MapLoader::new();
        for descriptor in iter {
            loader.add(descriptor);
        }
        loader
    }
}

impl ClassLoader for MapLoader {
    fn load(&mut self, name: &str) -> Option<ClassDescriptor> {
        self.classes.get(name).cloned()
    }
}
