//! Object table: instances, arrays, monitors and string payloads.
//!
//! An instance of class `C` is a chain of objects, one per class from `C` up
//! to the root, linked through [`Object::parent`]. Each link holds only the
//! fields its own class declares. The chain is created and released as one.

use std::collections::HashMap;

use core_types::{BaseType, ObjectRef, ThreadId, VmError, Word};
use thiserror::Error;
use tracing::trace;

use crate::arena::SlotArena;
use crate::class_table::{ArrayInfo, ClassId, ClassTable};
use crate::heap::{AllocError, AllocHandle, Allocator};

/// Bytes charged per object on top of its field words
pub const OBJECT_HEADER_BYTES: usize = 16;

const STRING_CLASS: &str = "java/lang/String";

/// Failure to create an object
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// Allocation service refused
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// Class table inconsistency
    #[error(transparent)]
    Vm(#[from] VmError),
}

/// Re-entrant per-object monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Monitor {
    owner: Option<ThreadId>,
    count: u32,
}

impl Monitor {
    /// Acquire for `thread`; `false` if another thread holds it
    pub fn enter(&mut self, thread: ThreadId) -> bool {
        match self.owner {
            Some(owner) if owner != thread => false,
            _ => {
                self.owner = Some(thread);
                self.count += 1;
                true
            }
        }
    }

    /// Release once; `false` if `thread` is not the owner
    pub fn exit(&mut self, thread: ThreadId) -> bool {
        if self.owner != Some(thread) {
            return false;
        }
        self.count -= 1;
        if self.count == 0 {
            self.owner = None;
        }
        true
    }

    /// Current owner
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    /// Re-entry depth
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether a thread other than `thread` holds the monitor
    pub fn held_by_other(&self, thread: ThreadId) -> bool {
        matches!(self.owner, Some(owner) if owner != thread)
    }
}

/// Element storage of an array object
///
/// Every element takes [`BaseType::word_count`] words; sub-word types are
/// stored widened to a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayData {
    /// Element value-type tag
    pub element_type: BaseType,
    /// Number of elements
    pub length: usize,
    /// Raw element words
    pub data: Vec<Word>,
}

impl ArrayData {
    fn new(element_type: BaseType, length: usize) -> Self {
        Self {
            element_type,
            length,
            data: vec![0; length * element_type.word_count()],
        }
    }

    /// Words per element
    pub fn element_words(&self) -> usize {
        self.element_type.word_count()
    }

    /// Words of element `index`
    pub fn get(&self, index: usize) -> Option<&[Word]> {
        if index >= self.length {
            return None;
        }
        let w = self.element_words();
        Some(&self.data[index * w..(index + 1) * w])
    }

    /// Overwrite element `index`; `false` when out of bounds
    pub fn set(&mut self, index: usize, words: &[Word]) -> bool {
        let w = self.element_words();
        if index >= self.length || words.len() != w {
            return false;
        }
        self.data[index * w..(index + 1) * w].copy_from_slice(words);
        true
    }
}

/// One link of an object chain
#[derive(Debug, Clone)]
pub struct Object {
    /// Class this link belongs to
    pub class: ClassId,
    /// Fields declared by `class`
    pub fields: Vec<Word>,
    /// Superclass link, null at the root
    pub parent: ObjectRef,
    /// Element storage for arrays
    pub array: Option<ArrayData>,
    /// Monitor
    pub monitor: Monitor,
    /// Text payload of string objects
    pub text: Option<String>,
    handle: AllocHandle,
}

/// The object table
#[derive(Debug)]
pub struct ObjectTable {
    objects: SlotArena<Object>,
    allocator: Box<dyn Allocator>,
    strings: HashMap<String, ObjectRef>,
}

impl ObjectTable {
    /// Creates an empty table backed by `allocator`.
    pub fn new(allocator: Box<dyn Allocator>) -> Self {
        Self {
            objects: SlotArena::new(),
            allocator,
            strings: HashMap::new(),
        }
    }

    fn store(&mut self, object: Object) -> ObjectRef {
        ObjectRef::from_index(self.objects.insert(object))
    }

    /// Allocate an instance of `class` together with its superclass chain.
    pub fn instantiate(
        &mut self,
        classes: &ClassTable,
        class: ClassId,
    ) -> Result<ObjectRef, ObjectError> {
        let mut chain = vec![class];
        let mut current = class;
        while let Some(name) = classes.super_name(current) {
            current = classes
                .find(name)
                .ok_or_else(|| VmError::ClassNotFound(name.to_string()))?;
            chain.push(current);
        }

        let mut parent = ObjectRef::NULL;
        for &link in chain.iter().rev() {
            let words = classes.entry(link)?.layout.instance_words;
            let handle = match self
                .allocator
                .allocate(OBJECT_HEADER_BYTES + words * 4, true)
            {
                Ok(handle) => handle,
                Err(err) => {
                    self.release(parent);
                    return Err(err.into());
                }
            };
            parent = self.store(Object {
                class: link,
                fields: vec![0; words],
                parent,
                array: None,
                monitor: Monitor::default(),
                text: None,
                handle,
            });
        }
        trace!(class = class.0, object = ?parent, "instantiated");
        Ok(parent)
    }

    /// Allocate a zeroed array of class `array_class`.
    pub fn new_array(
        &mut self,
        array_class: ClassId,
        info: ArrayInfo,
        length: usize,
    ) -> Result<ObjectRef, ObjectError> {
        let element_type = info.element_type();
        let bytes = OBJECT_HEADER_BYTES + length * element_type.word_count() * 4;
        let handle = self.allocator.allocate(bytes, true)?;
        Ok(self.store(Object {
            class: array_class,
            fields: Vec::new(),
            parent: ObjectRef::NULL,
            array: Some(ArrayData::new(element_type, length)),
            monitor: Monitor::default(),
            text: None,
            handle,
        }))
    }

    /// The interned string object for `text`, creating it on first use.
    pub fn intern_string(
        &mut self,
        classes: &ClassTable,
        text: &str,
    ) -> Result<ObjectRef, ObjectError> {
        if let Some(&existing) = self.strings.get(text) {
            return Ok(existing);
        }
        let class = classes
            .find(STRING_CLASS)
            .ok_or_else(|| VmError::ClassNotFound(STRING_CLASS.to_string()))?;
        let object = self.instantiate(classes, class)?;
        if let Some(link) = self.get_mut(object) {
            link.text = Some(text.to_string());
        }
        self.strings.insert(text.to_string(), object);
        Ok(object)
    }

    /// Release an object and its whole superclass chain.
    pub fn release(&mut self, object: ObjectRef) {
        let mut current = object;
        while let Some(index) = current.index() {
            let Some(link) = self.objects.remove(index) else {
                break;
            };
            self.allocator.release(link.handle);
            if let Some(text) = link.text {
                if self.strings.get(&text) == Some(&current) {
                    self.strings.remove(&text);
                }
            }
            current = link.parent;
        }
    }

    /// Number of live links whose class is `class`
    ///
    /// Counts every chain link, so a subclass instance also counts for each
    /// of its superclasses.
    pub fn instances_of(&self, class: ClassId) -> usize {
        self.objects
            .iter()
            .filter(|(_, link)| link.class == class)
            .count()
    }

    /// Object for a reference
    pub fn get(&self, object: ObjectRef) -> Option<&Object> {
        self.objects.get(object.index()?)
    }

    /// Mutable object for a reference
    pub fn get_mut(&mut self, object: ObjectRef) -> Option<&mut Object> {
        self.objects.get_mut(object.index()?)
    }

    /// Object for a reference, or [`VmError::InvalidReference`]
    pub fn object(&self, object: ObjectRef) -> Result<&Object, VmError> {
        self.get(object).ok_or(VmError::InvalidReference)
    }

    /// Mutable object for a reference, or [`VmError::InvalidReference`]
    pub fn object_mut(&mut self, object: ObjectRef) -> Result<&mut Object, VmError> {
        self.get_mut(object).ok_or(VmError::InvalidReference)
    }

    /// Run-time class of an object
    pub fn class_of(&self, object: ObjectRef) -> Option<ClassId> {
        self.get(object).map(|o| o.class)
    }

    /// The link of `object`'s chain that belongs to `class`
    pub fn find_in_chain(&self, object: ObjectRef, class: ClassId) -> Option<ObjectRef> {
        let mut current = object;
        loop {
            let link = self.get(current)?;
            if link.class == class {
                return Some(current);
            }
            current = link.parent;
        }
    }

    /// Text of a string object
    pub fn string_text(&self, object: ObjectRef) -> Option<&str> {
        self.get(object)?.text.as_deref()
    }

    /// Number of live object links
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no object is live
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The allocation service
    pub fn allocator(&self) -> &dyn Allocator {
        self.allocator.as_ref()
    }
}
