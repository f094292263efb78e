//! Class table: one entry per loaded class, interface, array type or
//! primitive pseudo-class.
//!
//! Entries are addressed by [`ClassId`], which stays valid for the class's
//! whole lifetime, including across a reload of its descriptor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytecode_system::{
    field_base_type, AccessFlags, ClassDescriptor, ConstantPool, OBJECT_CLASS,
};
use core_types::{BaseType, ObjectRef, VmError, VmResult, Word};
use tracing::debug;

use crate::arena::SlotArena;
use crate::cache::{CacheSlot, FieldStorage};
use crate::status::ClassStatus;

/// Interfaces every array type implements
pub const ARRAY_INTERFACES: [&str; 2] = ["java/lang/Cloneable", "java/io/Serializable"];

/// Stable class-table index
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

impl ClassId {
    /// Raw table index
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

/// Component type of an array class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayComponent {
    /// Primitive elements
    Primitive(BaseType),
    /// Reference elements of this class (possibly itself an array)
    Class(ClassId),
}

/// Array metadata of an array class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    /// Component type
    pub component: ArrayComponent,
    /// Number of dimensions (`[[I` has 2)
    pub dimensions: usize,
}

impl ArrayInfo {
    /// Value-type tag of each element
    pub fn element_type(&self) -> BaseType {
        match self.component {
            ArrayComponent::Primitive(base) => base,
            ArrayComponent::Class(_) => BaseType::Reference,
        }
    }
}

/// Where one declared field's words live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    /// Index into the declared fields
    pub field_index: usize,
    /// Word offset inside the storage
    pub offset: usize,
    /// Value-type tag
    pub base_type: BaseType,
}

/// Static and instance field tables of one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldLayout {
    /// Static fields, in declaration order
    pub statics: Vec<FieldSlot>,
    /// Instance fields declared by this class, in declaration order
    pub instance: Vec<FieldSlot>,
    /// Words of static storage
    pub static_words: usize,
    /// Words this class contributes to each instance
    pub instance_words: usize,
}

impl FieldLayout {
    /// Lay out the fields of `descriptor`
    pub fn of(descriptor: &ClassDescriptor) -> Self {
        let mut layout = FieldLayout::default();
        for (field_index, field) in descriptor.fields.iter().enumerate() {
            let base_type = field_base_type(&field.descriptor).unwrap_or(BaseType::Int);
            let (table, words) = if field.access.is_static() {
                (&mut layout.statics, &mut layout.static_words)
            } else {
                (&mut layout.instance, &mut layout.instance_words)
            };
            table.push(FieldSlot {
                field_index,
                offset: *words,
                base_type,
            });
            *words += base_type.word_count();
        }
        layout
    }

    /// Which table holds field `field_index`, and where
    pub fn classify(&self, field_index: usize) -> Option<(FieldStorage, FieldSlot)> {
        if let Some(slot) = self.statics.iter().find(|s| s.field_index == field_index) {
            return Some((FieldStorage::Static, *slot));
        }
        self.instance
            .iter()
            .find(|s| s.field_index == field_index)
            .map(|slot| (FieldStorage::Instance, *slot))
    }
}

/// One class-table entry
#[derive(Debug, Clone)]
pub struct ClassEntry {
    /// Status flags
    pub status: ClassStatus,
    /// Parsed descriptor, shared with running frames
    pub descriptor: Arc<ClassDescriptor>,
    /// Array metadata for array classes
    pub array: Option<ArrayInfo>,
    /// Value type for primitive pseudo-classes
    pub primitive: Option<BaseType>,
    /// Field tables
    pub layout: FieldLayout,
    /// Static field storage
    pub statics: Vec<Word>,
    /// Late-binding cache, one slot per constant-pool slot
    pub cache: Vec<CacheSlot>,
    /// Lazily created `java/lang/Class` instance
    pub class_object: ObjectRef,
}

impl ClassEntry {
    fn new(descriptor: ClassDescriptor, status: ClassStatus) -> Self {
        let layout = FieldLayout::of(&descriptor);
        Self {
            status: status | ClassStatus::IN_USE,
            statics: vec![0; layout.static_words],
            cache: vec![CacheSlot::Unresolved; descriptor.constant_pool.len()],
            layout,
            descriptor: Arc::new(descriptor),
            array: None,
            primitive: None,
            class_object: ObjectRef::NULL,
        }
    }

    /// Fully-qualified name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.descriptor.is_interface()
    }
}

/// The class table
#[derive(Debug, Default)]
pub struct ClassTable {
    entries: SlotArena<ClassEntry>,
    by_name: HashMap<String, ClassId>,
}

impl ClassTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_entry(&mut self, entry: ClassEntry) -> VmResult<ClassId> {
        if self.by_name.contains_key(entry.name()) {
            return Err(VmError::DuplicateClass(entry.name().to_string()));
        }
        let name = entry.name().to_string();
        let id = ClassId(self.entries.insert(entry));
        debug!(class = %name, id = id.0, "class defined");
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Add a class; fails if the name is taken.
    pub fn insert(&mut self, descriptor: ClassDescriptor) -> VmResult<ClassId> {
        self.insert_entry(ClassEntry::new(descriptor, ClassStatus::empty()))
    }

    /// Replace the descriptor of an unlinked class, keeping its index.
    ///
    /// Static storage and the resolution cache are reset.
    pub fn reload(&mut self, id: ClassId, descriptor: ClassDescriptor) -> VmResult<()> {
        let entry = self.entry(id)?;
        if entry.status.is_linked() {
            return Err(VmError::ClassInUse(entry.name().to_string()));
        }
        if entry.name() != descriptor.name {
            if let Some(&other) = self.by_name.get(&descriptor.name) {
                if other != id {
                    return Err(VmError::DuplicateClass(descriptor.name));
                }
            }
        }
        let old_name = entry.name().to_string();
        let status = entry.status;
        let class_object = entry.class_object;

        let mut fresh = ClassEntry::new(descriptor, ClassStatus::empty());
        fresh.status = status;
        fresh.status.remove(ClassStatus::INITIALIZED);
        fresh.class_object = class_object;
        self.by_name.remove(&old_name);
        self.by_name.insert(fresh.name().to_string(), id);
        debug!(class = %fresh.name(), id = id.0, "class reloaded");
        if let Some(slot) = self.entries.get_mut(id.0) {
            *slot = fresh;
        }
        Ok(())
    }

    /// Index of the class with this name
    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Entry for a live index
    pub fn get(&self, id: ClassId) -> Option<&ClassEntry> {
        self.entries.get(id.0)
    }

    /// Mutable entry for a live index
    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut ClassEntry> {
        self.entries.get_mut(id.0)
    }

    /// Entry for a live index, or [`VmError::InvalidClass`]
    pub fn entry(&self, id: ClassId) -> VmResult<&ClassEntry> {
        self.get(id).ok_or(VmError::InvalidClass(id.0))
    }

    /// Mutable entry for a live index, or [`VmError::InvalidClass`]
    pub fn entry_mut(&mut self, id: ClassId) -> VmResult<&mut ClassEntry> {
        self.get_mut(id).ok_or(VmError::InvalidClass(id.0))
    }

    /// Shared descriptor of a class
    pub fn descriptor(&self, id: ClassId) -> Option<&Arc<ClassDescriptor>> {
        self.get(id).map(|e| &e.descriptor)
    }

    /// Name of a class
    pub fn name(&self, id: ClassId) -> Option<&str> {
        self.get(id).map(ClassEntry::name)
    }

    /// Status flags; empty for a dead index
    pub fn status(&self, id: ClassId) -> ClassStatus {
        self.get(id).map_or(ClassStatus::empty(), |e| e.status)
    }

    /// Whether the index addresses a live class
    pub fn is_in_use(&self, id: ClassId) -> bool {
        self.status(id).is_in_use()
    }

    /// Name of the direct superclass
    ///
    /// Arrays report the root object type.
    pub fn super_name(&self, id: ClassId) -> Option<&str> {
        let entry = self.get(id)?;
        if entry.status.is_array() {
            return Some(OBJECT_CLASS);
        }
        entry.descriptor.super_name.as_deref()
    }

    /// Direct superclass, if it is loaded
    pub fn super_class(&self, id: ClassId) -> Option<ClassId> {
        self.find(self.super_name(id)?)
    }

    /// Array metadata
    pub fn array_info(&self, id: ClassId) -> Option<ArrayInfo> {
        self.get(id)?.array
    }

    /// Name of the array class with this component
    pub fn array_name(&self, component: ArrayComponent) -> VmResult<String> {
        Ok(match component {
            ArrayComponent::Primitive(base) => format!("[{}", base.descriptor_char()),
            ArrayComponent::Class(id) => {
                let entry = self.entry(id)?;
                if entry.status.is_array() {
                    format!("[{}", entry.name())
                } else {
                    format!("[L{};", entry.name())
                }
            }
        })
    }

    /// Find or synthesize the array class with this component
    pub fn array_class(&mut self, component: ArrayComponent) -> VmResult<ClassId> {
        let name = self.array_name(component)?;
        if let Some(id) = self.find(&name) {
            return Ok(id);
        }
        let dimensions = match component {
            ArrayComponent::Primitive(_) => 1,
            ArrayComponent::Class(id) => self.array_info(id).map_or(0, |a| a.dimensions) + 1,
        };
        let descriptor = ClassDescriptor {
            name,
            super_name: Some(OBJECT_CLASS.to_string()),
            interfaces: ARRAY_INTERFACES.iter().map(|s| s.to_string()).collect(),
            access: AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ABSTRACT,
            constant_pool: ConstantPool::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        let mut entry = ClassEntry::new(
            descriptor,
            ClassStatus::ARRAY | ClassStatus::LINKED | ClassStatus::INITIALIZED,
        );
        entry.array = Some(ArrayInfo {
            component,
            dimensions,
        });
        self.insert_entry(entry)
    }

    /// Find a class by name, synthesizing array classes whose element class
    /// is already present
    ///
    /// Returns `None` when the name (or an array's element class) is not
    /// loaded.
    pub fn find_or_synthesize(&mut self, name: &str) -> VmResult<Option<ClassId>> {
        if let Some(id) = self.find(name) {
            return Ok(Some(id));
        }
        let Some(component) = name.strip_prefix('[') else {
            return Ok(None);
        };
        let component = if component.starts_with('[') {
            match self.find_or_synthesize(component)? {
                Some(id) => ArrayComponent::Class(id),
                None => return Ok(None),
            }
        } else if let Some(class_name) = component
            .strip_prefix('L')
            .and_then(|c| c.strip_suffix(';'))
        {
            match self.find(class_name) {
                Some(id) => ArrayComponent::Class(id),
                None => return Ok(None),
            }
        } else {
            match field_base_type(component) {
                Some(base) if base.is_primitive() && component.len() == 1 => {
                    ArrayComponent::Primitive(base)
                }
                _ => return Ok(None),
            }
        };
        self.array_class(component).map(Some)
    }

    /// Find or synthesize the primitive pseudo-class for `base`
    pub fn primitive_class(&mut self, base: BaseType) -> VmResult<ClassId> {
        let name = base
            .primitive_name()
            .ok_or_else(|| VmError::ClassNotFound(format!("{:?}", base)))?;
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        let descriptor = ClassDescriptor {
            name: name.to_string(),
            super_name: None,
            interfaces: Vec::new(),
            access: AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ABSTRACT,
            constant_pool: ConstantPool::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        let mut entry = ClassEntry::new(
            descriptor,
            ClassStatus::PRIMITIVE | ClassStatus::LINKED | ClassStatus::INITIALIZED,
        );
        entry.primitive = Some(base);
        self.insert_entry(entry)
    }

    /// Storage class and slot of a declared field
    pub fn classify_field(&self, id: ClassId, field_index: usize) -> Option<(FieldStorage, FieldSlot)> {
        self.get(id)?.layout.classify(field_index)
    }

    /// Flag a class for collection
    pub fn request_collection(&mut self, id: ClassId) -> VmResult<()> {
        self.entry_mut(id)?.status.insert(ClassStatus::GC_PENDING);
        Ok(())
    }

    /// Remove a class; it must have been unresolved first.
    pub fn remove(&mut self, id: ClassId) -> VmResult<ClassEntry> {
        let entry = self.entry(id)?;
        let synthesized = entry.status.is_array() || entry.status.is_primitive();
        if entry.status.is_linked() && !synthesized {
            return Err(VmError::ClassInUse(entry.name().to_string()));
        }
        let entry = self.entries.remove(id.0).ok_or(VmError::InvalidClass(id.0))?;
        self.by_name.remove(entry.name());
        debug!(class = %entry.name(), id = id.0, "class removed");
        Ok(entry)
    }

    /// Live class indices in table order
    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.entries.iter().map(|(i, _)| ClassId(i))
    }

    /// Number of live classes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
