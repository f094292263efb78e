//! Late-binding resolution cache.
//!
//! One [`CacheSlot`] per constant-pool slot, stored beside the immutable class
//! descriptor. The linker fills slots; only its unresolve pass clears them.

use crate::class_table::ClassId;
use bytecode_system::AccessFlags;
use core_types::{BaseType, NativeOrdinal};

/// Which storage a resolved field lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStorage {
    /// Words in the declaring class's static area
    Static,
    /// Words in the declaring class's part of each instance
    Instance,
}

/// Concrete target of a Fieldref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedField {
    /// Declaring class
    pub owner: ClassId,
    /// Index into the owner's declared fields
    pub field_index: usize,
    /// Static or instance
    pub storage: FieldStorage,
    /// Word offset inside that storage
    pub offset: usize,
    /// Value-type tag from the descriptor
    pub base_type: BaseType,
    /// Field access flags
    pub access: AccessFlags,
}

/// How a resolved method is implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodBody {
    /// Native; `None` when no native implementation was located
    Native(Option<NativeOrdinal>),
    /// No code
    Abstract,
    /// Bytecode, by attribute index
    Code(u16),
}

/// Concrete target of a Methodref or InterfaceMethodref
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMethod {
    /// Declaring class
    pub owner: ClassId,
    /// Index into the owner's declared methods
    pub method_index: usize,
    /// Whether the method is static
    pub is_static: bool,
    /// Native, abstract or bytecode
    pub body: MethodBody,
    /// Index of the `Exceptions` attribute, if declared
    pub exceptions_attr: Option<u16>,
    /// Argument words, excluding the receiver
    pub arg_words: usize,
    /// Return value-type tag
    pub return_type: BaseType,
    /// Method access flags
    pub access: AccessFlags,
}

impl ResolvedMethod {
    /// Whether invoking acquires a monitor
    pub fn is_synchronized(&self) -> bool {
        self.access.is_synchronized()
    }
}

/// Resolution state of one constant-pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheSlot {
    /// Not resolved (or a literal that needs no linking)
    #[default]
    Unresolved,
    /// Resolved `Class`
    Class(ClassId),
    /// Resolved `Fieldref`
    Field(ResolvedField),
    /// Resolved `Methodref` / `InterfaceMethodref`
    Method(ResolvedMethod),
}

impl CacheSlot {
    /// Whether the slot holds a resolution
    pub fn is_resolved(&self) -> bool {
        !matches!(self, CacheSlot::Unresolved)
    }

    /// Class the resolution refers to
    pub fn target_class(&self) -> Option<ClassId> {
        match self {
            CacheSlot::Unresolved => None,
            CacheSlot::Class(id) => Some(*id),
            CacheSlot::Field(field) => Some(field.owner),
            CacheSlot::Method(method) => Some(method.owner),
        }
    }
}
