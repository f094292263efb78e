//! Memory Manager - class table, object table and allocation service
//!
//! This component provides:
//! - A slot arena with stable indices and an explicit free list
//! - The class table with status flags, field layouts and the late-binding
//!   resolution cache kept beside each immutable descriptor
//! - The object table: superclass object chains, arrays, monitors and
//!   interned strings
//! - The [`Allocator`] service interface and a budgeted [`Heap`]
//! - Reference-count hooks consulted before a class is unloaded

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod cache;
pub mod class_table;
pub mod heap;
pub mod object;
pub mod refcount;
pub mod status;

// Re-export main types
pub use arena::SlotArena;
pub use cache::{CacheSlot, FieldStorage, MethodBody, ResolvedField, ResolvedMethod};
pub use class_table::{
    ArrayComponent, ArrayInfo, ClassEntry, ClassId, ClassTable, FieldLayout, FieldSlot,
    ARRAY_INTERFACES,
};
pub use heap::{AllocError, AllocHandle, Allocator, Heap, HeapStats};
pub use object::{ArrayData, Monitor, Object, ObjectError, ObjectTable, OBJECT_HEADER_BYTES};
pub use refcount::{RefCounts, RefNode, ReferenceTracker};
pub use status::ClassStatus;
