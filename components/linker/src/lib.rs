//! Dynamic linker and class-hierarchy queries
//!
//! The hierarchy module answers subtype, interface, package and
//! accessibility questions over the class table without mutating it. The
//! resolver turns constant-pool symbolic references into class, field and
//! method table entries, caching each result in the class's late-binding
//! cache and reporting every cross-class edge to the reference hooks.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode, OBJECT_CLASS};
//! use linker::{Linker, NoNatives};
//! use memory_manager::{CacheSlot, ClassTable, RefCounts};
//!
//! let mut classes = ClassTable::new();
//! let mut object = ClassBuilder::new(OBJECT_CLASS).without_super();
//! let mut code = CodeBuilder::new(0, 1);
//! code.op(Opcode::Return);
//! object.method(AccessFlags::PUBLIC, "<init>", "()V", code.build());
//! let object = classes.insert(object.build()).unwrap();
//!
//! let mut user = ClassBuilder::new("User");
//! let init = user.method_ref(OBJECT_CLASS, "<init>", "()V");
//! let user = classes.insert(user.build()).unwrap();
//!
//! let mut refs = RefCounts::new();
//! let linked = Linker::new(&mut classes, &mut refs, &NoNatives)
//!     .resolve(user, false)
//!     .unwrap();
//! assert!(linked);
//! match classes.get(user).unwrap().cache[init as usize] {
//!     CacheSlot::Method(method) => assert_eq!(method.owner, object),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hierarchy;
pub mod native;
pub mod resolve;

pub use hierarchy::{
    class_has_member, implements_interface, is_a, is_accessible_to, is_assignable,
    is_superinterface_of, member_is_accessible_to, same_package, superclasses, superinterfaces,
    Ancestry, MemberKind, MemberRef,
};
pub use native::{NativeLocator, NoNatives};
pub use resolve::{classify_field, classify_method, Linker, SlotOutcome};
