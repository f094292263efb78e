//! Instruction set and class model for the class-file VM
//!
//! This crate provides the immutable, parse-time view of a class: the opcode
//! enumeration, the constant pool, the class descriptor with its fields,
//! methods and code attributes, descriptor parsing and access flags. The
//! builders assemble descriptors in memory, standing in for a class-file
//! parser.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode};
//!
//! let mut leaf = ClassBuilder::new("Leaf").extends("Base");
//! let m = leaf.method_ref("Base", "m", "()V");
//!
//! let mut code = CodeBuilder::new(1, 1);
//! code.op(Opcode::Aload0).op(Opcode::Invokevirtual).u16(m).op(Opcode::Return);
//! leaf.method(AccessFlags::PUBLIC, "run", "()V", code.build());
//!
//! let descriptor = leaf.build();
//! assert_eq!(descriptor.super_name.as_deref(), Some("Base"));
//! assert_eq!(descriptor.constant_pool.member_ref(m).unwrap().class_name, "Base");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod builder;
pub mod class_file;
pub mod constant_pool;
pub mod descriptor;
pub mod opcode;

// Re-export main types at crate root
pub use access::AccessFlags;
pub use builder::{ClassBuilder, CodeBuilder, Label, OBJECT_CLASS};
pub use class_file::{
    package_of, Attribute, ClassDescriptor, CodeAttribute, ExceptionTableEntry, FieldInfo,
    MethodInfo,
};
pub use constant_pool::{ConstantEntry, ConstantPool, MemberRef};
pub use descriptor::{
    array_component, array_dimensions, descriptor_class_name, field_base_type, field_words,
    MethodSignature,
};
pub use opcode::{disassemble, instruction_length, Opcode};
