//! Immutable in-memory class descriptor
//!
//! A [`ClassDescriptor`] is what the (external) class-file parser produces and
//! what [`ClassBuilder`](crate::ClassBuilder) assembles. It is never mutated
//! after construction; all resolution state lives outside it.

use crate::access::AccessFlags;
use crate::constant_pool::ConstantPool;

/// One row of a method's exception table
///
/// The covered range is `[start_pc, end_pc)`. A `catch_type` of `0` catches
/// anything; otherwise it indexes a `Class` constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    /// First covered offset
    pub start_pc: u16,
    /// One past the last covered offset
    pub end_pc: u16,
    /// Handler offset
    pub handler_pc: u16,
    /// Constant-pool index of the caught class, or `0`
    pub catch_type: u16,
}

impl ExceptionTableEntry {
    /// Whether the entry covers instruction offset `pc`
    pub fn covers(&self, pc: u32) -> bool {
        pc >= self.start_pc as u32 && pc < self.end_pc as u32
    }

    /// Whether the entry catches every throwable
    pub fn catches_any(&self) -> bool {
        self.catch_type == 0
    }
}

/// The `Code` attribute of a concrete method
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeAttribute {
    /// Maximum operand stack depth in words
    pub max_stack: u16,
    /// Local variable slots including arguments
    pub max_locals: u16,
    /// Bytecode
    pub code: Vec<u8>,
    /// Handlers in declaration order
    pub exception_table: Vec<ExceptionTableEntry>,
}

/// A method attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Bytecode body
    Code(CodeAttribute),
    /// Declared checked exceptions, as `Class` constant indices
    Exceptions(Vec<u16>),
    /// Any attribute the runtime does not interpret, by name
    Other(String),
}

/// A declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Access flags
    pub access: AccessFlags,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

/// A declared method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Access flags
    pub access: AccessFlags,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Attributes in declaration order
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    /// Index of the `Code` attribute
    pub fn code_attribute_index(&self) -> Option<u16> {
        self.attributes
            .iter()
            .position(|a| matches!(a, Attribute::Code(_)))
            .map(|i| i as u16)
    }

    /// Index of the `Exceptions` attribute
    pub fn exceptions_attribute_index(&self) -> Option<u16> {
        self.attributes
            .iter()
            .position(|a| matches!(a, Attribute::Exceptions(_)))
            .map(|i| i as u16)
    }

    /// `Code` attribute at `index`
    pub fn code_at(&self, index: u16) -> Option<&CodeAttribute> {
        match self.attributes.get(index as usize)? {
            Attribute::Code(code) => Some(code),
            _ => None,
        }
    }

    /// First `Code` attribute
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.code_at(self.code_attribute_index()?)
    }

    /// Whether this is an instance or class initializer
    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }
}

/// Parsed, immutable class or interface
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    /// Fully-qualified internal name (`java/lang/Object`)
    pub name: String,
    /// Superclass name; `None` only for the root class
    pub super_name: Option<String>,
    /// Directly implemented (or, for interfaces, extended) interfaces
    pub interfaces: Vec<String>,
    /// Class access flags
    pub access: AccessFlags,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Declared fields
    pub fields: Vec<FieldInfo>,
    /// Declared methods
    pub methods: Vec<MethodInfo>,
}

impl ClassDescriptor {
    /// Whether this descriptor is an interface
    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    /// Index of the field declared here with this name and descriptor
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name && f.descriptor == descriptor)
    }

    /// Index of the method declared here with this name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Method at `index`
    pub fn method(&self, index: usize) -> Option<&MethodInfo> {
        self.methods.get(index)
    }

    /// Package prefix of the name (text before the final `/`); empty for
    /// the unnamed package
    pub fn package_name(&self) -> &str {
        package_of(&self.name)
    }
}

/// Package prefix of a fully-qualified internal class name
///
/// # Examples
///
/// ```
/// use bytecode_system::package_of;
///
/// assert_eq!(package_of("java/lang/String"), "java/lang");
/// assert_eq!(package_of("Main"), "");
/// ```
pub fn package_of(name: &str) -> &str {
    let name = name.trim_start_matches('[');
    match name.rfind('/') {
        Some(split) => name[..split].trim_start_matches('L'),
        None => "",
    }
}
