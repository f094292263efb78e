//! In-memory assembly of class descriptors and method bodies
//!
//! The runtime never parses class files itself; embedders and tests assemble
//! descriptors with these builders.
//!
//! # Examples
//!
//! ```
//! use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode};
//!
//! let mut class = ClassBuilder::new("demo/Counter");
//! let zero = class.integer(0);
//! let mut code = CodeBuilder::new(1, 0);
//! code.op(Opcode::Ldc).u8(zero as u8).op(Opcode::Ireturn);
//! class.method(
//!     AccessFlags::PUBLIC | AccessFlags::STATIC,
//!     "zero",
//!     "()I",
//!     code.build(),
//! );
//! let descriptor = class.build();
//! assert_eq!(descriptor.package_name(), "demo");
//! assert!(descriptor.find_method("zero", "()I").is_some());
//! ```

use crate::access::AccessFlags;
use crate::class_file::{
    Attribute, ClassDescriptor, CodeAttribute, ExceptionTableEntry, FieldInfo, MethodInfo,
};
use crate::constant_pool::{ConstantEntry, ConstantPool};
use crate::opcode::Opcode;

/// Root class every builder extends unless told otherwise
pub const OBJECT_CLASS: &str = "java/lang/Object";

/// Builder for a [`ClassDescriptor`]
///
/// Constant-pool helpers return the index of an existing equal entry when
/// there is one.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access: AccessFlags,
    pool: ConstantPool,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
}

impl ClassBuilder {
    /// Public class extending `java/lang/Object`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some(OBJECT_CLASS.to_string()),
            interfaces: Vec::new(),
            access: AccessFlags::PUBLIC | AccessFlags::SUPER,
            pool: ConstantPool::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Public interface
    pub fn interface(name: &str) -> Self {
        Self::new(name).access(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT)
    }

    /// Set the superclass
    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    /// Declare this as the root class
    pub fn without_super(mut self) -> Self {
        self.super_name = None;
        self
    }

    /// Add a directly implemented interface
    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Replace the class access flags
    pub fn access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    fn intern(&mut self, entry: ConstantEntry) -> u16 {
        match self.pool.position(&entry) {
            Some(index) => index,
            None => self.pool.push(entry),
        }
    }

    /// `Utf8` constant
    pub fn utf8(&mut self, text: &str) -> u16 {
        self.intern(ConstantEntry::Utf8(text.to_string()))
    }

    /// `Class` constant
    pub fn class_ref(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.intern(ConstantEntry::Class { name_index })
    }

    /// `String` constant
    pub fn string(&mut self, text: &str) -> u16 {
        let string_index = self.utf8(text);
        self.intern(ConstantEntry::String { string_index })
    }

    /// `Integer` constant
    pub fn integer(&mut self, value: i32) -> u16 {
        self.intern(ConstantEntry::Integer(value))
    }

    /// `Float` constant
    pub fn float(&mut self, value: f32) -> u16 {
        self.intern(ConstantEntry::Float(value))
    }

    /// `Long` constant
    pub fn long(&mut self, value: i64) -> u16 {
        self.intern(ConstantEntry::Long(value))
    }

    /// `Double` constant
    pub fn double(&mut self, value: f64) -> u16 {
        self.intern(ConstantEntry::Double(value))
    }

    /// `NameAndType` constant
    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.intern(ConstantEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// `Fieldref` constant
    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class_ref(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(ConstantEntry::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    /// `Methodref` constant
    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class_ref(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(ConstantEntry::Methodref {
            class_index,
            name_and_type_index,
        })
    }

    /// `InterfaceMethodref` constant
    pub fn interface_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class_ref(class);
        let name_and_type_index = self.name_and_type(name, descriptor);
        self.intern(ConstantEntry::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })
    }

    /// Declare a field; returns its index
    pub fn field(&mut self, access: AccessFlags, name: &str, descriptor: &str) -> usize {
        self.fields.push(FieldInfo {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        self.fields.len() - 1
    }

    fn push_method(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) -> usize {
        self.methods.push(MethodInfo {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes,
        });
        self.methods.len() - 1
    }

    /// Declare a method with a bytecode body; returns its index
    pub fn method(
        &mut self,
        access: AccessFlags,
        name: &str,
        descriptor: &str,
        code: CodeAttribute,
    ) -> usize {
        self.push_method(access, name, descriptor, vec![Attribute::Code(code)])
    }

    /// Declare an abstract method
    pub fn abstract_method(&mut self, access: AccessFlags, name: &str, descriptor: &str) -> usize {
        self.push_method(access | AccessFlags::ABSTRACT, name, descriptor, Vec::new())
    }

    /// Declare a native method
    pub fn native_method(&mut self, access: AccessFlags, name: &str, descriptor: &str) -> usize {
        self.push_method(access | AccessFlags::NATIVE, name, descriptor, Vec::new())
    }

    /// Add `class` to the declared exceptions of method `method`
    pub fn throws(&mut self, method: usize, class: &str) {
        let index = self.class_ref(class);
        let Some(info) = self.methods.get_mut(method) else {
            return;
        };
        for attribute in info.attributes.iter_mut() {
            if let Attribute::Exceptions(list) = attribute {
                list.push(index);
                return;
            }
        }
        info.attributes.push(Attribute::Exceptions(vec![index]));
    }

    /// Finish the descriptor
    pub fn build(self) -> ClassDescriptor {
        ClassDescriptor {
            name: self.name,
            super_name: self.super_name,
            interfaces: self.interfaces,
            access: self.access,
            constant_pool: self.pool,
            fields: self.fields,
            methods: self.methods,
        }
    }
}

/// Position of a branch whose target is patched later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    instruction: usize,
    operand: usize,
    wide: bool,
}

/// Builder for a [`CodeAttribute`]
///
/// Operand emitters are chainable; branch offsets are relative to the start
/// of the branching instruction, as the instruction set defines them.
#[derive(Debug, Clone, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    max_stack: u16,
    max_locals: u16,
    exception_table: Vec<ExceptionTableEntry>,
}

impl CodeBuilder {
    /// Empty body with the given frame sizes
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Self {
            max_stack,
            max_locals,
            ..Self::default()
        }
    }

    /// Current offset (where the next byte goes)
    pub fn offset(&self) -> u16 {
        self.code.len() as u16
    }

    /// Emit an opcode
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.code.push(opcode as u8);
        self
    }

    /// Emit a raw byte
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.code.push(value);
        self
    }

    /// Emit a big-endian `u16`
    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Emit a big-endian `i16`
    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Emit a big-endian `i32`
    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.code.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Push an `int` with the shortest encoding that fits
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.op(Opcode::IconstM1),
            0 => self.op(Opcode::Iconst0),
            1 => self.op(Opcode::Iconst1),
            2 => self.op(Opcode::Iconst2),
            3 => self.op(Opcode::Iconst3),
            4 => self.op(Opcode::Iconst4),
            5 => self.op(Opcode::Iconst5),
            v if i8::try_from(v).is_ok() => self.op(Opcode::Bipush).u8(v as i8 as u8),
            v if i16::try_from(v).is_ok() => self.op(Opcode::Sipush).i16(v as i16),
            v => {
                // high << 16 + signed low, both in sipush range
                let low = v as i16;
                let high = ((v as i64 - low as i64) >> 16) as i16;
                self.op(Opcode::Sipush)
                    .i16(high)
                    .op(Opcode::Bipush)
                    .u8(16)
                    .op(Opcode::Ishl)
                    .op(Opcode::Sipush)
                    .i16(low)
                    .op(Opcode::Iadd)
            }
        }
    }

    /// Load constant-pool entry `index` with `ldc` or `ldc_w`
    pub fn ldc(&mut self, index: u16) -> &mut Self {
        match u8::try_from(index) {
            Ok(short) => self.op(Opcode::Ldc).u8(short),
            Err(_) => self.op(Opcode::LdcW).u16(index),
        }
    }

    /// Emit a 16-bit branch to an already known `target`
    pub fn branch(&mut self, opcode: Opcode, target: u16) -> &mut Self {
        let start = self.offset() as i32;
        self.op(opcode).i16((target as i32 - start) as i16)
    }

    /// Emit a 16-bit branch whose target is bound later with [`bind`](Self::bind)
    pub fn forward(&mut self, opcode: Opcode) -> Label {
        let instruction = self.code.len();
        self.op(opcode).i16(0);
        Label {
            instruction,
            operand: instruction + 1,
            wide: false,
        }
    }

    /// Emit a `goto_w` whose target is bound later
    pub fn forward_wide(&mut self) -> Label {
        let instruction = self.code.len();
        self.op(Opcode::GotoW).i32(0);
        Label {
            instruction,
            operand: instruction + 1,
            wide: true,
        }
    }

    /// Point `label` at `target`
    pub fn patch(&mut self, label: Label, target: u16) -> &mut Self {
        let relative = target as i32 - label.instruction as i32;
        if label.wide {
            self.code[label.operand..label.operand + 4].copy_from_slice(&relative.to_be_bytes());
        } else {
            self.code[label.operand..label.operand + 2]
                .copy_from_slice(&(relative as i16).to_be_bytes());
        }
        self
    }

    /// Point `label` at the current offset
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let here = self.offset();
        self.patch(label, here)
    }

    /// Pad with zero bytes so the next byte is 4-aligned (switch operands)
    pub fn align4(&mut self) -> &mut Self {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
        self
    }

    /// Add an exception-table row covering `[start, end)`
    pub fn handler(&mut self, start: u16, end: u16, handler: u16, catch_type: u16) -> &mut Self {
        self.exception_table.push(ExceptionTableEntry {
            start_pc: start,
            end_pc: end,
            handler_pc: handler,
            catch_type,
        });
        self
    }

    /// Finish the body
    pub fn build(&self) -> CodeAttribute {
        CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code.clone(),
            exception_table: self.exception_table.clone(),
        }
    }
}
