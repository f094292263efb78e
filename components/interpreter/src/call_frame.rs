//! Call frames for the per-thread method activation stack

use std::sync::Arc;

use bytecode_system::{ClassDescriptor, CodeAttribute};
use core_types::ObjectRef;
use memory_manager::ClassId;

/// Position of execution inside a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramCounter {
    /// Class declaring the executing method
    pub class: ClassId,
    /// Method index in that class
    pub method: usize,
    /// Index of the method's `Code` attribute
    pub code_attr: u16,
    /// Index of the method's `Exceptions` attribute, if any
    pub exceptions_attr: Option<u16>,
    /// Byte offset of the current instruction
    pub offset: u32,
}

/// Activation record of one bytecode method
///
/// Locals start at `locals_base` in the thread's stack storage; the operand
/// stack starts right after them at `operand_base`.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Where execution is
    pub pc: ProgramCounter,
    /// Descriptor of `pc.class`, held for the frame's lifetime
    pub descriptor: Arc<ClassDescriptor>,
    /// First local slot
    pub locals_base: usize,
    /// First operand-stack slot
    pub operand_base: usize,
    /// Operand stack capacity in words
    pub max_stack: usize,
    /// Monitor entered on behalf of a synchronized method; null otherwise
    pub monitor: ObjectRef,
    /// Length of the invoke instruction awaiting a callee's return
    pub call_length: u32,
}

impl CallFrame {
    /// Create a frame positioned at offset 0
    pub fn new(
        pc: ProgramCounter,
        descriptor: Arc<ClassDescriptor>,
        locals_base: usize,
        max_locals: usize,
        max_stack: usize,
    ) -> Self {
        Self {
            pc,
            descriptor,
            locals_base,
            operand_base: locals_base + max_locals,
            max_stack,
            monitor: ObjectRef::NULL,
            call_length: 0,
        }
    }

    /// Number of local slots
    pub fn max_locals(&self) -> usize {
        self.operand_base - self.locals_base
    }

    /// The executing `Code` attribute
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.descriptor
            .method(self.pc.method)?
            .code_at(self.pc.code_attr)
    }

    /// Whether this frame holds a method monitor
    pub fn holds_monitor(&self) -> bool {
        !self.monitor.is_null()
    }
}
