//! Error taxonomy for the runtime.
//!
//! Two families are kept apart:
//!
//! - [`ExceptionKind`] is a language-level condition raised by the interpreter
//!   (divide by zero, null dereference, ...). It becomes an exception object and
//!   is dispatched through method exception tables.
//! - [`VmError`] is a fatal condition: resolution failures, verification
//!   failures, unhandled exceptions and double faults. These travel back to the
//!   top-level recovery point as ordinary `Err` values.

use thiserror::Error;

/// A user-catchable runtime condition.
///
/// Each kind materializes as an instance of the class named by
/// [`ExceptionKind::class_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// Integer divide or remainder by zero
    Arithmetic,
    /// Use of a null reference
    NullPointer,
    /// Failed checked cast
    ClassCast,
    /// Array created with a negative length
    NegativeArraySize,
    /// Array index outside `[0, length)`
    ArrayIndexOutOfBounds,
    /// Reference stored into an incompatible array
    ArrayStore,
    /// Allocation service exhausted
    OutOfMemory,
    /// Monitor released or thrown across by a non-owner
    IllegalMonitorState,
    /// Frame or stack-word limit exceeded
    StackOverflow,
    /// `new` on an abstract class, interface or array class
    Instantiation,
    /// Invocation reached a method with no code
    AbstractMethod,
    /// Member kind does not match the referencing instruction
    IncompatibleClassChange,
    /// Protected/package member used from outside its reach
    IllegalAccess,
    /// Native method without a registered implementation
    UnsatisfiedLink,
}

impl ExceptionKind {
    /// Every kind, in declaration order
    pub const ALL: [ExceptionKind; 14] = [
        ExceptionKind::Arithmetic,
        ExceptionKind::NullPointer,
        ExceptionKind::ClassCast,
        ExceptionKind::NegativeArraySize,
        ExceptionKind::ArrayIndexOutOfBounds,
        ExceptionKind::ArrayStore,
        ExceptionKind::OutOfMemory,
        ExceptionKind::IllegalMonitorState,
        ExceptionKind::StackOverflow,
        ExceptionKind::Instantiation,
        ExceptionKind::AbstractMethod,
        ExceptionKind::IncompatibleClassChange,
        ExceptionKind::IllegalAccess,
        ExceptionKind::UnsatisfiedLink,
    ];

    /// Internal class name of the exception object raised for this kind
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::ExceptionKind;
    ///
    /// assert_eq!(
    ///     ExceptionKind::Arithmetic.class_name(),
    ///     "java/lang/ArithmeticException"
    /// );
    /// ```
    pub fn class_name(self) -> &'static str {
        match self {
            ExceptionKind::Arithmetic => "java/lang/ArithmeticException",
            ExceptionKind::NullPointer => "java/lang/NullPointerException",
            ExceptionKind::ClassCast => "java/lang/ClassCastException",
            ExceptionKind::NegativeArraySize => "java/lang/NegativeArraySizeException",
            ExceptionKind::ArrayIndexOutOfBounds => "java/lang/ArrayIndexOutOfBoundsException",
            ExceptionKind::ArrayStore => "java/lang/ArrayStoreException",
            ExceptionKind::OutOfMemory => "java/lang/OutOfMemoryError",
            ExceptionKind::IllegalMonitorState => "java/lang/IllegalMonitorStateException",
            ExceptionKind::StackOverflow => "java/lang/StackOverflowError",
            ExceptionKind::Instantiation => "java/lang/InstantiationError",
            ExceptionKind::AbstractMethod => "java/lang/AbstractMethodError",
            ExceptionKind::IncompatibleClassChange => "java/lang/IncompatibleClassChangeError",
            ExceptionKind::IllegalAccess => "java/lang/IllegalAccessError",
            ExceptionKind::UnsatisfiedLink => "java/lang/UnsatisfiedLinkError",
        }
    }
}

/// Failure to resolve a symbolic constant-pool reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No field with this name and descriptor in the class or its ancestors
    #[error("no such field: {class}.{name}:{descriptor}")]
    NoSuchField {
        /// Class the search started from
        class: String,
        /// Field name
        name: String,
        /// Field descriptor
        descriptor: String,
    },
    /// No method with this name and descriptor in the class or its ancestors
    #[error("no such method: {class}.{name}{descriptor}")]
    NoSuchMethod {
        /// Class the search started from
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },
    /// Reference kind does not match the referenced class kind
    #[error("incompatible class change: {0}")]
    IncompatibleClassChange(String),
    /// Concrete method without a code attribute
    #[error("method {class}.{name}{descriptor} has no code")]
    MissingCode {
        /// Declaring class
        class: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },
}

/// Malformed bytecode or constant-pool use detected while executing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Opcode byte with no defined instruction
    #[error("illegal opcode 0x{opcode:02x} at offset {offset}")]
    IllegalOpcode {
        /// The offending byte
        opcode: u8,
        /// Byte offset in the method's code
        offset: u32,
    },
    /// Constant-pool entry of the wrong kind at a use site
    #[error("constant pool entry {index} is not a {expected}")]
    BadConstantTag {
        /// Constant-pool index
        index: u16,
        /// Kind the use site required
        expected: &'static str,
    },
    /// Operand combination the instruction does not allow
    #[error("illegal operand for {instruction}: {detail}")]
    IllegalOperand {
        /// Instruction mnemonic
        instruction: &'static str,
        /// What was wrong
        detail: String,
    },
    /// Pop below the current frame's operand base
    #[error("operand stack underflow")]
    StackUnderflow,
    /// Local-variable index outside the frame
    #[error("local variable {0} out of range")]
    BadLocal(usize),
    /// Operand read ran past the end of the code array
    #[error("code overrun at offset {0}")]
    CodeOverrun(u32),
    /// `athrow` of an object that is not a throwable
    #[error("{0} is not throwable")]
    NotThrowable(String),
    /// Array instruction applied to a non-array or wrong element kind
    #[error("array instruction {0} applied to an incompatible object")]
    NotAnArray(&'static str),
}

/// Fatal condition reported to the top-level recovery point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Linker failure
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// Bytecode verification failure
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// Exception propagated past the thread's outermost frame
    #[error("unhandled exception {class_name}")]
    UnhandledException {
        /// Class of the thrown object
        class_name: String,
    },
    /// A class needed for execution could not be loaded
    #[error("class not found: {0}")]
    ClassNotFound(String),
    /// Failure while materializing the representation of an earlier error
    #[error("double fault while raising {raising}: {cause}")]
    DoubleFault {
        /// Class that was being raised
        raising: String,
        /// The second-level failure
        cause: String,
    },
    /// Class index does not address a live class-table entry
    #[error("invalid class index {0}")]
    InvalidClass(usize),
    /// Object reference does not address a live object
    #[error("invalid object reference")]
    InvalidReference,
    /// Thread id does not address a live thread
    #[error("invalid thread {0}")]
    InvalidThread(u32),
    /// Class still referenced by other classes and cannot be unloaded
    #[error("class {0} is still referenced")]
    ClassInUse(String),
    /// A class with this name is already defined
    #[error("class {0} is already defined")]
    DuplicateClass(String),
    /// Monitor contention inside a nested (run-to-completion) call
    #[error("thread blocked inside a nested call")]
    BlockedInNestedCall,
    /// The VM was halted by an earlier double fault
    #[error("virtual machine halted")]
    Halted,
}

impl VmError {
    /// Whether this condition must terminate the whole process rather than
    /// just the owning thread
    pub fn is_process_fatal(&self) -> bool {
        matches!(self, VmError::DoubleFault { .. } | VmError::Halted)
    }
}

/// Result alias for runtime operations
pub type VmResult<T> = Result<T, VmError>;
