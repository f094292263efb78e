//! Bootstrap class set.
//!
//! The interpreter materializes its own exceptions and string/class
//! constants, so these classes must exist before any user code runs.

use bytecode_system::{
    AccessFlags, ClassBuilder, ClassDescriptor, CodeBuilder, Opcode, OBJECT_CLASS,
};
use core_types::ExceptionKind;

/// `java/lang/Class`
pub const CLASS_CLASS: &str = "java/lang/Class";
/// `java/lang/String`
pub const STRING_CLASS: &str = "java/lang/String";
/// `java/lang/Throwable`
pub const THROWABLE_CLASS: &str = "java/lang/Throwable";

const EXCEPTION: &str = "java/lang/Exception";
const RUNTIME_EXCEPTION: &str = "java/lang/RuntimeException";
const ERROR: &str = "java/lang/Error";
const VIRTUAL_MACHINE_ERROR: &str = "java/lang/VirtualMachineError";
const LINKAGE_ERROR: &str = "java/lang/LinkageError";

/// Superclass of the class an exception kind materializes as
pub fn exception_superclass(kind: ExceptionKind) -> &'static str {
    match kind {
        ExceptionKind::OutOfMemory | ExceptionKind::StackOverflow => VIRTUAL_MACHINE_ERROR,
        ExceptionKind::IncompatibleClassChange | ExceptionKind::UnsatisfiedLink => LINKAGE_ERROR,
        ExceptionKind::Instantiation
        | ExceptionKind::AbstractMethod
        | ExceptionKind::IllegalAccess => ExceptionKind::IncompatibleClassChange.class_name(),
        _ => RUNTIME_EXCEPTION,
    }
}

/// Class whose `<init>()V` just calls its superclass constructor
fn chained(name: &str, super_name: &str) -> ClassBuilder {
    let mut class = ClassBuilder::new(name).extends(super_name);
    let init = class.method_ref(super_name, "<init>", "()V");
    let mut code = CodeBuilder::new(1, 1);
    code.op(Opcode::Aload0)
        .op(Opcode::Invokespecial)
        .u16(init)
        .op(Opcode::Return);
    class.method(AccessFlags::PUBLIC, "<init>", "()V", code.build());
    class
}

fn root() -> ClassDescriptor {
    let mut object = ClassBuilder::new(OBJECT_CLASS).without_super();
    let mut code = CodeBuilder::new(0, 1);
    code.op(Opcode::Return);
    object.method(AccessFlags::PUBLIC, "<init>", "()V", code.build());
    object.native_method(AccessFlags::PUBLIC, "hashCode", "()I");
    object.native_method(
        AccessFlags::PRIVATE | AccessFlags::STATIC,
        "registerNatives",
        "()V",
    );
    object.build()
}

/// Descriptors of every bootstrap class, superclasses before subclasses
///
/// # Examples
///
/// ```
/// use core_types::ExceptionKind;
/// use interpreter::core_classes::core_classes;
///
/// let classes = core_classes();
/// assert_eq!(classes[0].name, "java/lang/Object");
/// for kind in ExceptionKind::ALL {
///     assert!(classes.iter().any(|c| c.name == kind.class_name()));
/// }
/// ```
pub fn core_classes() -> Vec<ClassDescriptor> {
    let mut out = vec![root()];
    out.push(ClassBuilder::interface("java/lang/Cloneable").build());
    out.push(ClassBuilder::interface("java/io/Serializable").build());
    out.push(
        chained(CLASS_CLASS, OBJECT_CLASS)
            .access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SUPER)
            .build(),
    );

    let mut string = chained(STRING_CLASS, OBJECT_CLASS)
        .access(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SUPER)
        .implements("java/io/Serializable");
    string.native_method(AccessFlags::PUBLIC, "length", "()I");
    out.push(string.build());

    out.push(
        chained(THROWABLE_CLASS, OBJECT_CLASS)
            .implements("java/io/Serializable")
            .build(),
    );
    out.push(chained(EXCEPTION, THROWABLE_CLASS).build());
    out.push(chained(RUNTIME_EXCEPTION, EXCEPTION).build());
    out.push(chained(ERROR, THROWABLE_CLASS).build());
    out.push(chained(VIRTUAL_MACHINE_ERROR, ERROR).build());
    out.push(chained(LINKAGE_ERROR, ERROR).build());

    // IncompatibleClassChangeError is itself a superclass, so it goes first
    let mut kinds = ExceptionKind::ALL.to_vec();
    kinds.sort_by_key(|&k| k != ExceptionKind::IncompatibleClassChange);
    for kind in kinds {
        out.push(chained(kind.class_name(), exception_superclass(kind)).build());
    }
    out
}
