//! Contract tests for interpreter API
//!
//! These tests pin down the public surface embedders rely on.

use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode, OBJECT_CLASS};
use core_types::{ThreadId, VerificationError, VmConfig, VmError};
use interpreter::core_classes::core_classes;
use interpreter::{MapLoader, NativeRegistry, SliceOutcome, ThreadState, VM};

fn returns_int(value: i32) -> bytecode_system::CodeAttribute {
    let mut code = CodeBuilder::new(1, 0);
    code.iconst(value).op(Opcode::Ireturn);
    code.build()
}

/// `VM::new` starts with an empty class table
#[test]
fn test_vm_new_contract() {
    let vm = VM::new(VmConfig::default());
    assert_eq!(vm.classes().len(), 0);
    assert!(vm.objects().is_empty());
    assert!(!vm.is_halted());
}

/// `VM::with_core_classes` defines every bootstrap class and preallocates
/// the out-of-memory error
#[test]
fn test_with_core_classes_contract() {
    let vm = VM::with_core_classes(VmConfig::default()).unwrap();
    for class in core_classes() {
        assert!(vm.classes().find(&class.name).is_some(), "{} missing", class.name);
    }
    assert!(!vm.objects().is_empty());
}

/// `bootstrap` keeps classes that are already defined
#[test]
fn test_bootstrap_is_idempotent_contract() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let classes = vm.classes().len();
    let objects = vm.objects().len();
    vm.bootstrap().unwrap();
    assert_eq!(vm.classes().len(), classes);
    assert_eq!(vm.objects().len(), objects);
}

/// Defining the same name twice is refused
#[test]
fn test_duplicate_class_contract() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    vm.define_class(ClassBuilder::new("Once").build()).unwrap();
    assert_eq!(
        vm.define_class(ClassBuilder::new("Once").build()),
        Err(VmError::DuplicateClass("Once".to_string()))
    );
}

/// `load_class` asks the loader on a miss and loads supertypes with it
#[test]
fn test_load_class_contract() {
    let loader: MapLoader = core_classes()
        .into_iter()
        .chain([
            ClassBuilder::new("Base").build(),
            ClassBuilder::new("Derived").extends("Base").build(),
        ])
        .collect();
    let mut vm = VM::with_loader(VmConfig::default(), loader);

    let derived = vm.load_class("Derived").unwrap();
    assert_eq!(vm.classes().name(derived), Some("Derived"));
    assert!(vm.classes().find("Base").is_some());
    assert!(vm.classes().find(OBJECT_CLASS).is_some());
    assert_eq!(
        vm.load_class("Nowhere"),
        Err(VmError::ClassNotFound("Nowhere".to_string()))
    );
}

/// `resolve` reports `false` while a referenced class is missing
#[test]
fn test_resolve_defers_contract() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let mut user = ClassBuilder::new("User");
    user.method_ref("Later", "run", "()V");
    let user = vm.define_class(user.build()).unwrap();
    assert!(!vm.resolve(user).unwrap());

    let mut later = ClassBuilder::new("Later");
    let mut code = CodeBuilder::new(0, 0);
    code.op(Opcode::Return);
    later.method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", "()V", code.build());
    vm.define_class(later.build()).unwrap();
    assert!(vm.resolve(user).unwrap());
}

/// `spawn` needs a static method with a bytecode body
#[test]
fn test_spawn_entry_contract() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let mut class = ClassBuilder::new("Entry");
    class.method(AccessFlags::PUBLIC, "instance", "()I", returns_int(1));
    class.native_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "native", "()I");
    class.method(AccessFlags::PUBLIC | AccessFlags::STATIC, "main", "()I", returns_int(2));
    let class = vm.define_class(class.build()).unwrap();

    assert!(matches!(
        vm.spawn(class, "instance", "()I", &[]),
        Err(VmError::Verification(VerificationError::IllegalOperand { .. }))
    ));
    assert!(matches!(
        vm.spawn(class, "native", "()I", &[]),
        Err(VmError::Verification(VerificationError::IllegalOperand { .. }))
    ));
    assert!(matches!(
        vm.spawn(class, "missing", "()I", &[]),
        Err(VmError::Resolution(_))
    ));

    let first = vm.spawn(class, "main", "()I", &[]).unwrap();
    let second = vm.spawn(class, "main", "()I", &[]).unwrap();
    assert_eq!(first, ThreadId(0));
    assert_eq!(second, ThreadId(1));
    assert_eq!(vm.threads().count(), 2);
}

/// A finished thread keeps reporting `Finished` and its result
#[test]
fn test_finished_thread_contract() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let mut class = ClassBuilder::new("Done");
    class.method(AccessFlags::PUBLIC | AccessFlags::STATIC, "main", "()I", returns_int(3));
    let class = vm.define_class(class.build()).unwrap();

    let thread = vm.spawn(class, "main", "()I", &[]).unwrap();
    assert_eq!(vm.thread(thread).unwrap().state, ThreadState::Running);
    assert_eq!(vm.run_slice(thread), SliceOutcome::Finished);
    assert_eq!(vm.run_slice(thread), SliceOutcome::Finished);
    assert_eq!(vm.thread_result(thread), Some(&[3][..]));
}

/// `new_string` interns by content
#[test]
fn test_new_string_contract() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let a = vm.new_string("same").unwrap();
    let b = vm.new_string("same").unwrap();
    let c = vm.new_string("other").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(vm.objects().string_text(c), Some("other"));
}

/// Without `java/lang/String` no string can be created
#[test]
fn test_new_string_without_core_classes_contract() {
    let mut vm = VM::new(VmConfig::default());
    assert!(vm.new_string("x").is_err());
}

/// The core registry binds the natives the core classes declare
#[test]
fn test_core_natives_contract() {
    use linker::NativeLocator;

    let registry = NativeRegistry::with_core_natives();
    assert!(registry.locate(OBJECT_CLASS, "hashCode", "()I", false).is_some());
    assert!(registry.locate(OBJECT_CLASS, "registerNatives", "()V", false).is_none());
    assert!(registry.locate(OBJECT_CLASS, "registerNatives", "()V", true).is_some());
    assert!(registry.locate("java/lang/String", "length", "()I", false).is_some());
}

/// Configuration is kept as given
#[test]
fn test_config_contract() {
    let config = VmConfig {
        time_slice: Some(7),
        max_frames: 12,
        ..VmConfig::default()
    };
    let vm = VM::new(config.clone());
    assert_eq!(vm.config(), &config);
}
