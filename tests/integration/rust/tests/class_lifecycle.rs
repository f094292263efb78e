//! Defining, linking, unloading and redefining classes

use bytecode_system::{ClassBuilder, CodeBuilder, Opcode};
use core_types::{ObjectRef, VmConfig, VmError};
use integration_tests::programs::{
    constructor, counter, int_result, vm_with_loader, worker, PUBLIC_STATIC,
};
use interpreter::VM;
use linker::{implements_interface, is_a, superclasses};
use memory_manager::RefNode;

fn version(value: i32) -> bytecode_system::ClassDescriptor {
    let mut class = ClassBuilder::new("Plugin");
    let mut code = CodeBuilder::new(1, 0);
    code.iconst(value).op(Opcode::Ireturn);
    class.method(PUBLIC_STATIC, "version", "()I", code.build());
    class.build()
}

fn call_version(vm: &mut VM) -> Option<i32> {
    let plugin = vm.classes().find("Plugin").unwrap();
    let thread = vm.spawn(plugin, "version", "()I", &[]).unwrap();
    assert!(vm.run_all().is_empty());
    int_result(vm, thread)
}

#[test]
fn test_unload_then_redefine() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    vm.define_class(version(1)).unwrap();
    assert_eq!(call_version(&mut vm), Some(1));

    let plugin = vm.classes().find("Plugin").unwrap();
    vm.unload_class(plugin).unwrap();
    assert!(vm.classes().find("Plugin").is_none());
    assert!(matches!(vm.unload_class(plugin), Err(VmError::InvalidClass(_))));

    vm.define_class(version(2)).unwrap();
    assert_eq!(call_version(&mut vm), Some(2));
}

#[test]
fn test_unload_order_follows_references() {
    let mut vm = vm_with_loader(VmConfig::default(), vec![counter(), worker()]);
    let worker = vm.load_class("Worker").unwrap();
    let thread = vm.spawn(worker, "work", "(I)V", &[2]).unwrap();
    assert!(vm.run_all().is_empty());
    assert!(vm.thread(thread).unwrap().is_finished());

    let counter = vm.classes().find("Counter").unwrap();
    assert!(vm.refs().incoming(RefNode::Class(counter)) > 0);
    assert_eq!(
        vm.unload_class(counter),
        Err(VmError::ClassInUse("Counter".to_string()))
    );
    vm.unload_class(worker).unwrap();
    vm.unload_class(counter).unwrap();

    // the loader still serves both, so the program runs again from scratch
    let worker = vm.load_class("Worker").unwrap();
    vm.spawn(worker, "work", "(I)V", &[5]).unwrap();
    assert!(vm.run_all().is_empty());
    let counter = vm.classes().find("Counter").unwrap();
    let reader = vm.spawn(counter, "total", "()I", &[]).unwrap();
    assert!(vm.run_all().is_empty());
    assert_eq!(int_result(&vm, reader), Some(5));
}

#[test]
fn test_hierarchy_queries_over_loaded_classes() {
    let mut shape = ClassBuilder::interface("Shape");
    shape.abstract_method(bytecode_system::AccessFlags::PUBLIC, "area", "()I");
    let extra = vec![
        shape.build(),
        ClassBuilder::new("Polygon").implements("Shape").build(),
        ClassBuilder::new("Square").extends("Polygon").build(),
    ];
    let mut vm = vm_with_loader(VmConfig::default(), extra);
    let square = vm.load_class("Square").unwrap();
    let polygon = vm.classes().find("Polygon").unwrap();
    let shape = vm.load_class("Shape").unwrap();
    let object = vm.classes().find("java/lang/Object").unwrap();

    assert!(is_a(vm.classes(), square, polygon));
    assert!(is_a(vm.classes(), square, object));
    assert!(!is_a(vm.classes(), polygon, square));
    assert!(implements_interface(vm.classes(), square, shape));

    let chain = superclasses(vm.classes(), square);
    assert_eq!(chain.loaded, vec![square, polygon, object]);
    assert!(chain.missing.is_none());
}

#[test]
fn test_resolve_after_late_definition() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let mut user = ClassBuilder::new("User");
    let version_ref = user.method_ref("Plugin", "version", "()I");
    let mut code = CodeBuilder::new(1, 0);
    code.op(Opcode::Invokestatic).u16(version_ref).op(Opcode::Ireturn);
    user.method(PUBLIC_STATIC, "go", "()I", code.build());
    let user = vm.define_class(user.build()).unwrap();

    assert!(!vm.resolve(user).unwrap());
    let plugin = vm.define_class(version(7)).unwrap();
    assert!(vm.resolve(user).unwrap());
    assert!(vm.refs().incoming(RefNode::Class(plugin)) > 0);

    let thread = vm.spawn(user, "go", "()I", &[]).unwrap();
    assert!(vm.run_all().is_empty());
    assert_eq!(int_result(&vm, thread), Some(7));
}

#[test]
fn test_unload_refused_while_subtypes_loaded() {
    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let mut marker = ClassBuilder::interface("Marker");
    marker.abstract_method(bytecode_system::AccessFlags::PUBLIC, "mark", "()V");
    let marker = vm.define_class(marker.build()).unwrap();
    let base = vm
        .define_class(ClassBuilder::new("Base").implements("Marker").build())
        .unwrap();
    let leaf = vm
        .define_class(ClassBuilder::new("Leaf").extends("Base").build())
        .unwrap();
    let object = vm.classes().find("java/lang/Object").unwrap();

    assert_eq!(
        vm.unload_class(base),
        Err(VmError::ClassInUse("Base".to_string()))
    );
    assert_eq!(
        vm.unload_class(marker),
        Err(VmError::ClassInUse("Marker".to_string()))
    );
    assert!(is_a(vm.classes(), leaf, object));

    vm.unload_class(leaf).unwrap();
    vm.unload_class(base).unwrap();
    vm.unload_class(marker).unwrap();
    assert!(vm.classes().find("Base").is_none());
}

#[test]
fn test_unload_refused_while_instances_live() {
    let mut thing = ClassBuilder::new("Thing");
    constructor(&mut thing, "java/lang/Object");
    let mut maker = ClassBuilder::new("Maker");
    let thing_class = maker.class_ref("Thing");
    let init = maker.method_ref("Thing", "<init>", "()V");
    let mut code = CodeBuilder::new(2, 0);
    code.op(Opcode::New)
        .u16(thing_class)
        .op(Opcode::Dup)
        .op(Opcode::Invokespecial)
        .u16(init)
        .op(Opcode::Areturn);
    maker.method(PUBLIC_STATIC, "make", "()Ljava/lang/Object;", code.build());

    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    let thing = vm.define_class(thing.build()).unwrap();
    let maker = vm.define_class(maker.build()).unwrap();
    let thread = vm.spawn(maker, "make", "()Ljava/lang/Object;", &[]).unwrap();
    assert!(vm.run_all().is_empty());
    let made = ObjectRef::from_word(vm.thread_result(thread).unwrap()[0]);

    vm.unload_class(maker).unwrap();
    assert_eq!(
        vm.unload_class(thing),
        Err(VmError::ClassInUse("Thing".to_string()))
    );

    vm.define_class(ClassBuilder::new("Unrelated").build()).unwrap();
    assert_eq!(vm.objects().class_of(made), Some(thing));
    assert_eq!(vm.classes().name(thing), Some("Thing"));
}
