//! Integration tests for interpreter
//!
//! Small programs exercising the loader, linker, object table and
//! dispatcher together

use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode};
use core_types::{join_long, ExceptionKind, VmConfig};
use interpreter::core_classes::core_classes;
use interpreter::{MapLoader, SliceOutcome, VM};

const PUBLIC_STATIC: AccessFlags = AccessFlags(0x0009);

fn run(vm: &mut VM, class: &str, name: &str, descriptor: &str) -> Vec<u32> {
    let class = vm.load_class(class).unwrap();
    let thread = vm.spawn(class, name, descriptor, &[]).unwrap();
    let failures = vm.run_all();
    assert!(failures.is_empty(), "{:?}", failures);
    vm.thread_result(thread).unwrap().to_vec()
}

fn constructor(class: &mut ClassBuilder, super_name: &str) {
    let init = class.method_ref(super_name, "<init>", "()V");
    let mut code = CodeBuilder::new(1, 1);
    code.op(Opcode::Aload0).op(Opcode::Invokespecial).u16(init).op(Opcode::Return);
    class.method(AccessFlags::PUBLIC, "<init>", "()V", code.build());
}

#[test]
fn test_recursive_long_factorial() {
    let mut class = ClassBuilder::new("Factorial");
    let fact = class.method_ref("Factorial", "fact", "(I)J");
    // fact(n) = n <= 1 ? 1 : n * fact(n - 1)
    let mut code = CodeBuilder::new(4, 1);
    code.op(Opcode::Iload0).op(Opcode::Iconst1);
    let recurse = code.forward(Opcode::IfIcmpgt);
    code.op(Opcode::Lconst1).op(Opcode::Lreturn);
    code.bind(recurse);
    code.op(Opcode::Iload0).op(Opcode::I2l);
    code.op(Opcode::Iload0).op(Opcode::Iconst1).op(Opcode::Isub);
    code.op(Opcode::Invokestatic).u16(fact);
    code.op(Opcode::Lmul).op(Opcode::Lreturn);
    class.method(PUBLIC_STATIC, "fact", "(I)J", code.build());

    let mut code = CodeBuilder::new(1, 0);
    code.iconst(20).op(Opcode::Invokestatic).u16(fact).op(Opcode::Lreturn);
    class.method(PUBLIC_STATIC, "main", "()J", code.build());

    let loader: MapLoader = core_classes().into_iter().chain([class.build()]).collect();
    let mut vm = VM::with_loader(VmConfig::default(), loader);
    vm.bootstrap().unwrap();

    let words = run(&mut vm, "Factorial", "main", "()J");
    assert_eq!(join_long(words[0], words[1]), 2_432_902_008_176_640_000);
}

/// `Node { int value; Node next; }` list of 1..=10 built and summed
#[test]
fn test_linked_list_of_objects() {
    let mut node = ClassBuilder::new("Node");
    constructor(&mut node, "java/lang/Object");
    node.field(AccessFlags::PUBLIC, "value", "I");
    node.field(AccessFlags::PUBLIC, "next", "LNode;");

    let mut list = ClassBuilder::new("List");
    let node_class = list.class_ref("Node");
    let init = list.method_ref("Node", "<init>", "()V");
    let value = list.field_ref("Node", "value", "I");
    let next = list.field_ref("Node", "next", "LNode;");
    // locals: 0 head, 1 i, 2 node, 3 sum
    let mut code = CodeBuilder::new(3, 4);
    code.op(Opcode::AconstNull).op(Opcode::Astore0);
    code.op(Opcode::Iconst1).op(Opcode::Istore1);
    let build = code.offset();
    code.op(Opcode::New).u16(node_class).op(Opcode::Dup).op(Opcode::Invokespecial).u16(init);
    code.op(Opcode::Astore2);
    code.op(Opcode::Aload2).op(Opcode::Iload1).op(Opcode::Putfield).u16(value);
    code.op(Opcode::Aload2).op(Opcode::Aload0).op(Opcode::Putfield).u16(next);
    code.op(Opcode::Aload2).op(Opcode::Astore0);
    code.op(Opcode::Iinc).u8(1).u8(1);
    code.op(Opcode::Iload1).iconst(10).branch(Opcode::IfIcmple, build);

    code.op(Opcode::Iconst0).op(Opcode::Istore3);
    let walk = code.offset();
    code.op(Opcode::Aload0);
    let done = code.forward(Opcode::Ifnull);
    code.op(Opcode::Iload3).op(Opcode::Aload0).op(Opcode::Getfield).u16(value);
    code.op(Opcode::Iadd).op(Opcode::Istore3);
    code.op(Opcode::Aload0).op(Opcode::Getfield).u16(next).op(Opcode::Astore0);
    code.branch(Opcode::Goto, walk);
    code.bind(done);
    code.op(Opcode::Iload3).op(Opcode::Ireturn);
    list.method(PUBLIC_STATIC, "main", "()I", code.build());

    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    vm.define_class(node.build()).unwrap();
    vm.define_class(list.build()).unwrap();
    let objects = vm.objects().len();

    assert_eq!(run(&mut vm, "List", "main", "()I"), vec![55]);
    // each node is a Node link plus an Object link
    assert_eq!(vm.objects().len(), objects + 20);
}

/// One interface call site sees more receiver classes than its
/// polymorphic cache holds
#[test]
fn test_megamorphic_interface_site() {
    let mut vm = VM::with_core_classes(VmConfig {
        time_slice: Some(16),
        ..VmConfig::default()
    })
    .unwrap();

    let mut iface = ClassBuilder::interface("Valued");
    iface.abstract_method(AccessFlags::PUBLIC, "value", "()I");
    vm.define_class(iface.build()).unwrap();

    let names = ["V1", "V2", "V3", "V4", "V5", "V6"];
    for (i, name) in names.iter().enumerate() {
        let mut class = ClassBuilder::new(name).implements("Valued");
        constructor(&mut class, "java/lang/Object");
        let mut code = CodeBuilder::new(1, 1);
        code.iconst(1 << i).op(Opcode::Ireturn);
        class.method(AccessFlags::PUBLIC, "value", "()I", code.build());
        vm.define_class(class.build()).unwrap();
    }

    let mut main = ClassBuilder::new("Sites");
    let value = main.interface_method_ref("Valued", "value", "()I");
    let mut code = CodeBuilder::new(1, 1);
    code.op(Opcode::Aload0).op(Opcode::Invokeinterface).u16(value).u8(1).u8(0);
    code.op(Opcode::Ireturn);
    main.method(PUBLIC_STATIC, "of", "(LValued;)I", code.build());
    let of = main.method_ref("Sites", "of", "(LValued;)I");

    let refs: Vec<(u16, u16)> = names
        .iter()
        .map(|name| (main.class_ref(name), main.method_ref(name, "<init>", "()V")))
        .collect();
    let mut code = CodeBuilder::new(3, 0);
    code.iconst(0);
    // twice round, so the second pass runs against a full cache
    for &(class, init) in refs.iter().chain(refs.iter()) {
        code.op(Opcode::New).u16(class).op(Opcode::Dup).op(Opcode::Invokespecial).u16(init);
        code.op(Opcode::Invokestatic).u16(of).op(Opcode::Iadd);
    }
    code.op(Opcode::Ireturn);
    main.method(PUBLIC_STATIC, "main", "()I", code.build());
    vm.define_class(main.build()).unwrap();

    assert_eq!(run(&mut vm, "Sites", "main", "()I"), vec![2 * 63]);
}

/// Handlers run inside a loop; every third division is by zero
#[test]
fn test_exceptions_inside_loop() {
    let mut class = ClassBuilder::new("Retry");
    let arithmetic = class.class_ref(ExceptionKind::Arithmetic.class_name());
    // locals: 0 i, 1 caught
    let mut code = CodeBuilder::new(3, 2);
    code.op(Opcode::Iconst0).op(Opcode::Istore0);
    code.op(Opcode::Iconst0).op(Opcode::Istore1);
    let top = code.offset();
    let start = code.offset();
    code.iconst(12).op(Opcode::Iload0).iconst(3).op(Opcode::Irem).op(Opcode::Idiv);
    code.op(Opcode::Pop);
    let end = code.offset();
    let after = code.forward(Opcode::Goto);
    let handler = code.offset();
    code.op(Opcode::Pop).op(Opcode::Iinc).u8(1).u8(1);
    code.bind(after);
    code.op(Opcode::Iinc).u8(0).u8(1);
    code.op(Opcode::Iload0).iconst(9).branch(Opcode::IfIcmplt, top);
    code.op(Opcode::Iload1).op(Opcode::Ireturn);
    code.handler(start, end, handler, arithmetic);
    class.method(PUBLIC_STATIC, "main", "()I", code.build());

    let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
    vm.define_class(class.build()).unwrap();
    assert_eq!(run(&mut vm, "Retry", "main", "()I"), vec![3]);
}

/// A thread that fails does not disturb the others
#[test]
fn test_failing_thread_is_isolated() {
    let mut vm = VM::with_core_classes(VmConfig {
        time_slice: Some(2),
        ..VmConfig::default()
    })
    .unwrap();
    let mut class = ClassBuilder::new("Mixed");
    let mut code = CodeBuilder::new(2, 0);
    code.op(Opcode::Iconst1).op(Opcode::Iconst0).op(Opcode::Idiv).op(Opcode::Ireturn);
    class.method(PUBLIC_STATIC, "bad", "()I", code.build());
    let mut code = CodeBuilder::new(2, 0);
    code.iconst(20).iconst(22).op(Opcode::Iadd).op(Opcode::Ireturn);
    class.method(PUBLIC_STATIC, "good", "()I", code.build());
    let class = vm.define_class(class.build()).unwrap();

    let bad = vm.spawn(class, "bad", "()I", &[]).unwrap();
    let good = vm.spawn(class, "good", "()I", &[]).unwrap();
    let failures = vm.run_all();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, bad);
    assert_eq!(vm.thread_result(good), Some(&[42][..]));
    assert!(!vm.is_halted());
    assert_eq!(vm.run_slice(bad), SliceOutcome::Finished);
}
