//! Fields, initializers, constants, arrays and type tests

use bytecode_system::{AccessFlags, ClassBuilder, Opcode};
use core_types::{ExceptionKind, ObjectRef, VmError, Word};
use interpreter::{SliceOutcome, VM};
use linker::superclasses;
use memory_manager::ClassId;

use crate::fixtures::{add_constructor, body, define_static, run, run_int, uncaught, vm, PUBLIC_STATIC};

const T_BYTE: u8 = 8;
const T_INT: u8 = 10;
const T_LONG: u8 = 11;

#[test]
fn test_static_field_persists_across_threads() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("Counter");
    class.field(PUBLIC_STATIC, "count", "I");
    let count = class.field_ref("Counter", "count", "I");
    let code = body(2, 0, |c| {
        c.op(Opcode::Getstatic).u16(count).op(Opcode::Iconst1).op(Opcode::Iadd);
        c.op(Opcode::Dup).op(Opcode::Putstatic).u16(count).op(Opcode::Ireturn);
    });
    class.method(PUBLIC_STATIC, "bump", "()I", code);
    let class = vm.define_class(class.build()).unwrap();

    assert_eq!(run_int(&mut vm, class, "bump", "()I", &[]), 1);
    assert_eq!(run_int(&mut vm, class, "bump", "()I", &[]), 2);
}

fn points(vm: &mut VM) {
    let mut point = ClassBuilder::new("Point");
    add_constructor(&mut point, "java/lang/Object");
    point.field(AccessFlags::PUBLIC, "x", "I");
    point.field(AccessFlags::PUBLIC, "big", "J");
    vm.define_class(point.build()).unwrap();

    let mut point3 = ClassBuilder::new("Point3").extends("Point");
    add_constructor(&mut point3, "Point");
    point3.field(AccessFlags::PUBLIC, "z", "I");
    vm.define_class(point3.build()).unwrap();
}

#[test]
fn test_instance_fields_of_one_and_two_words() {
    let mut vm = vm();
    points(&mut vm);
    let mut main = ClassBuilder::new("UsePoint");
    let point = main.class_ref("Point");
    let init = main.method_ref("Point", "<init>", "()V");
    let x = main.field_ref("Point", "x", "I");
    let big = main.field_ref("Point", "big", "J");
    let nine = main.long(9);
    let code = body(4, 1, |c| {
        c.op(Opcode::New).u16(point).op(Opcode::Dup).op(Opcode::Invokespecial).u16(init);
        c.op(Opcode::Astore0);
        c.op(Opcode::Aload0).iconst(7).op(Opcode::Putfield).u16(x);
        c.op(Opcode::Aload0).op(Opcode::Ldc2W).u16(nine).op(Opcode::Putfield).u16(big);
        c.op(Opcode::Aload0).op(Opcode::Getfield).u16(x);
        c.op(Opcode::Aload0).op(Opcode::Getfield).u16(big).op(Opcode::L2i);
        c.op(Opcode::Iadd).op(Opcode::Ireturn);
    });
    main.method(PUBLIC_STATIC, "go", "()I", code);
    let main = vm.define_class(main.build()).unwrap();
    assert_eq!(run_int(&mut vm, main, "go", "()I", &[]), 16);
}

#[test]
fn test_inherited_field_through_subclass_reference() {
    let mut vm = vm();
    points(&mut vm);
    let mut main = ClassBuilder::new("UsePoint3");
    let point3 = main.class_ref("Point3");
    let init = main.method_ref("Point3", "<init>", "()V");
    let x_via_sub = main.field_ref("Point3", "x", "I");
    let x = main.field_ref("Point", "x", "I");
    let z = main.field_ref("Point3", "z", "I");
    let code = body(3, 1, |c| {
        c.op(Opcode::New).u16(point3).op(Opcode::Dup).op(Opcode::Invokespecial).u16(init);
        c.op(Opcode::Astore0);
        c.op(Opcode::Aload0).iconst(5).op(Opcode::Putfield).u16(x_via_sub);
        c.op(Opcode::Aload0).iconst(3).op(Opcode::Putfield).u16(z);
        c.op(Opcode::Aload0).op(Opcode::Getfield).u16(x);
        c.op(Opcode::Aload0).op(Opcode::Getfield).u16(z).op(Opcode::Imul);
        c.op(Opcode::Ireturn);
    });
    main.method(PUBLIC_STATIC, "go", "()I", code);
    let main = vm.define_class(main.build()).unwrap();
    assert_eq!(run_int(&mut vm, main, "go", "()I", &[]), 15);
}

#[test]
fn test_static_access_to_instance_field() {
    let mut vm = vm();
    points(&mut vm);
    let mut main = ClassBuilder::new("WrongKind");
    let x = main.field_ref("Point", "x", "I");
    let code = body(1, 0, |c| {
        c.op(Opcode::Getstatic).u16(x).op(Opcode::Ireturn);
    });
    main.method(PUBLIC_STATIC, "go", "()I", code);
    let main = vm.define_class(main.build()).unwrap();
    let (outcome, _) = run(&mut vm, main, "go", "()I", &[]);
    assert_eq!(uncaught(outcome), ExceptionKind::IncompatibleClassChange.class_name());
}

#[test]
fn test_getfield_on_null() {
    let mut vm = vm();
    points(&mut vm);
    let mut main = ClassBuilder::new("NullField");
    let x = main.field_ref("Point", "x", "I");
    let code = body(1, 0, |c| {
        c.op(Opcode::AconstNull).op(Opcode::Getfield).u16(x).op(Opcode::Ireturn);
    });
    main.method(PUBLIC_STATIC, "go", "()I", code);
    let main = vm.define_class(main.build()).unwrap();
    let (outcome, _) = run(&mut vm, main, "go", "()I", &[]);
    assert_eq!(uncaught(outcome), ExceptionKind::NullPointer.class_name());
}

/// `log = log * 10 + digit` as a static initializer body
fn append_digit(class: &mut ClassBuilder, log: u16, digit: i32) {
    let code = body(2, 0, |c| {
        c.op(Opcode::Getstatic).u16(log).iconst(10).op(Opcode::Imul);
        c.iconst(digit).op(Opcode::Iadd).op(Opcode::Putstatic).u16(log);
        c.op(Opcode::Return);
    });
    class.method(AccessFlags::STATIC, "<clinit>", "()V", code);
}

#[test]
fn test_superclass_initializer_runs_first() {
    let mut vm = vm();
    let mut parent = ClassBuilder::new("Parent");
    parent.field(PUBLIC_STATIC, "log", "I");
    let log = parent.field_ref("Parent", "log", "I");
    append_digit(&mut parent, log, 1);
    vm.define_class(parent.build()).unwrap();

    let mut child = ClassBuilder::new("Child").extends("Parent");
    let log = child.field_ref("Parent", "log", "I");
    append_digit(&mut child, log, 2);
    let code = body(1, 0, |c| {
        c.op(Opcode::Getstatic).u16(log).op(Opcode::Ireturn);
    });
    child.method(PUBLIC_STATIC, "go", "()I", code);
    let child = vm.define_class(child.build()).unwrap();

    assert_eq!(run_int(&mut vm, child, "go", "()I", &[]), 12);
    // initializers ran once
    assert_eq!(run_int(&mut vm, child, "go", "()I", &[]), 12);
}

#[test]
fn test_failing_initializer_fails_spawn() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("Broken");
    let code = body(2, 0, |c| {
        c.op(Opcode::Iconst1).op(Opcode::Iconst0).op(Opcode::Idiv).op(Opcode::Pop);
        c.op(Opcode::Return);
    });
    class.method(AccessFlags::STATIC, "<clinit>", "()V", code);
    let code = body(1, 0, |c| {
        c.op(Opcode::Iconst0).op(Opcode::Ireturn);
    });
    class.method(PUBLIC_STATIC, "go", "()I", code);
    let class = vm.define_class(class.build()).unwrap();

    let err = vm.spawn(class, "go", "()I", &[]).unwrap_err();
    assert_eq!(
        err,
        VmError::UnhandledException {
            class_name: ExceptionKind::Arithmetic.class_name().to_string()
        }
    );
}

#[test]
fn test_string_constants_are_interned() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("Strings");
    let hello = class.string("hello");
    let length = class.method_ref("java/lang/String", "length", "()I");
    let code = body(2, 0, |c| {
        c.ldc(hello).ldc(hello);
        let differ = c.forward(Opcode::IfAcmpne);
        c.op(Opcode::Iconst1).op(Opcode::Ireturn);
        c.bind(differ);
        c.op(Opcode::Iconst0).op(Opcode::Ireturn);
    });
    class.method(PUBLIC_STATIC, "same", "()I", code);
    let code = body(1, 0, |c| {
        c.ldc(hello).op(Opcode::Areturn);
    });
    class.method(PUBLIC_STATIC, "get", "()Ljava/lang/String;", code);
    let code = body(1, 0, |c| {
        c.ldc(hello).op(Opcode::Invokevirtual).u16(length).op(Opcode::Ireturn);
    });
    class.method(PUBLIC_STATIC, "len", "()I", code);
    let class = vm.define_class(class.build()).unwrap();

    assert_eq!(run_int(&mut vm, class, "same", "()I", &[]), 1);
    assert_eq!(run_int(&mut vm, class, "len", "()I", &[]), 5);
    let (_, words) = run(&mut vm, class, "get", "()Ljava/lang/String;", &[]);
    let object = ObjectRef::from_word(words.unwrap()[0]);
    assert_eq!(vm.objects().string_text(object), Some("hello"));
    assert_eq!(vm.new_string("hello").unwrap(), object);
}

#[test]
fn test_class_constant_is_the_class_object() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("Literal");
    let this = class.class_ref("Literal");
    let code = body(1, 0, |c| {
        c.ldc(this).op(Opcode::Areturn);
    });
    class.method(PUBLIC_STATIC, "cls", "()Ljava/lang/Class;", code);
    let class = vm.define_class(class.build()).unwrap();

    let (_, words) = run(&mut vm, class, "cls", "()Ljava/lang/Class;", &[]);
    let object = ObjectRef::from_word(words.unwrap()[0]);
    assert!(!object.is_null());
    assert_eq!(vm.classes().get(class).unwrap().class_object, object);
    let class_class = vm.classes().find("java/lang/Class").unwrap();
    assert_eq!(vm.objects().class_of(object), Some(class_class));
}

#[test]
fn test_int_array_store_load_length() {
    let mut vm = vm();
    let code = body(3, 1, |c| {
        c.iconst(3).op(Opcode::Newarray).u8(T_INT).op(Opcode::Astore0);
        c.op(Opcode::Aload0).iconst(1).iconst(42).op(Opcode::Iastore);
        c.op(Opcode::Aload0).iconst(1).op(Opcode::Iaload);
        c.op(Opcode::Aload0).op(Opcode::Arraylength).op(Opcode::Iadd);
        c.op(Opcode::Ireturn);
    });
    let class = define_static(&mut vm, "Ints", "go", "()I", code);
    assert_eq!(run_int(&mut vm, class, "go", "()I", &[]), 45);
}

#[test]
fn test_byte_array_narrows() {
    let mut vm = vm();
    let code = body(3, 1, |c| {
        c.iconst(1).op(Opcode::Newarray).u8(T_BYTE).op(Opcode::Astore0);
        c.op(Opcode::Aload0).iconst(0).iconst(200).op(Opcode::Bastore);
        c.op(Opcode::Aload0).iconst(0).op(Opcode::Baload).op(Opcode::Ireturn);
    });
    let class = define_static(&mut vm, "Bytes", "go", "()I", code);
    assert_eq!(run_int(&mut vm, class, "go", "()I", &[]), -56);
}

#[test]
fn test_long_array_elements() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("LongArray");
    let value = class.long(1 << 40);
    let code = body(4, 1, |c| {
        c.iconst(2).op(Opcode::Newarray).u8(T_LONG).op(Opcode::Astore0);
        c.op(Opcode::Aload0).iconst(1).op(Opcode::Ldc2W).u16(value).op(Opcode::Lastore);
        c.op(Opcode::Aload0).iconst(1).op(Opcode::Laload).op(Opcode::Lreturn);
    });
    class.method(PUBLIC_STATIC, "go", "()J", code);
    let class = vm.define_class(class.build()).unwrap();
    let (_, words) = run(&mut vm, class, "go", "()J", &[]);
    let words = words.unwrap();
    assert_eq!(core_types::join_long(words[0], words[1]), 1 << 40);
}

#[test]
fn test_array_bounds_and_negative_size() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("Bounds");
    let code = body(2, 0, |c| {
        c.iconst(2).op(Opcode::Newarray).u8(T_INT).iconst(2).op(Opcode::Iaload);
        c.op(Opcode::Ireturn);
    });
    class.method(PUBLIC_STATIC, "over", "()I", code);
    let code = body(1, 0, |c| {
        c.iconst(-1).op(Opcode::Newarray).u8(T_INT).op(Opcode::Areturn);
    });
    class.method(PUBLIC_STATIC, "negative", "()[I", code);
    let class = vm.define_class(class.build()).unwrap();

    let (outcome, _) = run(&mut vm, class, "over", "()I", &[]);
    assert_eq!(uncaught(outcome), ExceptionKind::ArrayIndexOutOfBounds.class_name());
    let (outcome, _) = run(&mut vm, class, "negative", "()[I", &[]);
    assert_eq!(uncaught(outcome), ExceptionKind::NegativeArraySize.class_name());
}

#[test]
fn test_multianewarray_builds_every_dimension() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("Grid");
    let grid = class.class_ref("[[I");
    let code = body(2, 0, |c| {
        c.iconst(2).iconst(3).op(Opcode::Multianewarray).u16(grid).u8(2);
        c.op(Opcode::Areturn);
    });
    class.method(PUBLIC_STATIC, "make", "()[[I", code);
    let class = vm.define_class(class.build()).unwrap();

    let before = vm.objects().len();
    let (outcome, words) = run(&mut vm, class, "make", "()[[I", &[]);
    assert_eq!(outcome, SliceOutcome::Finished);
    assert_eq!(vm.objects().len(), before + 3);

    let outer = ObjectRef::from_word(words.unwrap()[0]);
    let rows = vm.objects().get(outer).unwrap().array.clone().unwrap();
    assert_eq!(rows.length, 2);
    for row in rows.data {
        let inner = vm.objects().get(ObjectRef::from_word(row)).unwrap();
        assert_eq!(inner.array.as_ref().unwrap().length, 3);
    }
}

#[test]
fn test_multianewarray_negative_count_allocates_nothing() {
    let mut vm = vm();
    let mut class = ClassBuilder::new("BadGrid");
    let grid = class.class_ref("[[I");
    let code = body(2, 0, |c| {
        let start = c.offset();
        c.iconst(2).iconst(-1).op(Opcode::Multianewarray).u16(grid).u8(2);
        c.op(Opcode::Pop).iconst(0).op(Opcode::Ireturn);
        let handler = c.offset();
        c.op(Opcode::Pop).iconst(-1).op(Opcode::Ireturn);
        c.handler(start, handler, handler, 0);
    });
    class.method(PUBLIC_STATIC, "make", "()I", code);
    let class = vm.define_class(class.build()).unwrap();

    let exception = vm
        .classes()
        .find(ExceptionKind::NegativeArraySize.class_name())
        .unwrap();
    let chain = superclasses(vm.classes(), exception).loaded.len();
    let before = vm.objects().len();
    assert_eq!(run_int(&mut vm, class, "make", "()I", &[]), -1);
    assert_eq!(vm.objects().len(), before + chain);
}

fn zoo(vm: &mut VM) -> ClassId {
    let mut pet = ClassBuilder::interface("Pet");
    pet.abstract_method(AccessFlags::PUBLIC, "name", "()I");
    vm.define_class(pet.build()).unwrap();
    for (name, parent, iface) in [
        ("Animal", "java/lang/Object", None),
        ("Dog", "Animal", Some("Pet")),
        ("Cat", "Animal", None),
    ] {
        let mut class = ClassBuilder::new(name).extends(parent);
        if let Some(iface) = iface {
            class = class.implements(iface);
        }
        add_constructor(&mut class, parent);
        vm.define_class(class.build()).unwrap();
    }

    let mut make = ClassBuilder::new("Make");
    for name in ["Dog", "Cat"] {
        let class = make.class_ref(name);
        let init = make.method_ref(name, "<init>", "()V");
        let code = body(2, 0, |c| {
            c.op(Opcode::New).u16(class).op(Opcode::Dup).op(Opcode::Invokespecial).u16(init);
            c.op(Opcode::Areturn);
        });
        make.method(PUBLIC_STATIC, &name.to_lowercase(), "()Ljava/lang/Object;", code);
    }
    let dog = make.class_ref("Dog");
    let code = body(1, 0, |c| {
        c.iconst(1).op(Opcode::Anewarray).u16(dog).op(Opcode::Areturn);
    });
    make.method(PUBLIC_STATIC, "dogs", "()Ljava/lang/Object;", code);
    let code = body(1, 0, |c| {
        c.iconst(1).op(Opcode::Newarray).u8(T_INT).op(Opcode::Areturn);
    });
    make.method(PUBLIC_STATIC, "ints", "()Ljava/lang/Object;", code);
    vm.define_class(make.build()).unwrap()
}

fn make(vm: &mut VM, factory: ClassId, name: &str) -> Word {
    let (_, words) = run(vm, factory, name, "()Ljava/lang/Object;", &[]);
    words.unwrap()[0]
}

#[test]
fn test_instanceof_matrix() {
    let mut vm = vm();
    let factory = zoo(&mut vm);
    let targets = [
        "Animal",
        "Dog",
        "Pet",
        "java/lang/Object",
        "[LAnimal;",
        "[Ljava/lang/Object;",
        "java/lang/Cloneable",
        "[I",
    ];
    let mut probe = ClassBuilder::new("Probe");
    for (i, target) in targets.iter().enumerate() {
        let index = probe.class_ref(target);
        let code = body(1, 1, |c| {
            c.op(Opcode::Aload0).op(Opcode::Instanceof).u16(index).op(Opcode::Ireturn);
        });
        probe.method(PUBLIC_STATIC, &format!("is{}", i), "(Ljava/lang/Object;)I", code);
    }
    let probe = vm.define_class(probe.build()).unwrap();

    let expected: [(&str, [i32; 8]); 4] = [
        ("dog", [1, 1, 1, 1, 0, 0, 0, 0]),
        ("cat", [1, 0, 0, 1, 0, 0, 0, 0]),
        ("dogs", [0, 0, 0, 1, 1, 1, 1, 0]),
        ("ints", [0, 0, 0, 1, 0, 0, 1, 1]),
    ];
    for (factory_method, row) in expected {
        let object = make(&mut vm, factory, factory_method);
        for (i, &want) in row.iter().enumerate() {
            let got = run_int(&mut vm, probe, &format!("is{}", i), "(Ljava/lang/Object;)I", &[object]);
            assert_eq!(got, want, "{} instanceof {}", factory_method, targets[i]);
        }
    }
    assert_eq!(run_int(&mut vm, probe, "is3", "(Ljava/lang/Object;)I", &[0]), 0);
}

#[test]
fn test_checkcast_failure_and_null() {
    let mut vm = vm();
    let factory = zoo(&mut vm);
    let mut cast = ClassBuilder::new("Cast");
    let dog = cast.class_ref("Dog");
    let code = body(1, 1, |c| {
        c.op(Opcode::Aload0).op(Opcode::Checkcast).u16(dog).op(Opcode::Areturn);
    });
    cast.method(PUBLIC_STATIC, "toDog", "(Ljava/lang/Object;)LDog;", code);
    let cast = vm.define_class(cast.build()).unwrap();

    let (outcome, words) = run(&mut vm, cast, "toDog", "(Ljava/lang/Object;)LDog;", &[0]);
    assert_eq!(outcome, SliceOutcome::Finished);
    assert_eq!(words, Some(vec![0]));

    let cat = make(&mut vm, factory, "cat");
    let (outcome, _) = run(&mut vm, cast, "toDog", "(Ljava/lang/Object;)LDog;", &[cat]);
    assert_eq!(uncaught(outcome), ExceptionKind::ClassCast.class_name());
}

#[test]
fn test_aastore_checks_element_type() {
    let mut vm = vm();
    zoo(&mut vm);
    let mut store = ClassBuilder::new("Store");
    let dog = store.class_ref("Dog");
    let cat = store.class_ref("Cat");
    let cat_init = store.method_ref("Cat", "<init>", "()V");
    let code = body(5, 0, |c| {
        c.iconst(1).op(Opcode::Anewarray).u16(dog);
        c.iconst(0);
        c.op(Opcode::New).u16(cat).op(Opcode::Dup).op(Opcode::Invokespecial).u16(cat_init);
        c.op(Opcode::Aastore).op(Opcode::Return);
    });
    store.method(PUBLIC_STATIC, "go", "()V", code);
    let store = vm.define_class(store.build()).unwrap();
    let (outcome, _) = run(&mut vm, store, "go", "()V", &[]);
    assert_eq!(uncaught(outcome), ExceptionKind::ArrayStore.class_name());
}
