//! Tests for the class descriptor model

use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, ConstantEntry, Opcode};

#[test]
fn test_find_members_by_name_and_descriptor() {
    let mut class = ClassBuilder::new("pkg/Shape");
    class.field(AccessFlags::PRIVATE, "sides", "I");
    class.field(AccessFlags::PRIVATE, "sides", "J");
    class.abstract_method(AccessFlags::PUBLIC, "area", "()D");
    let descriptor = class.build();

    assert_eq!(descriptor.find_field("sides", "J"), Some(1));
    assert_eq!(descriptor.find_field("sides", "D"), None);
    assert_eq!(descriptor.find_method("area", "()D"), Some(0));
    assert!(descriptor.method(0).unwrap().code().is_none());
}

#[test]
fn test_interface_flags() {
    let iface = ClassBuilder::interface("pkg/Named").build();
    assert!(iface.is_interface());
    assert!(iface.access.is_abstract());
    let class = ClassBuilder::new("pkg/Plain").build();
    assert!(!class.is_interface());
    assert!(class.access.is_super());
}

#[test]
fn test_root_class_has_no_super() {
    let root = ClassBuilder::new("java/lang/Object").without_super().build();
    assert_eq!(root.super_name, None);
    assert_eq!(root.package_name(), "java/lang");
}

#[test]
fn test_code_attribute_exception_table() {
    let mut class = ClassBuilder::new("Catcher");
    let catch = class.class_ref("java/lang/ArithmeticException");
    let mut code = CodeBuilder::new(2, 0);
    code.op(Opcode::Iconst1).op(Opcode::Iconst0).op(Opcode::Idiv);
    let end = code.offset();
    code.op(Opcode::Ireturn);
    let handler = code.offset();
    code.op(Opcode::Pop).op(Opcode::IconstM1).op(Opcode::Ireturn);
    code.handler(0, end, handler, catch);
    class.method(AccessFlags::STATIC, "safe", "()I", code.build());

    let descriptor = class.build();
    let body = descriptor.methods[0].code().unwrap();
    assert_eq!(body.exception_table.len(), 1);
    let row = body.exception_table[0];
    assert!(row.covers(2));
    assert!(!row.covers(end as u32));
    assert_eq!(
        descriptor.constant_pool.class_name(row.catch_type),
        Some("java/lang/ArithmeticException")
    );
    assert!(matches!(
        descriptor.constant_pool.get(catch),
        Some(ConstantEntry::Class { .. })
    ));
}
