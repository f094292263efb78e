//! Tests for the class and code builders

use bytecode_system::{disassemble, ClassBuilder, CodeBuilder, ConstantEntry, Opcode};

#[test]
fn test_long_constant_reserves_next_slot() {
    let mut class = ClassBuilder::new("Wide");
    let long = class.long(1 << 40);
    let after = class.integer(7);
    assert_eq!(after, long + 2);
    let descriptor = class.build();
    assert_eq!(
        descriptor.constant_pool.get(long + 1),
        Some(&ConstantEntry::Unusable)
    );
}

#[test]
fn test_interface_and_class_method_refs_are_distinct() {
    let mut class = ClassBuilder::new("User");
    let plain = class.method_ref("I", "f", "()V");
    let iface = class.interface_method_ref("I", "f", "()V");
    assert_ne!(plain, iface);
    let pool = class.build().constant_pool;
    assert!(matches!(pool.get(iface), Some(ConstantEntry::InterfaceMethodref { .. })));
    assert_eq!(pool.member_ref(plain), pool.member_ref(iface));
}

#[test]
fn test_backward_branch() {
    let mut code = CodeBuilder::new(0, 1);
    let top = code.offset();
    code.op(Opcode::Iinc).u8(0).u8(1);
    code.branch(Opcode::Goto, top);
    let body = code.build();
    assert_eq!(&body.code[3..], &[Opcode::Goto as u8, 0xff, 0xfd]);
}

#[test]
fn test_wide_forward_branch() {
    let mut code = CodeBuilder::new(0, 0);
    let label = code.forward_wide();
    code.op(Opcode::Nop);
    code.bind(label);
    code.op(Opcode::Return);
    let body = code.build();
    assert_eq!(&body.code[1..5], &6i32.to_be_bytes());
}

#[test]
fn test_large_iconst_decodes() {
    let mut code = CodeBuilder::new(2, 0);
    code.iconst(0x7fff_8000).op(Opcode::Ireturn);
    let ops: Vec<Opcode> = disassemble(&code.build().code)
        .into_iter()
        .map(|(_, op)| op)
        .collect();
    assert_eq!(
        ops,
        vec![
            Opcode::Sipush,
            Opcode::Bipush,
            Opcode::Ishl,
            Opcode::Sipush,
            Opcode::Iadd,
            Opcode::Ireturn
        ]
    );
}

#[test]
fn test_ldc_picks_wide_form_for_large_index() {
    let mut code = CodeBuilder::new(1, 0);
    code.ldc(3).ldc(300);
    assert_eq!(
        code.build().code,
        vec![Opcode::Ldc as u8, 3, Opcode::LdcW as u8, 0x01, 0x2c]
    );
}
