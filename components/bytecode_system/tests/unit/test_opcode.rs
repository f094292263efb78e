//! Tests for the opcode table and instruction decoder

use bytecode_system::{disassemble, instruction_length, Opcode};

#[test]
fn test_fixed_operand_lengths() {
    assert_eq!(Opcode::Bipush.operand_bytes(), Some(1));
    assert_eq!(Opcode::Invokeinterface.operand_bytes(), Some(4));
    assert_eq!(Opcode::Multianewarray.operand_bytes(), Some(3));
    assert_eq!(Opcode::GotoW.operand_bytes(), Some(4));
    assert_eq!(Opcode::Tableswitch.operand_bytes(), None);
}

#[test]
fn test_mnemonics() {
    assert_eq!(Opcode::IfIcmpge.mnemonic(), "if_icmpge");
    assert_eq!(Opcode::Invokespecial.mnemonic(), "invokespecial");
}

#[test]
fn test_tableswitch_length_includes_padding() {
    // tableswitch at offset 1: 2 pad bytes, default, low=0, high=1, 2 targets
    let mut code = vec![Opcode::Nop as u8, Opcode::Tableswitch as u8, 0, 0];
    code.extend_from_slice(&0i32.to_be_bytes());
    code.extend_from_slice(&0i32.to_be_bytes());
    code.extend_from_slice(&1i32.to_be_bytes());
    code.extend_from_slice(&0i32.to_be_bytes());
    code.extend_from_slice(&0i32.to_be_bytes());
    assert_eq!(instruction_length(&code, 1), Some(3 + 12 + 8));
}

#[test]
fn test_wide_iinc_length() {
    let code = [Opcode::Wide as u8, Opcode::Iinc as u8, 0, 1, 0, 5];
    assert_eq!(instruction_length(&code, 0), Some(6));
}

#[test]
fn test_disassemble_walks_instructions() {
    let code = [
        Opcode::Iconst1 as u8,
        Opcode::Bipush as u8,
        7,
        Opcode::Iadd as u8,
        Opcode::Ireturn as u8,
    ];
    let ops: Vec<_> = disassemble(&code).into_iter().collect();
    assert_eq!(
        ops,
        vec![
            (0, Opcode::Iconst1),
            (1, Opcode::Bipush),
            (3, Opcode::Iadd),
            (4, Opcode::Ireturn)
        ]
    );
}

#[test]
fn test_return_and_invoke_classification() {
    assert!(Opcode::Areturn.is_return());
    assert!(!Opcode::Athrow.is_return());
    assert!(Opcode::Invokeinterface.is_invoke());
    assert!(Opcode::Athrow.is_unconditional_terminator());
}
