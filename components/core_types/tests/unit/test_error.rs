//! Unit tests for the error taxonomy

use core_types::{ExceptionKind, ResolutionError, VerificationError, VmError};

#[test]
fn test_every_kind_lives_in_java_lang() {
    for kind in ExceptionKind::ALL {
        assert!(kind.class_name().starts_with("java/lang/"));
    }
}

#[test]
fn test_no_such_method_message() {
    let err = ResolutionError::NoSuchMethod {
        class: "Leaf".to_string(),
        name: "m".to_string(),
        descriptor: "()V".to_string(),
    };
    assert_eq!(err.to_string(), "no such method: Leaf.m()V");
}

#[test]
fn test_illegal_opcode_message() {
    let err: VmError = VerificationError::IllegalOpcode {
        opcode: 0xcb,
        offset: 12,
    }
    .into();
    assert_eq!(err.to_string(), "illegal opcode 0xcb at offset 12");
}

#[test]
fn test_unhandled_exception_message() {
    let err = VmError::UnhandledException {
        class_name: "java/lang/ArithmeticException".to_string(),
    };
    assert!(err.to_string().contains("ArithmeticException"));
    assert!(!err.is_process_fatal());
}

#[test]
fn test_halted_is_process_fatal() {
    assert!(VmError::Halted.is_process_fatal());
}
