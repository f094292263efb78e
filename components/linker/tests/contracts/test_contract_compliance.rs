//! Contract compliance tests for the linker
//!
//! The interpreter relies on these outcomes when it links on demand.

use bytecode_system::{ClassBuilder, OBJECT_CLASS};
use linker::{Linker, NoNatives, SlotOutcome};
use memory_manager::{ClassTable, RefCounts};

fn table() -> ClassTable {
    let mut table = ClassTable::new();
    table
        .insert(ClassBuilder::new(OBJECT_CLASS).without_super().build())
        .unwrap();
    table
}

/// Literal slots report `Literal` and are never cached
#[test]
fn test_contract_literal_slots() {
    let mut classes = table();
    let mut class = ClassBuilder::new("Lits");
    let int = class.integer(4);
    let long = class.long(5);
    let id = classes.insert(class.build()).unwrap();
    let mut refs = RefCounts::new();
    let mut linker = Linker::new(&mut classes, &mut refs, &NoNatives);
    assert_eq!(linker.resolve_slot(id, int, false).unwrap(), SlotOutcome::Literal);
    assert_eq!(linker.resolve_slot(id, long + 1, false).unwrap(), SlotOutcome::Literal);
}

/// A deferred slot names the class that must be loaded
#[test]
fn test_contract_deferral_names_missing_class() {
    let mut classes = table();
    let mut class = ClassBuilder::new("User");
    let slot = class.method_ref("Elsewhere", "run", "()V");
    let id = classes.insert(class.build()).unwrap();
    let mut refs = RefCounts::new();
    let outcome = Linker::new(&mut classes, &mut refs, &NoNatives)
        .resolve_slot(id, slot, false)
        .unwrap();
    assert_eq!(outcome, SlotOutcome::Deferred("Elsewhere".to_string()));
}

/// Self references are cached but never counted
#[test]
fn test_contract_self_reference_uncounted() {
    let mut classes = table();
    let mut class = ClassBuilder::new("Selfish");
    class.class_ref("Selfish");
    let id = classes.insert(class.build()).unwrap();
    let mut refs = RefCounts::new();
    assert!(Linker::new(&mut classes, &mut refs, &NoNatives)
        .resolve(id, false)
        .unwrap());
    assert_eq!(refs.total(), 0);
}

/// Out-of-range slot indices are verification errors, not panics
#[test]
fn test_contract_bad_index() {
    let mut classes = table();
    let id = classes.insert(ClassBuilder::new("Tiny").build()).unwrap();
    let mut refs = RefCounts::new();
    assert!(Linker::new(&mut classes, &mut refs, &NoNatives)
        .resolve_slot(id, 200, false)
        .is_err());
}
