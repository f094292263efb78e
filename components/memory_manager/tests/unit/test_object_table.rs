//! Tests for the object table

use bytecode_system::{ClassBuilder, OBJECT_CLASS};
use memory_manager::{Allocator, ClassTable, Heap, ObjectError, ObjectTable};

fn table() -> ClassTable {
    let mut table = ClassTable::new();
    table
        .insert(ClassBuilder::new(OBJECT_CLASS).without_super().build())
        .unwrap();
    table
        .insert(ClassBuilder::new("java/lang/String").build())
        .unwrap();
    table
}

#[test]
fn test_strings_are_interned() {
    let classes = table();
    let mut objects = ObjectTable::new(Box::new(Heap::default()));
    let a = objects.intern_string(&classes, "hello").unwrap();
    let b = objects.intern_string(&classes, "hello").unwrap();
    let c = objects.intern_string(&classes, "world").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(objects.string_text(a), Some("hello"));
}

#[test]
fn test_released_string_is_reinterned_fresh() {
    let classes = table();
    let mut objects = ObjectTable::new(Box::new(Heap::default()));
    let a = objects.intern_string(&classes, "x").unwrap();
    objects.release(a);
    assert!(objects.get(a).is_none());
    let b = objects.intern_string(&classes, "x").unwrap();
    assert_eq!(objects.string_text(b), Some("x"));
}

#[test]
fn test_missing_superclass_is_reported() {
    let mut classes = table();
    let orphan = classes
        .insert(ClassBuilder::new("Orphan").extends("Missing").build())
        .unwrap();
    let mut objects = ObjectTable::new(Box::new(Heap::default()));
    let err = objects.instantiate(&classes, orphan).unwrap_err();
    assert!(matches!(err, ObjectError::Vm(_)));
    assert_eq!(objects.allocator().bytes_in_use(), 0);
}
