//! Unit tests for the interpreter

mod test_objects;
