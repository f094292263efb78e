//! Unit tests for core_types

mod test_config;
mod test_error;
