//! Contract tests for the memory_manager public API
