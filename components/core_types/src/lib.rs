//! Core value types, error taxonomy and configuration for the class-file VM.
//!
//! This crate provides the foundational types shared by every other component:
//! machine words and their 64-bit split convention, object references, base
//! value-type tags, the fatal/catchable error split and the runtime
//! configuration.
//!
//! # Overview
//!
//! - [`Word`] - A 32-bit stack, local or field slot
//! - [`ObjectRef`] - Reference to an object instance (`0` is null)
//! - [`BaseType`] - Value-type tag derived from a descriptor
//! - [`ExceptionKind`] - User-catchable runtime conditions
//! - [`VmError`] - Fatal conditions for the top-level recovery point
//! - [`VmConfig`] - Runtime tunables
//!
//! # Examples
//!
//! ```
//! use core_types::{join_long, split_long, ExceptionKind, ObjectRef};
//!
//! let [high, low] = split_long(1 << 40);
//! assert_eq!(join_long(high, low), 1 << 40);
//!
//! assert!(ObjectRef::NULL.is_null());
//! assert_eq!(ExceptionKind::NullPointer.class_name(), "java/lang/NullPointerException");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod error;
mod value;

pub use config::VmConfig;
pub use error::{ExceptionKind, ResolutionError, VerificationError, VmError, VmResult};
pub use value::{
    float_to_word, join_double, join_long, split_double, split_long, word_to_float, BaseType,
    NativeOrdinal, ObjectRef, ThreadId, Word,
};
