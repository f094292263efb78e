//! Bytecode interpreter for class-file virtual machines
//!
//! This crate provides the execution engine:
//! - A per-thread fetch-decode-execute loop over the JVM instruction set
//! - Method invocation with frame and operand-stack management
//! - Exception raising, handler search and unwinding
//! - Monitors, class initialization and call-site inline caches
//!
//! # Example
//!
//! ```
//! use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode};
//! use core_types::VmConfig;
//! use interpreter::VM;
//!
//! let mut vm = VM::with_core_classes(VmConfig::default()).unwrap();
//!
//! let mut math = ClassBuilder::new("Math");
//! let mut code = CodeBuilder::new(2, 2);
//! code.op(Opcode::Iload0).op(Opcode::Iload1).op(Opcode::Imul).op(Opcode::Ireturn);
//! math.method(AccessFlags::PUBLIC | AccessFlags::STATIC, "mul", "(II)I", code.build());
//! let math = vm.define_class(math.build()).unwrap();
//!
//! let thread = vm.spawn(math, "mul", "(II)I", &[6, 7]).unwrap();
//! assert!(vm.run_all().is_empty());
//! assert_eq!(vm.thread_result(thread), Some(&[42][..]));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod context;
pub mod convert;
pub mod core_classes;
pub mod inline_cache;
pub mod loader;
pub mod native;
pub mod vm;

mod dispatch;
mod exception;
mod invoke;
mod objects;
mod runtime;

// Re-export main types at crate root
pub use call_frame::{CallFrame, ProgramCounter};
pub use context::{ThreadContext, ThreadState};
pub use inline_cache::InlineCache;
pub use loader::{ClassLoader, MapLoader};
pub use native::{NativeEnv, NativeFn, NativeRegistry, NativeResult, NativeReturn};
pub use vm::{SliceOutcome, VM};
