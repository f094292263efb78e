//! Native method registry.
//!
//! Natives are plain function pointers keyed by class, name and descriptor.
//! The linker asks the registry for ordinals through [`NativeLocator`]; the
//! interpreter invokes by ordinal. Hidden natives are bootstrap helpers that
//! only bind when the linker is told to look for them.

use std::collections::HashMap;
use std::fmt;

use arrayvec::ArrayVec;
use core_types::{ExceptionKind, NativeOrdinal, ObjectRef, ThreadId, Word};
use linker::NativeLocator;
use memory_manager::{ClassTable, ObjectTable};
use tracing::trace;

/// Words a native returns; empty for `void`
pub type NativeReturn = ArrayVec<Word, 2>;

/// Outcome of a native call; `Err` raises the exception in the caller
pub type NativeResult = Result<NativeReturn, ExceptionKind>;

/// Native implementation
///
/// Receives the argument words in push order, receiver first for instance
/// methods.
pub type NativeFn = fn(&mut NativeEnv<'_>, &[Word]) -> NativeResult;

/// Runtime state a native may touch
pub struct NativeEnv<'a> {
    /// Class table
    pub classes: &'a mut ClassTable,
    /// Object table
    pub objects: &'a mut ObjectTable,
    /// Calling thread
    pub thread: ThreadId,
}

struct NativeEntry {
    class: String,
    name: String,
    descriptor: String,
    hidden: bool,
    func: NativeFn,
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("class", &self.class)
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("hidden", &self.hidden)
            .finish()
    }
}

type NativeKey = (String, String, String);

/// Registry of native implementations
#[derive(Debug, Default)]
pub struct NativeRegistry {
    entries: Vec<NativeEntry>,
    index: HashMap<NativeKey, usize>,
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the natives the core classes declare
    pub fn with_core_natives() -> Self {
        let mut registry = Self::new();
        registry.register_core_natives();
        registry
    }

    /// Add the natives the core classes declare
    pub fn register_core_natives(&mut self) {
        self.register("java/lang/Object", "hashCode", "()I", object_hash_code);
        self.register_hidden("java/lang/Object", "registerNatives", "()V", no_op);
        self.register("java/lang/String", "length", "()I", string_length);
    }

    fn insert(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        hidden: bool,
        func: NativeFn,
    ) -> NativeOrdinal {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        let entry = NativeEntry {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            hidden,
            func,
        };
        let ordinal = match self.index.get(&key) {
            Some(&existing) => {
                self.entries[existing] = entry;
                existing
            }
            None => {
                self.entries.push(entry);
                self.index.insert(key, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        NativeOrdinal(ordinal as u32)
    }

    /// Register a native, replacing an earlier one with the same key
    pub fn register(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        func: NativeFn,
    ) -> NativeOrdinal {
        self.insert(class, name, descriptor, false, func)
    }

    /// Register a bootstrap native that binds only when hidden natives are
    /// requested
    pub fn register_hidden(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        func: NativeFn,
    ) -> NativeOrdinal {
        self.insert(class, name, descriptor, true, func)
    }

    /// Call the native behind `ordinal`; `None` if no such ordinal exists
    pub fn invoke(
        &self,
        ordinal: NativeOrdinal,
        env: &mut NativeEnv<'_>,
        args: &[Word],
    ) -> Option<NativeResult> {
        let entry = self.entries.get(ordinal.0 as usize)?;
        trace!(class = %entry.class, name = %entry.name, "native call");
        Some((entry.func)(env, args))
    }

    /// `class.name descriptor` of an ordinal
    pub fn describe(&self, ordinal: NativeOrdinal) -> Option<String> {
        let entry = self.entries.get(ordinal.0 as usize)?;
        Some(format!("{}.{}{}", entry.class, entry.name, entry.descriptor))
    }

    /// Number of registered natives
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NativeLocator for NativeRegistry {
    fn locate(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        include_hidden: bool,
    ) -> Option<NativeOrdinal> {
        let key = (class.to_string(), name.to_string(), descriptor.to_string());
        let &index = self.index.get(&key)?;
        let entry = &self.entries[index];
        (include_hidden || !entry.hidden).then_some(NativeOrdinal(index as u32))
    }
}

fn object_hash_code(_: &mut NativeEnv<'_>, args: &[Word]) -> NativeResult {
    let receiver = args.first().copied().ok_or(ExceptionKind::NullPointer)?;
    let mut out = NativeReturn::new();
    out.push(receiver);
    Ok(out)
}

fn no_op(_: &mut NativeEnv<'_>, _: &[Word]) -> NativeResult {
    Ok(NativeReturn::new())
}

fn string_length(env: &mut NativeEnv<'_>, args: &[Word]) -> NativeResult {
    let receiver = ObjectRef::from_word(args.first().copied().unwrap_or(0));
    let text = env
        .objects
        .string_text(receiver)
        .ok_or(ExceptionKind::NullPointer)?;
    let mut out = NativeReturn::new();
    out.push(text.encode_utf16().count() as Word);
    Ok(out)
}
