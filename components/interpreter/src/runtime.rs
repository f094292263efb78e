//! Shared runtime state: tables, loader, natives and call-site caches.
//!
//! Every thread executes against the same [`Runtime`]; the embedding [`VM`]
//! owns it and lends it to one dispatcher at a time.
//!
//! [`VM`]: crate::VM

use std::collections::HashMap;

use bytecode_system::ClassDescriptor;
use core_types::{ExceptionKind, ObjectRef, VerificationError, VmConfig, VmError, VmResult};
use linker::{Linker, SlotOutcome};
use memory_manager::{
    CacheSlot, ClassId, ClassTable, Heap, ObjectError, ObjectTable, RefCounts, RefNode,
    ReferenceTracker, ResolvedField, ResolvedMethod,
};
use tracing::{debug, warn};

use crate::core_classes::CLASS_CLASS;
use crate::inline_cache::InlineCache;
use crate::loader::ClassLoader;
use crate::native::NativeRegistry;

/// Call site key: calling class and constant-pool index
pub(crate) type CallSite = (ClassId, u16);

#[derive(Debug)]
pub(crate) struct Runtime {
    pub classes: ClassTable,
    pub objects: ObjectTable,
    pub refs: RefCounts,
    pub natives: NativeRegistry,
    pub loader: Box<dyn ClassLoader>,
    pub config: VmConfig,
    pub inline_caches: HashMap<CallSite, InlineCache>,
    pub oom_error: ObjectRef,
    pub halted: bool,
}

impl Runtime {
    pub fn new(config: VmConfig, loader: Box<dyn ClassLoader>) -> Self {
        Self {
            classes: ClassTable::new(),
            objects: ObjectTable::new(Box::new(Heap::with_limit(config.heap_limit))),
            refs: RefCounts::new(),
            natives: NativeRegistry::new(),
            loader,
            config,
            inline_caches: HashMap::new(),
            oom_error: ObjectRef::NULL,
            halted: false,
        }
    }

    /// Find `name`, asking the loader on a miss
    ///
    /// A loaded class is defined before its superclass and interfaces are
    /// loaded, so cyclic declarations cannot recurse forever. Array names
    /// load their element class and are then synthesized.
    pub fn load_class(&mut self, name: &str) -> VmResult<Option<ClassId>> {
        if let Some(id) = self.classes.find_or_synthesize(name)? {
            return Ok(Some(id));
        }
        if name.starts_with('[') {
            let element = name.trim_start_matches('[');
            let Some(element) = element.strip_prefix('L').and_then(|e| e.strip_suffix(';')) else {
                return Ok(None);
            };
            if self.load_class(element)?.is_none() {
                return Ok(None);
            }
            return self.classes.find_or_synthesize(name);
        }

        let Some(descriptor) = self.loader.load(name) else {
            return Ok(None);
        };
        if descriptor.name != name {
            warn!(requested = name, supplied = %descriptor.name, "loader returned a different class");
            return Ok(None);
        }
        let supertypes: Vec<String> = descriptor
            .super_name
            .iter()
            .chain(descriptor.interfaces.iter())
            .cloned()
            .collect();
        let id = self.classes.insert(descriptor)?;
        debug!(class = name, id = id.index(), "class loaded");
        for supertype in supertypes {
            if self.load_class(&supertype)?.is_none() {
                debug!(class = name, missing = %supertype, "supertype not loadable yet");
            }
        }
        Ok(Some(id))
    }

    /// Find `name` or fail with [`VmError::ClassNotFound`]
    pub fn require_class(&mut self, name: &str) -> VmResult<ClassId> {
        self.load_class(name)?
            .ok_or_else(|| VmError::ClassNotFound(name.to_string()))
    }

    pub fn define_class(&mut self, descriptor: ClassDescriptor) -> VmResult<ClassId> {
        self.classes.insert(descriptor)
    }

    /// Resolve every reference of `class` without loading anything
    pub fn link(&mut self, class: ClassId) -> VmResult<bool> {
        let hidden = self.config.link_hidden_natives;
        Linker::new(&mut self.classes, &mut self.refs, &self.natives).resolve(class, hidden)
    }

    /// Cached resolution of one slot, linking it first if needed
    ///
    /// A deferral loads the missing class and retries; a class that cannot
    /// be loaded is [`VmError::ClassNotFound`].
    pub fn resolve_slot(&mut self, class: ClassId, index: u16) -> VmResult<CacheSlot> {
        let hidden = self.config.link_hidden_natives;
        let mut last_missing: Option<String> = None;
        loop {
            if let Some(slot) = self.classes.entry(class)?.cache.get(index as usize) {
                if slot.is_resolved() {
                    return Ok(*slot);
                }
            }
            let outcome = Linker::new(&mut self.classes, &mut self.refs, &self.natives)
                .resolve_slot(class, index, hidden)?;
            match outcome {
                SlotOutcome::Resolved => {}
                SlotOutcome::Literal => {
                    return Err(VerificationError::BadConstantTag {
                        index,
                        expected: "symbolic reference",
                    }
                    .into())
                }
                SlotOutcome::Deferred(missing) => {
                    if last_missing.as_deref() == Some(missing.as_str())
                        || self.load_class(&missing)?.is_none()
                    {
                        return Err(VmError::ClassNotFound(missing));
                    }
                    last_missing = Some(missing);
                }
            }
        }
    }

    pub fn resolve_class(&mut self, class: ClassId, index: u16) -> VmResult<ClassId> {
        match self.resolve_slot(class, index)? {
            CacheSlot::Class(id) => Ok(id),
            _ => Err(bad_tag(index, "Class")),
        }
    }

    pub fn resolve_field(&mut self, class: ClassId, index: u16) -> VmResult<ResolvedField> {
        match self.resolve_slot(class, index)? {
            CacheSlot::Field(field) => Ok(field),
            _ => Err(bad_tag(index, "Fieldref")),
        }
    }

    pub fn resolve_method(&mut self, class: ClassId, index: u16) -> VmResult<ResolvedMethod> {
        match self.resolve_slot(class, index)? {
            CacheSlot::Method(method) => Ok(method),
            _ => Err(bad_tag(index, "Methodref")),
        }
    }

    /// Class an exception kind materializes as
    pub fn exception_class(&mut self, kind: ExceptionKind) -> VmResult<ClassId> {
        self.require_class(kind.class_name())
    }

    /// The `java/lang/Class` instance of `class`, created on first use
    pub fn class_object(&mut self, class: ClassId) -> Result<ObjectRef, ObjectError> {
        let existing = self.classes.entry(class)?.class_object;
        if !existing.is_null() {
            return Ok(existing);
        }
        let class_class = self.require_class(CLASS_CLASS)?;
        let object = self.objects.instantiate(&self.classes, class_class)?;
        self.classes.entry_mut(class)?.class_object = object;
        self.refs
            .mark_reference(RefNode::Class(class), RefNode::Object(object));
        Ok(object)
    }

    /// Drop every call-site cache that involves `class`
    pub fn forget_call_sites(&mut self, class: ClassId) {
        self.inline_caches
            .retain(|(caller, _), cache| *caller != class && !cache.mentions(class));
    }
}

fn bad_tag(index: u16, expected: &'static str) -> VmError {
    VerificationError::BadConstantTag { index, expected }.into()
}
