//! Constant-pool resolution.
//!
//! [`Linker::resolve`] walks a class's constant pool once, filling the
//! late-binding cache for every `Class`, `Fieldref`, `Methodref` and
//! `InterfaceMethodref` slot. A reference to a class that is not loaded yet
//! defers the slot; the class is marked linked only when nothing deferred.
//! [`Linker::unresolve`] is the inverse walk run before unloading.

use std::sync::Arc;

use bytecode_system::{ConstantEntry, MethodSignature, OBJECT_CLASS};
use core_types::{ResolutionError, VerificationError, VmError, VmResult};
use memory_manager::{
    CacheSlot, ClassId, ClassStatus, ClassTable, MethodBody, RefNode, ReferenceTracker,
    ResolvedField, ResolvedMethod,
};
use tracing::{debug, trace};

use crate::hierarchy::{first_declaring, superclasses, superinterfaces, Ancestry, MemberKind};
use crate::native::NativeLocator;

/// Result of resolving one constant-pool slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The cache slot now holds a resolution
    Resolved,
    /// Literal entry; nothing to link
    Literal,
    /// Resolution needs this class, which is not loaded yet
    Deferred(String),
}

/// Resolver bound to a class table, reference hooks and native locator
pub struct Linker<'a> {
    classes: &'a mut ClassTable,
    refs: &'a mut dyn ReferenceTracker,
    natives: &'a dyn NativeLocator,
}

impl<'a> Linker<'a> {
    /// Bind a linker to its collaborators
    pub fn new(
        classes: &'a mut ClassTable,
        refs: &'a mut dyn ReferenceTracker,
        natives: &'a dyn NativeLocator,
    ) -> Self {
        Self {
            classes,
            refs,
            natives,
        }
    }

    /// Resolve every symbolic reference of `class`
    ///
    /// Returns whether the class is now fully linked. A class that is not in
    /// use yields `false`; an already linked class is left untouched.
    /// Resolution failures abort the walk with an error.
    pub fn resolve(&mut self, class: ClassId, find_hidden: bool) -> VmResult<bool> {
        let Some(entry) = self.classes.get(class) else {
            return Ok(false);
        };
        if !entry.status.is_in_use() {
            return Ok(false);
        }
        if entry.status.is_linked() {
            return Ok(true);
        }

        let slots = entry.cache.len();
        let mut complete = true;
        for index in 1..slots {
            if let SlotOutcome::Deferred(missing) =
                self.resolve_slot(class, index as u16, find_hidden)?
            {
                trace!(class = class.index(), slot = index, missing = %missing, "slot deferred");
                complete = false;
            }
        }

        if complete {
            let entry = self.classes.entry_mut(class)?;
            entry.status.insert(ClassStatus::LINKED);
            debug!(class = %entry.name(), "class linked");
        }
        Ok(complete)
    }

    /// Resolve a single constant-pool slot of `class`
    ///
    /// Already resolved slots report [`SlotOutcome::Resolved`] without any
    /// further work.
    pub fn resolve_slot(
        &mut self,
        class: ClassId,
        index: u16,
        find_hidden: bool,
    ) -> VmResult<SlotOutcome> {
        let entry = self.classes.entry(class)?;
        if entry.cache.get(index as usize).is_some_and(CacheSlot::is_resolved) {
            return Ok(SlotOutcome::Resolved);
        }
        let descriptor = Arc::clone(&entry.descriptor);
        let pool = &descriptor.constant_pool;
        let constant = pool.get(index).ok_or(VerificationError::BadConstantTag {
            index,
            expected: "constant",
        })?;

        let slot = match constant {
            ConstantEntry::Class { .. } => {
                let name = pool.class_name(index).ok_or(VerificationError::BadConstantTag {
                    index,
                    expected: "Class",
                })?;
                match self.classes.find_or_synthesize(name)? {
                    Some(id) => CacheSlot::Class(id),
                    None => return Ok(SlotOutcome::Deferred(name.to_string())),
                }
            }
            ConstantEntry::Fieldref { .. } => {
                let member = pool.member_ref(index).ok_or(VerificationError::BadConstantTag {
                    index,
                    expected: "Fieldref",
                })?;
                let owner = match self.owning_class(class, member.class_index, find_hidden)? {
                    Ok(owner) => owner,
                    Err(missing) => return Ok(SlotOutcome::Deferred(missing)),
                };
                match lookup_field(self.classes, owner, member.name, member.descriptor)? {
                    Ok(field) => CacheSlot::Field(field),
                    Err(missing) => return Ok(SlotOutcome::Deferred(missing)),
                }
            }
            ConstantEntry::Methodref { .. } => {
                let member = pool.member_ref(index).ok_or(VerificationError::BadConstantTag {
                    index,
                    expected: "Methodref",
                })?;
                let owner = match self.owning_class(class, member.class_index, find_hidden)? {
                    Ok(owner) => owner,
                    Err(missing) => return Ok(SlotOutcome::Deferred(missing)),
                };
                if self.is_interface(owner) {
                    return Err(ResolutionError::IncompatibleClassChange(format!(
                        "Methodref {}.{}{} names an interface",
                        member.class_name, member.name, member.descriptor
                    ))
                    .into());
                }
                match lookup_class_method(
                    self.classes,
                    self.natives,
                    owner,
                    member.name,
                    member.descriptor,
                    find_hidden,
                )? {
                    Ok(method) => CacheSlot::Method(method),
                    Err(missing) => return Ok(SlotOutcome::Deferred(missing)),
                }
            }
            ConstantEntry::InterfaceMethodref { .. } => {
                let member = pool.member_ref(index).ok_or(VerificationError::BadConstantTag {
                    index,
                    expected: "InterfaceMethodref",
                })?;
                let owner = match self.owning_class(class, member.class_index, find_hidden)? {
                    Ok(owner) => owner,
                    Err(missing) => return Ok(SlotOutcome::Deferred(missing)),
                };
                if !self.is_interface(owner) {
                    return Err(ResolutionError::IncompatibleClassChange(format!(
                        "InterfaceMethodref {}.{}{} names a class",
                        member.class_name, member.name, member.descriptor
                    ))
                    .into());
                }
                match lookup_interface_method(
                    self.classes,
                    self.natives,
                    owner,
                    member.name,
                    member.descriptor,
                    find_hidden,
                )? {
                    Ok(method) => CacheSlot::Method(method),
                    Err(missing) => return Ok(SlotOutcome::Deferred(missing)),
                }
            }
            _ => return Ok(SlotOutcome::Literal),
        };

        self.store(class, index, slot)?;
        Ok(SlotOutcome::Resolved)
    }

    /// Clear every resolved slot of `class` and drop the references they held
    pub fn unresolve(&mut self, class: ClassId) -> VmResult<()> {
        let entry = self.classes.entry_mut(class)?;
        let mut dropped = Vec::new();
        for slot in entry.cache.iter_mut() {
            if let Some(target) = slot.target_class() {
                if target != class {
                    dropped.push(target);
                }
            }
            *slot = CacheSlot::Unresolved;
        }
        entry.status.remove(ClassStatus::LINKED);
        debug!(class = %entry.name(), dropped = dropped.len(), "class unresolved");
        for target in dropped {
            self.refs
                .unmark_reference(RefNode::Class(class), RefNode::Class(target));
        }
        Ok(())
    }

    fn store(&mut self, class: ClassId, index: u16, slot: CacheSlot) -> VmResult<()> {
        let entry = self.classes.entry_mut(class)?;
        let cell = entry
            .cache
            .get_mut(index as usize)
            .ok_or(VerificationError::BadConstantTag {
                index,
                expected: "constant",
            })?;
        *cell = slot;
        if let Some(target) = slot.target_class() {
            if target != class {
                self.refs
                    .mark_reference(RefNode::Class(class), RefNode::Class(target));
            }
        }
        Ok(())
    }

    fn is_interface(&self, class: ClassId) -> bool {
        self.classes.get(class).is_some_and(|e| e.is_interface())
    }

    /// Resolve the `Class` slot a member reference names, first
    fn owning_class(
        &mut self,
        class: ClassId,
        class_index: u16,
        find_hidden: bool,
    ) -> VmResult<Result<ClassId, String>> {
        match self.resolve_slot(class, class_index, find_hidden)? {
            SlotOutcome::Deferred(missing) => Ok(Err(missing)),
            SlotOutcome::Literal => Err(VerificationError::BadConstantTag {
                index: class_index,
                expected: "Class",
            }
            .into()),
            SlotOutcome::Resolved => match self.classes.entry(class)?.cache[class_index as usize] {
                CacheSlot::Class(id) => Ok(Ok(id)),
                _ => Err(VerificationError::BadConstantTag {
                    index: class_index,
                    expected: "Class",
                }
                .into()),
            },
        }
    }
}

/// Field lookup from `owner`; `Err` names a missing ancestor
fn lookup_field(
    classes: &ClassTable,
    owner: ClassId,
    name: &str,
    descriptor: &str,
) -> VmResult<Result<ResolvedField, String>> {
    let order = field_search_order(classes, owner);
    let Some(member) = first_declaring(classes, &order.loaded, name, descriptor, MemberKind::Field)
    else {
        return match order.missing {
            Some(missing) => Ok(Err(missing)),
            None => Err(no_such_field(classes, owner, name, descriptor)),
        };
    };
    classify_field(classes, member.owner, member.index)
        .map(Ok)
        .ok_or_else(|| no_such_field(classes, owner, name, descriptor))
}

/// Methodref lookup: superclass chain, then superinterfaces, then the root
fn lookup_class_method(
    classes: &ClassTable,
    natives: &dyn NativeLocator,
    owner: ClassId,
    name: &str,
    descriptor: &str,
    find_hidden: bool,
) -> VmResult<Result<ResolvedMethod, String>> {
    let chain = superclasses(classes, owner);
    let interfaces = superinterfaces(classes, &chain.loaded);
    let root: Vec<ClassId> = classes.find(OBJECT_CLASS).into_iter().collect();

    let found = [&chain.loaded, &interfaces.loaded, &root]
        .into_iter()
        .find_map(|order| first_declaring(classes, order, name, descriptor, MemberKind::Method));
    match found {
        Some(member) => {
            classify_method(classes, natives, member.owner, member.index, find_hidden).map(Ok)
        }
        None => match chain.missing.or(interfaces.missing) {
            Some(missing) => Ok(Err(missing)),
            None => Err(no_such_method(classes, owner, name, descriptor)),
        },
    }
}

/// InterfaceMethodref lookup: the interface, its superinterfaces, and the
/// root only once every superinterface is loaded
fn lookup_interface_method(
    classes: &ClassTable,
    natives: &dyn NativeLocator,
    owner: ClassId,
    name: &str,
    descriptor: &str,
    find_hidden: bool,
) -> VmResult<Result<ResolvedMethod, String>> {
    let interfaces = superinterfaces(classes, &[owner]);
    let mut found = first_declaring(classes, &[owner], name, descriptor, MemberKind::Method)
        .or_else(|| {
            first_declaring(classes, &interfaces.loaded, name, descriptor, MemberKind::Method)
        });
    if found.is_none() {
        if let Some(missing) = interfaces.missing {
            return Ok(Err(missing));
        }
        let root: Vec<ClassId> = classes.find(OBJECT_CLASS).into_iter().collect();
        found = first_declaring(classes, &root, name, descriptor, MemberKind::Method);
    }
    match found {
        Some(member) => {
            classify_method(classes, natives, member.owner, member.index, find_hidden).map(Ok)
        }
        None => Err(no_such_method(classes, owner, name, descriptor)),
    }
}

/// `start`, its superinterfaces, then each superclass followed by its own
/// superinterfaces
fn field_search_order(classes: &ClassTable, start: ClassId) -> Ancestry {
    let chain = superclasses(classes, start);
    let mut order = Ancestry {
        loaded: Vec::new(),
        missing: chain.missing,
    };
    for class in chain.loaded {
        if !order.loaded.contains(&class) {
            order.loaded.push(class);
        }
        let interfaces = superinterfaces(classes, &[class]);
        for iface in interfaces.loaded {
            if !order.loaded.contains(&iface) {
                order.loaded.push(iface);
            }
        }
        if order.missing.is_none() {
            order.missing = interfaces.missing;
        }
    }
    order
}

fn class_name(classes: &ClassTable, class: ClassId) -> String {
    classes.name(class).unwrap_or("?").to_string()
}

fn no_such_field(classes: &ClassTable, class: ClassId, name: &str, descriptor: &str) -> VmError {
    ResolutionError::NoSuchField {
        class: class_name(classes, class),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
    .into()
}

fn no_such_method(classes: &ClassTable, class: ClassId, name: &str, descriptor: &str) -> VmError {
    ResolutionError::NoSuchMethod {
        class: class_name(classes, class),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    }
    .into()
}

/// Static/instance placement of a declared field
pub fn classify_field(
    classes: &ClassTable,
    owner: ClassId,
    field_index: usize,
) -> Option<ResolvedField> {
    let (storage, slot) = classes.classify_field(owner, field_index)?;
    let access = classes.descriptor(owner)?.fields.get(field_index)?.access;
    Some(ResolvedField {
        owner,
        field_index,
        storage,
        offset: slot.offset,
        base_type: slot.base_type,
        access,
    })
}

/// Native, abstract or bytecode classification of a declared method
pub fn classify_method(
    classes: &ClassTable,
    natives: &dyn NativeLocator,
    owner: ClassId,
    method_index: usize,
    find_hidden: bool,
) -> VmResult<ResolvedMethod> {
    let descriptor = classes
        .descriptor(owner)
        .ok_or(VmError::InvalidClass(owner.index()))?;
    let method = descriptor
        .method(method_index)
        .ok_or_else(|| no_such_method(classes, owner, "?", "?"))?;
    let signature = MethodSignature::parse(&method.descriptor).ok_or_else(|| {
        VerificationError::IllegalOperand {
            instruction: "method descriptor",
            detail: method.descriptor.clone(),
        }
    })?;

    let body = if method.access.is_native() {
        MethodBody::Native(natives.locate(
            &descriptor.name,
            &method.name,
            &method.descriptor,
            find_hidden,
        ))
    } else if method.access.is_abstract() {
        MethodBody::Abstract
    } else {
        let code = method
            .code_attribute_index()
            .ok_or_else(|| ResolutionError::MissingCode {
                class: descriptor.name.clone(),
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
            })?;
        MethodBody::Code(code)
    };

    Ok(ResolvedMethod {
        owner,
        method_index,
        is_static: method.access.is_static(),
        body,
        exceptions_attr: method.exceptions_attribute_index(),
        arg_words: signature.arg_words(),
        return_type: signature.return_type(),
        access: method.access,
    })
}
