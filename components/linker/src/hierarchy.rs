//! Hierarchy queries over the class table.
//!
//! Every function here is pure. A dead or unknown class index yields `false`
//! or `None`; callers turn negative answers into language-level errors.

use bytecode_system::{package_of, AccessFlags, OBJECT_CLASS};
use memory_manager::{ArrayComponent, ClassId, ClassTable, ARRAY_INTERFACES};

/// Field or method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A field
    Field,
    /// A method
    Method,
}

/// Declaring class and declared-member index of a found member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef {
    /// Declaring class
    pub owner: ClassId,
    /// Index into the owner's fields or methods
    pub index: usize,
}

/// Loaded ancestors in search order, plus the first ancestor that is named
/// but not loaded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ancestry {
    /// Loaded classes in search order
    pub loaded: Vec<ClassId>,
    /// First ancestor name with no class-table entry
    pub missing: Option<String>,
}

impl Ancestry {
    fn note_missing(&mut self, name: &str) {
        if self.missing.is_none() {
            self.missing = Some(name.to_string());
        }
    }
}

/// `start` followed by its superclasses, root last
///
/// Array types have the root object type as their only superclass.
pub fn superclasses(classes: &ClassTable, start: ClassId) -> Ancestry {
    let mut walk = Ancestry::default();
    if !classes.is_in_use(start) {
        return walk;
    }
    let mut current = start;
    walk.loaded.push(current);
    while let Some(name) = classes.super_name(current) {
        match classes.find(name) {
            Some(next) if !walk.loaded.contains(&next) => {
                walk.loaded.push(next);
                current = next;
            }
            Some(_) => break,
            None => {
                walk.note_missing(name);
                break;
            }
        }
    }
    walk
}

/// Transitive closure of the interfaces declared by `roots`, depth first in
/// declaration order, without duplicates and without the roots themselves
pub fn superinterfaces(classes: &ClassTable, roots: &[ClassId]) -> Ancestry {
    let mut walk = Ancestry::default();
    for &root in roots {
        collect_interfaces(classes, root, roots, &mut walk);
    }
    walk
}

fn collect_interfaces(
    classes: &ClassTable,
    class: ClassId,
    roots: &[ClassId],
    walk: &mut Ancestry,
) {
    let Some(descriptor) = classes.descriptor(class) else {
        return;
    };
    for name in &descriptor.interfaces {
        match classes.find(name) {
            Some(iface) if roots.contains(&iface) || walk.loaded.contains(&iface) => {}
            Some(iface) => {
                walk.loaded.push(iface);
                collect_interfaces(classes, iface, roots, walk);
            }
            None => walk.note_missing(name),
        }
    }
}

fn is_interface(classes: &ClassTable, id: ClassId) -> bool {
    classes.get(id).is_some_and(|e| e.is_interface())
}

fn is_array(classes: &ClassTable, id: ClassId) -> bool {
    classes.status(id).is_array()
}

/// `a` equals `b` or `b` is on `a`'s superclass chain
pub fn is_a(classes: &ClassTable, a: ClassId, b: ClassId) -> bool {
    if !classes.is_in_use(a) || !classes.is_in_use(b) {
        return false;
    }
    superclasses(classes, a).loaded.contains(&b)
}

/// `b` is an interface that `a` implements
///
/// Interfaces declared by `a`'s superclasses count as well. Arrays implement
/// exactly the fixed array interface set.
pub fn implements_interface(classes: &ClassTable, a: ClassId, b: ClassId) -> bool {
    if !classes.is_in_use(a) || !is_interface(classes, b) {
        return false;
    }
    if is_array(classes, a) {
        return classes
            .name(b)
            .is_some_and(|name| ARRAY_INTERFACES.contains(&name));
    }
    let chain = superclasses(classes, a).loaded;
    superinterfaces(classes, &chain).loaded.contains(&b)
}

/// `a` is an interface in `b`'s declared-interface closure, and `a != b`
pub fn is_superinterface_of(classes: &ClassTable, a: ClassId, b: ClassId) -> bool {
    if a == b || !is_interface(classes, a) || !classes.is_in_use(b) {
        return false;
    }
    superinterfaces(classes, &[b]).loaded.contains(&a)
}

/// Both classes live in the same package
pub fn same_package(classes: &ClassTable, a: ClassId, b: ClassId) -> bool {
    if a == b {
        return classes.is_in_use(a);
    }
    match (classes.name(a), classes.name(b)) {
        (Some(na), Some(nb)) => package_of(na) == package_of(nb),
        _ => false,
    }
}

/// Class `a` may be referenced from class `b`
pub fn is_accessible_to(classes: &ClassTable, a: ClassId, b: ClassId) -> bool {
    if a == b {
        return classes.is_in_use(a);
    }
    match classes.get(a) {
        Some(entry) if entry.descriptor.access.is_public() => classes.is_in_use(b),
        Some(_) => same_package(classes, a, b),
        None => false,
    }
}

/// A member of `owner` with `access` may be used from `requester`
///
/// Private members are never accessible here; the same-class case is the
/// caller's check.
pub fn member_is_accessible_to(
    classes: &ClassTable,
    owner: ClassId,
    access: AccessFlags,
    requester: ClassId,
) -> bool {
    if !classes.is_in_use(owner) || !classes.is_in_use(requester) {
        return false;
    }
    if access.is_public() {
        true
    } else if access.is_private() {
        false
    } else if access.is_protected() {
        is_a(classes, requester, owner) || same_package(classes, owner, requester)
    } else {
        same_package(classes, owner, requester)
    }
}

fn declares(
    classes: &ClassTable,
    class: ClassId,
    name: &str,
    descriptor: &str,
    kind: MemberKind,
) -> Option<MemberRef> {
    let desc = classes.descriptor(class)?;
    let index = match kind {
        MemberKind::Field => desc.find_field(name, descriptor),
        MemberKind::Method => desc.find_method(name, descriptor),
    }?;
    Some(MemberRef {
        owner: class,
        index,
    })
}

/// Access flags of a found member
pub fn member_access(
    classes: &ClassTable,
    member: MemberRef,
    kind: MemberKind,
) -> Option<AccessFlags> {
    let desc = classes.descriptor(member.owner)?;
    match kind {
        MemberKind::Field => desc.fields.get(member.index).map(|f| f.access),
        MemberKind::Method => desc.methods.get(member.index).map(|m| m.access),
    }
}

/// First declaration of `name`/`descriptor` along `order`
pub fn first_declaring(
    table: &ClassTable,
    order: &[ClassId],
    name: &str,
    descriptor: &str,
    kind: MemberKind,
) -> Option<MemberRef> {
    order
        .iter()
        .find_map(|&class| declares(table, class, name, descriptor, kind))
}

/// Find the class declaring a member, starting at `start`
///
/// Walks `start` and its superclasses; method lookups that miss there also
/// search the declared interfaces of that chain and their superinterfaces.
/// With a `requester`, an inaccessible result is reported as `None`.
///
/// # Examples
///
/// ```
/// use bytecode_system::{AccessFlags, ClassBuilder, CodeBuilder, Opcode, OBJECT_CLASS};
/// use linker::{class_has_member, MemberKind};
/// use memory_manager::ClassTable;
///
/// let mut table = ClassTable::new();
/// table.insert(ClassBuilder::new(OBJECT_CLASS).without_super().build()).unwrap();
/// let mut base = ClassBuilder::new("Base");
/// let mut code = CodeBuilder::new(0, 1);
/// code.op(Opcode::Return);
/// base.method(AccessFlags::PUBLIC, "m", "()V", code.build());
/// let base = table.insert(base.build()).unwrap();
/// let leaf = table.insert(ClassBuilder::new("Leaf").extends("Base").build()).unwrap();
///
/// let found = class_has_member(&table, leaf, "m", "()V", MemberKind::Method, None).unwrap();
/// assert_eq!(found.owner, base);
/// ```
pub fn class_has_member(
    classes: &ClassTable,
    start: ClassId,
    name: &str,
    descriptor: &str,
    kind: MemberKind,
    requester: Option<ClassId>,
) -> Option<MemberRef> {
    let chain = superclasses(classes, start).loaded;
    let mut found = first_declaring(classes, &chain, name, descriptor, kind);
    if found.is_none() && kind == MemberKind::Method {
        let interfaces = superinterfaces(classes, &chain).loaded;
        found = first_declaring(classes, &interfaces, name, descriptor, kind);
    }
    let member = found?;
    match requester {
        Some(requester) if requester != member.owner => {
            let access = member_access(classes, member, kind)?;
            member_is_accessible_to(classes, member.owner, access, requester).then_some(member)
        }
        _ => Some(member),
    }
}

/// A value of class `source` may be stored where `target` is expected
///
/// Covers primitive array identity, reference array covariance, the array
/// interface set and plain class/interface subtyping.
pub fn is_assignable(classes: &ClassTable, source: ClassId, target: ClassId) -> bool {
    if source == target {
        return classes.is_in_use(source);
    }
    if !classes.is_in_use(source) || !classes.is_in_use(target) {
        return false;
    }
    if is_interface(classes, target) {
        return implements_interface(classes, source, target);
    }
    match (classes.array_info(source), classes.array_info(target)) {
        (Some(from), Some(to)) => match (from.component, to.component) {
            (ArrayComponent::Primitive(a), ArrayComponent::Primitive(b)) => a == b,
            (ArrayComponent::Class(a), ArrayComponent::Class(b)) => is_assignable(classes, a, b),
            _ => false,
        },
        (Some(_), None) => classes.name(target) == Some(OBJECT_CLASS),
        (None, Some(_)) => false,
        (None, None) => is_a(classes, source, target),
    }
}
