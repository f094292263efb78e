//! Class status bitset.

use std::fmt;

/// Status flags of a class-table entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassStatus(u8);

impl ClassStatus {
    /// Entry holds a live class
    pub const IN_USE: ClassStatus = ClassStatus(0x01);
    /// Synthesized array type
    pub const ARRAY: ClassStatus = ClassStatus(0x02);
    /// Primitive pseudo-class
    pub const PRIMITIVE: ClassStatus = ClassStatus(0x04);
    /// Every constant-pool reference resolved
    pub const LINKED: ClassStatus = ClassStatus(0x08);
    /// Collection requested
    pub const GC_PENDING: ClassStatus = ClassStatus(0x10);
    /// `<clinit>` has been started
    pub const INITIALIZED: ClassStatus = ClassStatus(0x20);

    /// No flags
    pub fn empty() -> Self {
        ClassStatus(0)
    }

    /// Whether every flag in `other` is set
    pub fn contains(self, other: ClassStatus) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`
    pub fn insert(&mut self, other: ClassStatus) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`
    pub fn remove(&mut self, other: ClassStatus) {
        self.0 &= !other.0;
    }

    /// Whether the entry holds a live class
    pub fn is_in_use(self) -> bool {
        self.contains(Self::IN_USE)
    }

    /// Whether the entry is an array type
    pub fn is_array(self) -> bool {
        self.contains(Self::ARRAY)
    }

    /// Whether the entry is a primitive pseudo-class
    pub fn is_primitive(self) -> bool {
        self.contains(Self::PRIMITIVE)
    }

    /// Whether the entry is fully linked
    pub fn is_linked(self) -> bool {
        self.contains(Self::LINKED)
    }

    /// Whether collection was requested
    pub fn is_gc_pending(self) -> bool {
        self.contains(Self::GC_PENDING)
    }

    /// Whether static initialization has started
    pub fn is_initialized(self) -> bool {
        self.contains(Self::INITIALIZED)
    }
}

impl std::ops::BitOr for ClassStatus {
    type Output = ClassStatus;

    fn bitor(self, rhs: ClassStatus) -> ClassStatus {
        ClassStatus(self.0 | rhs.0)
    }
}

impl fmt::Debug for ClassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ClassStatus, &str); 6] = [
            (ClassStatus::IN_USE, "IN_USE"),
            (ClassStatus::ARRAY, "ARRAY"),
            (ClassStatus::PRIMITIVE, "PRIMITIVE"),
            (ClassStatus::LINKED, "LINKED"),
            (ClassStatus::GC_PENDING, "GC_PENDING"),
            (ClassStatus::INITIALIZED, "INITIALIZED"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "ClassStatus({})", set.join(" | "))
    }
}
