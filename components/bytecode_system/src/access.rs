//! Access and property flags for classes, fields and methods

use std::fmt;
use std::ops::BitOr;

/// Access flag bitset as stored in a class file.
///
/// Some bits are overloaded by context: `0x0020` is `ACC_SUPER` on a class and
/// `ACC_SYNCHRONIZED` on a method.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    /// No flags set
    pub const NONE: AccessFlags = AccessFlags(0);
    /// Visible everywhere
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    /// Visible only inside the declaring class
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    /// Visible to subclasses and the package
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    /// Class-level member
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    /// Not overridable / not reassignable
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    /// Class flag: `invokespecial` uses superclass lookup
    pub const SUPER: AccessFlags = AccessFlags(0x0020);
    /// Method flag: invocation holds the receiver's monitor
    pub const SYNCHRONIZED: AccessFlags = AccessFlags(0x0020);
    /// Method implemented outside bytecode
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    /// Class is an interface
    pub const INTERFACE: AccessFlags = AccessFlags(0x0200);
    /// Class cannot be instantiated / method has no body
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);

    /// Raw bits
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether `ACC_PUBLIC` is set
    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    /// Whether `ACC_PRIVATE` is set
    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    /// Whether `ACC_PROTECTED` is set
    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    /// Whether `ACC_STATIC` is set
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// Whether `ACC_FINAL` is set
    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    /// Whether `ACC_SUPER` is set (class context)
    pub fn is_super(self) -> bool {
        self.contains(Self::SUPER)
    }

    /// Whether `ACC_SYNCHRONIZED` is set (method context)
    pub fn is_synchronized(self) -> bool {
        self.contains(Self::SYNCHRONIZED)
    }

    /// Whether `ACC_NATIVE` is set
    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    /// Whether `ACC_INTERFACE` is set
    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// Whether `ACC_ABSTRACT` is set
    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    /// Neither public, protected nor private
    pub fn is_package_private(self) -> bool {
        !self.is_public() && !self.is_protected() && !self.is_private()
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessFlags(0x{:04x})", self.0)
    }
}
