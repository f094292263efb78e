//! Per-class constant pool
//!
//! Indices are 1-based as in the class-file format; slot 0 and the slot after
//! every `long`/`double` entry hold [`ConstantEntry::Unusable`].

/// A single constant-pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantEntry {
    /// Slot 0 and the upper half of an eight-byte constant
    Unusable,
    /// Modified-UTF-8 text, held decoded
    Utf8(String),
    /// `int` literal
    Integer(i32),
    /// `float` literal
    Float(f32),
    /// `long` literal (occupies two slots)
    Long(i64),
    /// `double` literal (occupies two slots)
    Double(f64),
    /// Symbolic class reference
    Class {
        /// Index of the class name (`Utf8`)
        name_index: u16,
    },
    /// String literal
    String {
        /// Index of the text (`Utf8`)
        string_index: u16,
    },
    /// Symbolic field reference
    Fieldref {
        /// Index of the owning `Class`
        class_index: u16,
        /// Index of the `NameAndType`
        name_and_type_index: u16,
    },
    /// Symbolic method reference on a class
    Methodref {
        /// Index of the owning `Class`
        class_index: u16,
        /// Index of the `NameAndType`
        name_and_type_index: u16,
    },
    /// Symbolic method reference on an interface
    InterfaceMethodref {
        /// Index of the owning `Class`
        class_index: u16,
        /// Index of the `NameAndType`
        name_and_type_index: u16,
    },
    /// Member name and descriptor pair
    NameAndType {
        /// Index of the name (`Utf8`)
        name_index: u16,
        /// Index of the descriptor (`Utf8`)
        descriptor_index: u16,
    },
}

impl ConstantEntry {
    /// Whether this entry is a symbolic reference the linker must resolve
    pub fn is_symbolic_reference(&self) -> bool {
        matches!(
            self,
            ConstantEntry::Class { .. }
                | ConstantEntry::Fieldref { .. }
                | ConstantEntry::Methodref { .. }
                | ConstantEntry::InterfaceMethodref { .. }
        )
    }

    /// Short tag name used in diagnostics
    pub fn tag_name(&self) -> &'static str {
        match self {
            ConstantEntry::Unusable => "Unusable",
            ConstantEntry::Utf8(_) => "Utf8",
            ConstantEntry::Integer(_) => "Integer",
            ConstantEntry::Float(_) => "Float",
            ConstantEntry::Long(_) => "Long",
            ConstantEntry::Double(_) => "Double",
            ConstantEntry::Class { .. } => "Class",
            ConstantEntry::String { .. } => "String",
            ConstantEntry::Fieldref { .. } => "Fieldref",
            ConstantEntry::Methodref { .. } => "Methodref",
            ConstantEntry::InterfaceMethodref { .. } => "InterfaceMethodref",
            ConstantEntry::NameAndType { .. } => "NameAndType",
        }
    }
}

/// Decoded view of a Fieldref/Methodref/InterfaceMethodref entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Constant-pool index of the owning `Class` entry
    pub class_index: u16,
    /// Name of the owning class
    pub class_name: &'a str,
    /// Member name
    pub name: &'a str,
    /// Member descriptor
    pub descriptor: &'a str,
}

/// The constant pool of one class
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<ConstantEntry>,
}

impl ConstantPool {
    /// Create a pool holding only the unusable slot 0
    pub fn new() -> Self {
        Self {
            entries: vec![ConstantEntry::Unusable],
        }
    }

    /// Append an entry and return its index
    ///
    /// Eight-byte constants reserve the following slot as well.
    pub fn push(&mut self, entry: ConstantEntry) -> u16 {
        let index = self.entries.len() as u16;
        let wide = matches!(entry, ConstantEntry::Long(_) | ConstantEntry::Double(_));
        self.entries.push(entry);
        if wide {
            self.entries.push(ConstantEntry::Unusable);
        }
        index
    }

    /// Number of slots including slot 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no usable entries
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Entry at `index`
    pub fn get(&self, index: u16) -> Option<&ConstantEntry> {
        self.entries.get(index as usize)
    }

    /// Iterate `(index, entry)` pairs, skipping slot 0
    pub fn iter(&self) -> impl Iterator<Item = (u16, &ConstantEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, e)| (i as u16, e))
    }

    /// Find the index of an existing entry equal to `entry`
    pub fn position(&self, entry: &ConstantEntry) -> Option<u16> {
        self.entries
            .iter()
            .skip(1)
            .position(|e| e == entry)
            .map(|i| (i + 1) as u16)
    }

    /// Text of a `Utf8` entry
    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantEntry::Utf8(text) => Some(text),
            _ => None,
        }
    }

    /// Name referenced by a `Class` entry
    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantEntry::Class { name_index } => self.utf8(*name_index),
            _ => None,
        }
    }

    /// Text referenced by a `String` entry
    pub fn string(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            ConstantEntry::String { string_index } => self.utf8(*string_index),
            _ => None,
        }
    }

    /// Name and descriptor of a `NameAndType` entry
    pub fn name_and_type(&self, index: u16) -> Option<(&str, &str)> {
        match self.get(index)? {
            ConstantEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Some((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => None,
        }
    }

    /// Decode any of the three member-reference kinds
    pub fn member_ref(&self, index: u16) -> Option<MemberRef<'_>> {
        let (class_index, nat_index) = match self.get(index)? {
            ConstantEntry::Fieldref {
                class_index,
                name_and_type_index,
            }
            | ConstantEntry::Methodref {
                class_index,
                name_and_type_index,
            }
            | ConstantEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index),
            _ => return None,
        };
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Some(MemberRef {
            class_index,
            class_name: self.class_name(class_index)?,
            name,
            descriptor,
        })
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}
