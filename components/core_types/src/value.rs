//! Machine words, object references and value-type tags.
//!
//! The interpreter carries no runtime type tag for primitives: every value on
//! the operand stack, in a local slot or in field storage is one or two
//! [`Word`]s. 64-bit values (`long`/`double`) always occupy two words, high
//! half first.

use std::fmt;

/// A single 32-bit stack/local/field slot.
pub type Word = u32;

/// Split a `long` into its `[high, low]` word pair.
///
/// # Examples
///
/// ```
/// use core_types::{join_long, split_long};
///
/// let [high, low] = split_long(-2);
/// assert_eq!(high, 0xFFFF_FFFF);
/// assert_eq!(low, 0xFFFF_FFFE);
/// assert_eq!(join_long(high, low), -2);
/// ```
pub fn split_long(value: i64) -> [Word; 2] {
    let bits = value as u64;
    [(bits >> 32) as Word, bits as Word]
}

/// Combine a `[high, low]` word pair back into a `long`.
pub fn join_long(high: Word, low: Word) -> i64 {
    (((high as u64) << 32) | low as u64) as i64
}

/// Split a `double` into its `[high, low]` word pair.
pub fn split_double(value: f64) -> [Word; 2] {
    split_long(value.to_bits() as i64)
}

/// Combine a `[high, low]` word pair back into a `double`.
pub fn join_double(high: Word, low: Word) -> f64 {
    f64::from_bits(join_long(high, low) as u64)
}

/// Reinterpret a `float` as a word.
pub fn float_to_word(value: f32) -> Word {
    value.to_bits()
}

/// Reinterpret a word as a `float`.
pub fn word_to_float(word: Word) -> f32 {
    f32::from_bits(word)
}

/// Reference to an object instance.
///
/// Word value `0` is the null reference; any other value is the object-table
/// index plus one, so a reference round-trips through a stack word unchanged.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectRef(Word);

impl ObjectRef {
    /// The null reference
    pub const NULL: ObjectRef = ObjectRef(0);

    /// Build a reference for an object-table index
    pub fn from_index(index: usize) -> Self {
        ObjectRef(index as Word + 1)
    }

    /// Reinterpret a stack word as a reference
    pub fn from_word(word: Word) -> Self {
        ObjectRef(word)
    }

    /// The stack word for this reference
    pub fn to_word(self) -> Word {
        self.0
    }

    /// Whether this is the null reference
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Object-table index, or `None` for null
    pub fn index(self) -> Option<usize> {
        if self.is_null() {
            None
        } else {
            Some((self.0 - 1) as usize)
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(index) => write!(f, "ObjectRef(#{})", index),
            None => write!(f, "ObjectRef(null)"),
        }
    }
}

/// Identity of a VM-level thread, used as monitor owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ThreadId(pub u32);

/// Ordinal of a natively implemented method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeOrdinal(pub u32);

/// Base value-type tag derived from a field or method descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L...;`
    Reference,
    /// `[...`
    Array,
    /// `V`, only valid as a return type
    Void,
}

impl BaseType {
    /// Parse the tag from the first character of a descriptor
    ///
    /// # Examples
    ///
    /// ```
    /// use core_types::BaseType;
    ///
    /// assert_eq!(BaseType::from_descriptor_char('J'), Some(BaseType::Long));
    /// assert_eq!(BaseType::from_descriptor_char('['), Some(BaseType::Array));
    /// assert_eq!(BaseType::from_descriptor_char('Q'), None);
    /// ```
    pub fn from_descriptor_char(c: char) -> Option<Self> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            'L' => BaseType::Reference,
            '[' => BaseType::Array,
            'V' => BaseType::Void,
            _ => return None,
        })
    }

    /// Descriptor character for this tag
    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
            BaseType::Reference => 'L',
            BaseType::Array => '[',
            BaseType::Void => 'V',
        }
    }

    /// Element type for a `newarray` type code (4..=11)
    pub fn from_array_type_code(code: u8) -> Option<Self> {
        Some(match code {
            4 => BaseType::Boolean,
            5 => BaseType::Char,
            6 => BaseType::Float,
            7 => BaseType::Double,
            8 => BaseType::Byte,
            9 => BaseType::Short,
            10 => BaseType::Int,
            11 => BaseType::Long,
            _ => return None,
        })
    }

    /// Number of words a value of this type occupies
    pub fn word_count(self) -> usize {
        match self {
            BaseType::Long | BaseType::Double => 2,
            BaseType::Void => 0,
            _ => 1,
        }
    }

    /// Whether values of this type are primitives (not references)
    pub fn is_primitive(self) -> bool {
        !matches!(self, BaseType::Reference | BaseType::Array | BaseType::Void)
    }

    /// Name of the primitive pseudo-class for this type, if any
    pub fn primitive_name(self) -> Option<&'static str> {
        Some(match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
            BaseType::Void => "void",
            BaseType::Reference | BaseType::Array => return None,
        })
    }
}
