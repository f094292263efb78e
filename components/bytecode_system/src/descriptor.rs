//! Field and method descriptor parsing

use core_types::BaseType;

/// Value-type tag of a field descriptor, from its first character
///
/// Returns `None` for an empty or malformed descriptor.
pub fn field_base_type(descriptor: &str) -> Option<BaseType> {
    descriptor.chars().next().and_then(BaseType::from_descriptor_char)
}

/// Number of words a value of this descriptor occupies
pub fn field_words(descriptor: &str) -> usize {
    field_base_type(descriptor).map_or(1, BaseType::word_count)
}

/// Length in bytes of the single field type starting at the front of `text`
fn field_type_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while bytes.get(i) == Some(&b'[') {
        i += 1;
    }
    match bytes.get(i)? {
        b'L' => {
            let end = text[i..].find(';')?;
            Some(i + end + 1)
        }
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(i + 1),
        _ => None,
    }
}

/// Parsed method descriptor
///
/// # Examples
///
/// ```
/// use bytecode_system::MethodSignature;
/// use core_types::BaseType;
///
/// let sig = MethodSignature::parse("(IJ[Ljava/lang/String;)D").unwrap();
/// assert_eq!(sig.params, vec!["I", "J", "[Ljava/lang/String;"]);
/// assert_eq!(sig.arg_words(), 4);
/// assert_eq!(sig.return_type(), BaseType::Double);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Parameter field descriptors in declaration order
    pub params: Vec<String>,
    /// Return descriptor (`V` for void)
    pub ret: String,
}

impl MethodSignature {
    /// Parse `(params)ret`
    pub fn parse(descriptor: &str) -> Option<Self> {
        let rest = descriptor.strip_prefix('(')?;
        let close = rest.find(')')?;
        let (mut args, ret) = (&rest[..close], &rest[close + 1..]);

        let mut params = Vec::new();
        while !args.is_empty() {
            let len = field_type_len(args)?;
            params.push(args[..len].to_string());
            args = &args[len..];
        }

        if ret != "V" && field_type_len(ret) != Some(ret.len()) {
            return None;
        }
        Some(Self {
            params,
            ret: ret.to_string(),
        })
    }

    /// Words the arguments occupy, excluding any receiver
    pub fn arg_words(&self) -> usize {
        self.params.iter().map(|p| field_words(p)).sum()
    }

    /// Value-type tag of the return value
    pub fn return_type(&self) -> BaseType {
        field_base_type(&self.ret).unwrap_or(BaseType::Void)
    }
}

/// Number of leading `[` in an array type name or descriptor
pub fn array_dimensions(name: &str) -> usize {
    name.bytes().take_while(|&b| b == b'[').count()
}

/// Component descriptor of an array class name (`[[I` -> `[I`)
pub fn array_component(name: &str) -> Option<&str> {
    name.strip_prefix('[')
}

/// Class name a reference field descriptor denotes
///
/// `Ljava/lang/String;` maps to `java/lang/String`; array descriptors are
/// already class names and map to themselves. Primitive descriptors yield
/// `None`.
pub fn descriptor_class_name(descriptor: &str) -> Option<&str> {
    if descriptor.starts_with('[') {
        Some(descriptor)
    } else {
        descriptor.strip_prefix('L')?.strip_suffix(';')
    }
}
