//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a virtual machine instance.
///
/// Missing keys take their default when deserialized, so a partial JSON
/// document is a valid configuration.
///
/// # Examples
///
/// ```
/// use core_types::VmConfig;
///
/// let config = VmConfig::from_json(r#"{ "time_slice": 500 }"#).unwrap();
/// assert_eq!(config.time_slice, Some(500));
/// assert_eq!(config.max_frames, VmConfig::default().max_frames);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum call depth per thread
    pub max_frames: usize,
    /// Maximum words of per-thread stack storage
    pub max_stack_words: usize,
    /// Byte budget of the allocation service
    pub heap_limit: usize,
    /// Instructions per scheduling slice; `None` disables the quota
    pub time_slice: Option<u32>,
    /// Whether the linker may bind hidden bootstrap natives
    pub link_hidden_natives: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_frames: 1024,
            max_stack_words: 1 << 20,
            heap_limit: 64 * 1024 * 1024,
            time_slice: None,
            link_hidden_natives: false,
        }
    }
}

impl VmConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize this configuration as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
