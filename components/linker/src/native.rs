//! Native-method locator interface.

use core_types::NativeOrdinal;

/// Maps a native method declaration to the ordinal of its implementation
pub trait NativeLocator {
    /// Ordinal for `class.name descriptor`, or `None` when nothing is
    /// registered
    ///
    /// Hidden bootstrap natives are only reported when `include_hidden` is
    /// set.
    fn locate(
        &self,
        class: &str,
        name: &str,
        descriptor: &str,
        include_hidden: bool,
    ) -> Option<NativeOrdinal>;
}

/// Locator with no natives at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNatives;

impl NativeLocator for NoNatives {
    fn locate(&self, _: &str, _: &str, _: &str, _: bool) -> Option<NativeOrdinal> {
        None
    }
}
