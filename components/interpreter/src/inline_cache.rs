//! Inline caching for virtual and interface dispatch
//!
//! Each call site remembers which method the receiver's run-time class
//! selected, moving through mono/poly/megamorphic states as more receiver
//! classes are seen.

use arrayvec::ArrayVec;
use memory_manager::{ClassId, ResolvedMethod};

/// Receiver classes a polymorphic site remembers
pub const POLYMORPHIC_LIMIT: usize = 4;

/// Dispatch cache of one call site
#[derive(Debug, Clone, PartialEq)]
pub enum InlineCache {
    /// Nothing cached yet
    Uninitialized,
    /// One receiver class seen
    Monomorphic {
        /// Receiver class
        receiver: ClassId,
        /// Method it selected
        target: ResolvedMethod,
    },
    /// Up to [`POLYMORPHIC_LIMIT`] receiver classes seen
    Polymorphic {
        /// `(receiver, target)` pairs
        entries: ArrayVec<(ClassId, ResolvedMethod), POLYMORPHIC_LIMIT>,
    },
    /// Too many receiver classes; every call looks up
    Megamorphic,
}

impl InlineCache {
    /// Create an uninitialized cache
    pub fn new() -> Self {
        InlineCache::Uninitialized
    }

    /// Cached target for `receiver`
    pub fn lookup(&self, receiver: ClassId) -> Option<ResolvedMethod> {
        match self {
            InlineCache::Monomorphic {
                receiver: cached,
                target,
            } if *cached == receiver => Some(*target),
            InlineCache::Polymorphic { entries } => entries
                .iter()
                .find(|(class, _)| *class == receiver)
                .map(|(_, target)| *target),
            _ => None,
        }
    }

    /// Record the target selected for `receiver`
    ///
    /// - Uninitialized → Monomorphic
    /// - Monomorphic → Polymorphic (new receiver)
    /// - Polymorphic → Megamorphic (past the limit)
    pub fn update(&mut self, receiver: ClassId, target: ResolvedMethod) {
        match self {
            InlineCache::Uninitialized => {
                *self = InlineCache::Monomorphic { receiver, target };
            }
            InlineCache::Monomorphic {
                receiver: cached,
                target: cached_target,
            } => {
                if *cached == receiver {
                    *cached_target = target;
                } else {
                    let mut entries = ArrayVec::new();
                    entries.push((*cached, *cached_target));
                    entries.push((receiver, target));
                    *self = InlineCache::Polymorphic { entries };
                }
            }
            InlineCache::Polymorphic { entries } => {
                if let Some(entry) = entries.iter_mut().find(|(class, _)| *class == receiver) {
                    entry.1 = target;
                } else if entries.try_push((receiver, target)).is_err() {
                    *self = InlineCache::Megamorphic;
                }
            }
            InlineCache::Megamorphic => {}
        }
    }

    /// Whether any entry targets or was selected by `class`
    pub fn mentions(&self, class: ClassId) -> bool {
        match self {
            InlineCache::Monomorphic { receiver, target } => {
                *receiver == class || target.owner == class
            }
            InlineCache::Polymorphic { entries } => entries
                .iter()
                .any(|(receiver, target)| *receiver == class || target.owner == class),
            _ => false,
        }
    }
}

impl Default for InlineCache {
    fn default() -> Self {
        Self::new()
    }
}
