//! Reference-count hooks.
//!
//! The linker reports every cross-class edge it creates or drops; class
//! objects add class-to-object edges. Unload consults the counts.

use std::collections::HashMap;

use core_types::ObjectRef;

use crate::class_table::ClassId;

/// Endpoint of a tracked reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefNode {
    /// A class-table entry
    Class(ClassId),
    /// An object instance
    Object(ObjectRef),
}

/// Receiver of reference edges
pub trait ReferenceTracker {
    /// Record one more reference `from -> to`
    fn mark_reference(&mut self, from: RefNode, to: RefNode);

    /// Drop one reference `from -> to`
    fn unmark_reference(&mut self, from: RefNode, to: RefNode);
}

/// Multiset of reference edges
#[derive(Debug, Clone, Default)]
pub struct RefCounts {
    edges: HashMap<(RefNode, RefNode), usize>,
}

impl RefCounts {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// References recorded from `from` to `to`
    pub fn count(&self, from: RefNode, to: RefNode) -> usize {
        self.edges.get(&(from, to)).copied().unwrap_or(0)
    }

    /// References to `to` from any other node
    pub fn incoming(&self, to: RefNode) -> usize {
        self.edges
            .iter()
            .filter(|((from, target), _)| *target == to && *from != to)
            .map(|(_, n)| *n)
            .sum()
    }

    /// References from `from` to any node
    pub fn outgoing(&self, from: RefNode) -> usize {
        self.edges
            .iter()
            .filter(|((source, _), _)| *source == from)
            .map(|(_, n)| *n)
            .sum()
    }

    /// Total recorded references
    pub fn total(&self) -> usize {
        self.edges.values().sum()
    }
}

impl ReferenceTracker for RefCounts {
    fn mark_reference(&mut self, from: RefNode, to: RefNode) {
        *self.edges.entry((from, to)).or_insert(0) += 1;
    }

    fn unmark_reference(&mut self, from: RefNode, to: RefNode) {
        if let Some(n) = self.edges.get_mut(&(from, to)) {
            *n -= 1;
            if *n == 0 {
                self.edges.remove(&(from, to));
            }
        }
    }
}
