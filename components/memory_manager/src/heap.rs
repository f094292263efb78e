//! Allocation service.
//!
//! Object and array storage is requested through the [`Allocator`] trait so
//! the embedder can substitute its own strategy. [`Heap`] is the default
//! implementation: byte accounting against a fixed limit.

use std::collections::HashMap;

use thiserror::Error;

/// Opaque handle for one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocHandle(u64);

/// Allocation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The request does not fit in the remaining budget
    #[error("out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested
        requested: usize,
        /// Bytes left in the budget
        available: usize,
    },
}

/// External allocation service
pub trait Allocator: std::fmt::Debug {
    /// Reserve `size` bytes
    fn allocate(&mut self, size: usize, zero_fill: bool) -> Result<AllocHandle, AllocError>;

    /// Return a reservation
    fn release(&mut self, handle: AllocHandle);

    /// Bytes currently reserved
    fn bytes_in_use(&self) -> usize;
}

/// Allocation statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Successful allocations
    pub allocations: usize,
    /// Releases
    pub releases: usize,
    /// Refused allocations
    pub failures: usize,
    /// Highest `bytes_in_use` observed
    pub peak_bytes: usize,
}

/// Budgeted heap accounting
///
/// # Example
///
/// ```
/// use memory_manager::{Allocator, Heap};
///
/// let mut heap = Heap::with_limit(64);
/// let a = heap.allocate(48, true).unwrap();
/// assert!(heap.allocate(32, true).is_err());
/// heap.release(a);
/// assert!(heap.allocate(32, true).is_ok());
/// ```
#[derive(Debug)]
pub struct Heap {
    limit: usize,
    in_use: usize,
    next: u64,
    live: HashMap<AllocHandle, usize>,
    stats: HeapStats,
}

impl Heap {
    /// Creates a heap with the given byte budget.
    pub fn with_limit(limit: usize) -> Self {
        Heap {
            limit,
            in_use: 0,
            next: 1,
            live: HashMap::new(),
            stats: HeapStats::default(),
        }
    }

    /// Byte budget
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Statistics so far
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Number of live allocations
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }
}

impl Allocator for Heap {
    fn allocate(&mut self, size: usize, _zero_fill: bool) -> Result<AllocHandle, AllocError> {
        let available = self.limit - self.in_use;
        if size > available {
            self.stats.failures += 1;
            return Err(AllocError::OutOfMemory {
                requested: size,
                available,
            });
        }
        let handle = AllocHandle(self.next);
        self.next += 1;
        self.in_use += size;
        self.live.insert(handle, size);
        self.stats.allocations += 1;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.in_use);
        Ok(handle)
    }

    fn release(&mut self, handle: AllocHandle) {
        if let Some(size) = self.live.remove(&handle) {
            self.in_use -= size;
            self.stats.releases += 1;
        }
    }

    fn bytes_in_use(&self) -> usize {
        self.in_use
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::with_limit(64 * 1024 * 1024)
    }
}
