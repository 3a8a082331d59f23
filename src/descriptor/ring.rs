use std::sync::atomic::{AtomicU32, Ordering};

use crate::{PoolError, Result};

/// Per-frame transient slot allocator. Offsets only grow until [`TransientRing::reset`];
/// individual allocations are never freed.
pub struct TransientRing {
    capacity: u32,
    offset: AtomicU32,
}

impl TransientRing {
    pub const fn new(capacity: u32) -> Self {
        Self {
            capacity,
            offset: AtomicU32::new(0),
        }
    }
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
    pub fn used(&self) -> u32 {
        self.offset.load(Ordering::Acquire)
    }

    /// Reserves `count` slots and returns the offset of the first one.
    /// A request that does not fit leaves the ring untouched.
    pub fn allocate(&self, count: u32) -> Result<u32> {
        let capacity = self.capacity;
        self.offset
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(count)
                    .filter(|end| *end <= capacity)
            })
            .map_err(|used| PoolError::Overflow {
                requested: count,
                used,
                capacity,
            })
    }

    /// Invalidates every allocation made since the last reset.
    ///
    /// The caller must know that the GPU no longer reads anything allocated from this
    /// ring. Taking `&mut self` rules out a concurrent `allocate`.
    pub fn reset(&mut self) {
        *self.offset.get_mut() = 0;
    }
}
