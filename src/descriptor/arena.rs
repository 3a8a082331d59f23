use std::{collections::VecDeque, sync::Mutex};

use super::HeapClass;
use crate::{PoolError, Result};

/// Fixed-capacity slot arena with a FIFO free list.
///
/// Every index is in exactly one of three states: allocated, on the free list, or
/// at/after the cursor (never handed out). Mutation is serialized by one mutex.
pub struct StaticSlotArena {
    class: HeapClass,
    capacity: u32,
    state: Mutex<ArenaState>,
}

struct ArenaState {
    allocated: Vec<u64>,
    free_list: VecDeque<u32>,
    cursor: u32,
    allocated_count: u32,
}

impl ArenaState {
    fn is_allocated(&self, index: u32) -> bool {
        self.allocated[(index / 64) as usize] & (1 << (index % 64)) != 0
    }
    fn set(&mut self, index: u32) {
        self.allocated[(index / 64) as usize] |= 1 << (index % 64);
        self.allocated_count += 1;
    }
    fn clear(&mut self, index: u32) {
        self.allocated[(index / 64) as usize] &= !(1 << (index % 64));
        self.allocated_count -= 1;
    }
}

impl StaticSlotArena {
    pub fn new(class: HeapClass, capacity: u32) -> Self {
        Self {
            class,
            capacity,
            state: Mutex::new(ArenaState {
                allocated: vec![0; capacity.div_ceil(64) as usize],
                free_list: VecDeque::new(),
                cursor: 0,
                allocated_count: 0,
            }),
        }
    }
    pub fn class(&self) -> HeapClass {
        self.class
    }
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
    pub fn allocated_count(&self) -> u32 {
        self.state.lock().unwrap().allocated_count
    }
    pub fn is_allocated(&self, index: u32) -> bool {
        if index >= self.capacity {
            return false;
        }
        self.state.lock().unwrap().is_allocated(index)
    }

    /// Allocates one slot, preferring recently freed slots over fresh ones.
    pub fn allocate(&self) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        let index = if let Some(index) = state.free_list.pop_front() {
            index
        } else if state.cursor < self.capacity {
            let index = state.cursor;
            state.cursor += 1;
            index
        } else {
            return Err(PoolError::Exhausted {
                class: self.class,
                requested: 1,
            });
        };
        debug_assert!(!state.is_allocated(index));
        state.set(index);
        Ok(index)
    }

    /// Allocates the first window of `count` consecutive free slots.
    ///
    /// Free slots that sit next to each other are found by scanning the allocated
    /// bitset, so ranges released separately are reusable as one window.
    pub fn allocate_range(&self, count: u32) -> Result<u32> {
        if count == 0 {
            return Err(PoolError::Configuration(
                "descriptor range allocation with zero slots".into(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        let mut run_start = 0;
        let mut run_len = 0;
        let mut found = None;
        for index in 0..self.capacity {
            // Everything past the cursor is unallocated, so the window is decidable early.
            if index >= state.cursor && self.capacity - run_start >= count {
                found = Some(run_start);
                break;
            }
            if state.is_allocated(index) {
                run_start = index + 1;
                run_len = 0;
            } else {
                run_len += 1;
                if run_len == count {
                    found = Some(run_start);
                    break;
                }
            }
        }
        let Some(start) = found else {
            return Err(PoolError::Exhausted {
                class: self.class,
                requested: count,
            });
        };
        let end = start + count;
        if start < state.cursor {
            state
                .free_list
                .retain(|index| !(start..end).contains(index));
        }
        for index in start..end {
            state.set(index);
        }
        state.cursor = state.cursor.max(end);
        Ok(start)
    }

    /// Frees one slot. Freeing an unallocated or out-of-range slot is a no-op.
    pub fn free(&self, index: u32) {
        if index >= self.capacity {
            tracing::warn!(class = ?self.class, index, capacity = self.capacity, "freeing out of range descriptor slot");
            return;
        }
        let mut state = self.state.lock().unwrap();
        Self::free_locked(&mut state, index, self.class);
    }

    pub fn free_range(&self, start: u32, count: u32) {
        let end = start.saturating_add(count);
        if end > self.capacity {
            tracing::warn!(class = ?self.class, start, count, capacity = self.capacity, "freeing out of range descriptor range");
        }
        let mut state = self.state.lock().unwrap();
        for index in start..end.min(self.capacity) {
            Self::free_locked(&mut state, index, self.class);
        }
    }

    fn free_locked(state: &mut ArenaState, index: u32, class: HeapClass) {
        if !state.is_allocated(index) {
            tracing::trace!(?class, index, "descriptor slot already free");
            return;
        }
        state.clear(index);
        state.free_list.push_back(index);
    }
}
