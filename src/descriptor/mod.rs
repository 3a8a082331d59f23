mod arena;
mod heap;
mod ring;

pub use arena::*;
pub use heap::*;
pub use ring::*;

/// The resource classes that each get their own descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeapClass {
    /// Sampled and storage resources (textures, buffers).
    Resource = 0,
    Sampler = 1,
    ColorTarget = 2,
    DepthTarget = 3,
}

impl HeapClass {
    pub const ALL: [HeapClass; 4] = [
        HeapClass::Resource,
        HeapClass::Sampler,
        HeapClass::ColorTarget,
        HeapClass::DepthTarget,
    ];
    pub(crate) fn index(self) -> usize {
        self as usize
    }
    /// Shader visible heaps can be bound to the pipeline and carry GPU addresses.
    pub fn is_shader_visible(self) -> bool {
        matches!(self, HeapClass::Resource | HeapClass::Sampler)
    }
}

/// A descriptor slot. `index` is the identity; both addresses are pure functions of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    pub index: u32,
    pub cpu_address: u64,
    pub gpu_address: Option<u64>,
}

/// `count` contiguous slots starting at `first`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRange {
    pub first: SlotHandle,
    pub count: u32,
    pub(crate) stride: u32,
}

impl SlotRange {
    pub fn len(&self) -> u32 {
        self.count
    }
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
    /// Returns the handle `offset` slots past the first one.
    pub fn handle(&self, offset: u32) -> Option<SlotHandle> {
        if offset >= self.count {
            return None;
        }
        let delta = offset as u64 * self.stride as u64;
        Some(SlotHandle {
            index: self.first.index + offset,
            cpu_address: self.first.cpu_address + delta,
            gpu_address: self.first.gpu_address.map(|base| base + delta),
        })
    }
    pub fn iter(&self) -> impl Iterator<Item = SlotHandle> + '_ {
        (0..self.count).filter_map(|i| self.handle(i))
    }
}
