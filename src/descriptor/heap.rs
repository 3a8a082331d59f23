use super::{HeapClass, SlotHandle, SlotRange, StaticSlotArena, TransientRing};
use crate::{pipeline::CompiledBindingPlan, PoolError, Result};

/// Layout of one class heap. The static region occupies the first `static_capacity`
/// slots; `frames_in_flight` transient regions of `transient_capacity` slots follow.
#[derive(Debug, Clone)]
pub struct ClassHeapConfig {
    pub static_capacity: u32,
    /// Transient slots per frame in flight.
    pub transient_capacity: u32,
    /// Byte distance between two consecutive slots.
    pub stride: u32,
    pub cpu_base: u64,
    /// Only shader visible heaps have one.
    pub gpu_base: Option<u64>,
}

impl ClassHeapConfig {
    fn total_slots(&self, frames_in_flight: u32) -> u64 {
        self.static_capacity as u64 + self.transient_capacity as u64 * frames_in_flight as u64
    }
}

#[derive(Debug, Clone)]
pub struct HeapConfig {
    pub frames_in_flight: u32,
    pub resource: ClassHeapConfig,
    pub sampler: ClassHeapConfig,
    pub color_target: ClassHeapConfig,
    pub depth_target: ClassHeapConfig,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            resource: ClassHeapConfig {
                static_capacity: 8192,
                transient_capacity: 16384,
                stride: 32,
                cpu_base: 0,
                gpu_base: Some(0),
            },
            sampler: ClassHeapConfig {
                static_capacity: 256,
                transient_capacity: 512,
                stride: 32,
                cpu_base: 0,
                gpu_base: Some(0),
            },
            color_target: ClassHeapConfig {
                static_capacity: 256,
                transient_capacity: 0,
                stride: 32,
                cpu_base: 0,
                gpu_base: None,
            },
            depth_target: ClassHeapConfig {
                static_capacity: 64,
                transient_capacity: 0,
                stride: 32,
                cpu_base: 0,
                gpu_base: None,
            },
        }
    }
}

impl HeapConfig {
    pub fn class(&self, class: HeapClass) -> &ClassHeapConfig {
        match class {
            HeapClass::Resource => &self.resource,
            HeapClass::Sampler => &self.sampler,
            HeapClass::ColorTarget => &self.color_target,
            HeapClass::DepthTarget => &self.depth_target,
        }
    }
}

struct ClassHeap {
    config: ClassHeapConfig,
    arena: StaticSlotArena,
    /// One ring per frame in flight.
    rings: Vec<TransientRing>,
}

impl ClassHeap {
    fn handle(&self, index: u32) -> SlotHandle {
        let offset = index as u64 * self.config.stride as u64;
        SlotHandle {
            index,
            cpu_address: self.config.cpu_base + offset,
            gpu_address: self.config.gpu_base.map(|base| base + offset),
        }
    }
    fn range(&self, index: u32, count: u32) -> SlotRange {
        SlotRange {
            first: self.handle(index),
            count,
            stride: self.config.stride,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapClassStats {
    pub static_allocated: u32,
    pub static_capacity: u32,
    pub transient_used: u32,
    pub transient_capacity: u32,
}

/// Transient table ranges backing one draw's compiled binding plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableAllocation {
    pub resources: Option<SlotRange>,
    pub samplers: Option<SlotRange>,
}

/// Owns one static arena per [`HeapClass`] and one transient ring per class per frame in flight.
pub struct DescriptorHeapManager {
    frames_in_flight: u32,
    frame_index: u32,
    heaps: [ClassHeap; 4],
}

impl DescriptorHeapManager {
    pub fn new(config: HeapConfig) -> Result<Self> {
        if config.frames_in_flight == 0 {
            return Err(PoolError::Configuration(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        let frames_in_flight = config.frames_in_flight;
        let heaps = HeapClass::ALL.map(|class| {
            let class_config = config.class(class).clone();
            ClassHeap {
                arena: StaticSlotArena::new(class, class_config.static_capacity),
                rings: (0..frames_in_flight)
                    .map(|_| TransientRing::new(class_config.transient_capacity))
                    .collect(),
                config: class_config,
            }
        });
        for heap in heaps.iter() {
            if heap.config.total_slots(frames_in_flight) > u32::MAX as u64 {
                return Err(PoolError::Configuration(format!(
                    "{:?} heap does not fit in 32-bit slot indices",
                    heap.arena.class()
                )));
            }
            if heap.config.gpu_base.is_some() && !heap.arena.class().is_shader_visible() {
                tracing::warn!(class = ?heap.arena.class(), "gpu_base set on a heap that is not shader visible");
            }
        }
        tracing::debug!(
            frames_in_flight,
            resource_slots = heaps[0].config.total_slots(frames_in_flight),
            sampler_slots = heaps[1].config.total_slots(frames_in_flight),
            "descriptor heaps created"
        );
        Ok(Self {
            frames_in_flight,
            frame_index: 0,
            heaps,
        })
    }
    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }
    fn heap(&self, class: HeapClass) -> &ClassHeap {
        &self.heaps[class.index()]
    }

    /// Recomputes the handle for a slot index; no lock is taken.
    pub fn handle(&self, class: HeapClass, index: u32) -> SlotHandle {
        self.heap(class).handle(index)
    }

    pub fn allocate_static(&self, class: HeapClass) -> Result<SlotHandle> {
        let heap = self.heap(class);
        let index = heap.arena.allocate()?;
        Ok(heap.handle(index))
    }
    pub fn allocate_static_range(&self, class: HeapClass, count: u32) -> Result<SlotRange> {
        let heap = self.heap(class);
        let index = heap.arena.allocate_range(count)?;
        Ok(heap.range(index, count))
    }
    pub fn free_static(&self, class: HeapClass, handle: SlotHandle) {
        let heap = self.heap(class);
        if handle.index >= heap.config.static_capacity {
            tracing::warn!(?class, index = handle.index, "freeing a transient or foreign slot as static");
            return;
        }
        heap.arena.free(handle.index);
    }
    pub fn free_static_range(&self, class: HeapClass, range: SlotRange) {
        let heap = self.heap(class);
        if range.first.index >= heap.config.static_capacity {
            tracing::warn!(?class, index = range.first.index, "freeing a transient or foreign range as static");
            return;
        }
        heap.arena.free_range(range.first.index, range.count);
    }

    /// Allocates `count` contiguous slots that stay valid until this frame slot comes around again.
    pub fn allocate_transient(&self, class: HeapClass, count: u32) -> Result<SlotRange> {
        let heap = self.heap(class);
        let offset = heap.rings[self.frame_index as usize].allocate(count)?;
        let index =
            heap.config.static_capacity + self.frame_index * heap.config.transient_capacity + offset;
        Ok(heap.range(index, count))
    }

    /// Allocates the transient table ranges `plan` needs for one draw.
    pub fn allocate_tables(&self, plan: &CompiledBindingPlan) -> Result<TableAllocation> {
        let resources = match plan.resource_table_size() {
            0 => None,
            size => Some(self.allocate_transient(HeapClass::Resource, size)?),
        };
        let samplers = match plan.sampler_table_size() {
            0 => None,
            size => Some(self.allocate_transient(HeapClass::Sampler, size)?),
        };
        Ok(TableAllocation {
            resources,
            samplers,
        })
    }

    /// Moves to the next frame slot and resets its rings.
    ///
    /// Must only be called once the GPU work of the frame that last used the new slot
    /// has completed. `&mut self` guarantees no transient allocation races the reset.
    pub fn advance_frame(&mut self) -> u32 {
        self.frame_index = (self.frame_index + 1) % self.frames_in_flight;
        let frame_index = self.frame_index as usize;
        for heap in self.heaps.iter_mut() {
            heap.rings[frame_index].reset();
        }
        tracing::trace!(frame_index, "descriptor heap frame advanced");
        self.frame_index
    }

    pub fn class_stats(&self, class: HeapClass) -> HeapClassStats {
        let heap = self.heap(class);
        let ring = &heap.rings[self.frame_index as usize];
        HeapClassStats {
            static_allocated: heap.arena.allocated_count(),
            static_capacity: heap.arena.capacity(),
            transient_used: ring.used(),
            transient_capacity: ring.capacity(),
        }
    }
}
