//! Descriptor heaps, command-recording memory and pipeline objects, pooled per device
//! and recycled against the device timeline.

pub mod command_pool;
pub mod descriptor;
mod device;
mod error;
mod frame;
pub mod pipeline;
#[cfg(feature = "bevy")]
mod plugin;
mod session;
mod timeline;
pub mod vulkan;

pub use command_pool::{
    CommandAllocatorPool, CommandPoolConfig, CommandPoolStats, PooledCommandBlock, QueueClass,
};
pub use descriptor::{DescriptorHeapManager, HeapClass, HeapConfig, SlotHandle, SlotRange};
pub use device::*;
pub use error::*;
pub use frame::FramePacer;
pub use pipeline::{
    BindingKind, BindingLayoutCompiler, BindingLayoutEntry, CompiledBindingPlan,
    DescriptorSetLayout, PipelineKey, PipelineObjectCache,
};
#[cfg(feature = "bevy")]
pub use plugin::*;
pub use session::*;
pub use timeline::TimelineValue;
