use ash::prelude::VkResult;

use crate::{command_pool::QueueClass, TimelineValue};

/// Creates and recycles native command-recording memory blocks
/// (a `VkCommandPool` on Vulkan, a command allocator elsewhere).
pub trait CommandDevice: Send + Sync {
    type CommandBlock: Send + 'static;

    fn create_command_block(&self, queue: QueueClass) -> VkResult<Self::CommandBlock>;
    /// Resets a block for reuse. Only called once all work recorded from it has completed.
    fn reset_command_block(&self, block: &mut Self::CommandBlock) -> VkResult<()>;
}

/// Builds pipeline objects and owns the durable, serializable pipeline library format.
///
/// The library blob is opaque to this crate. Backends without name-addressable
/// libraries may always return `None` from [`PipelineDevice::load_pipeline`] and still
/// use the library to accelerate builds.
pub trait PipelineDevice: Send + Sync {
    type Pipeline: Send + Sync + 'static;
    type Library: Send + 'static;
    type GraphicsDesc;
    type ComputeDesc;

    /// Creates a library, optionally seeded from a previously serialized blob.
    /// Returns an error if the blob is rejected, e.g. after a driver update.
    fn create_library(&self, initial_data: Option<&[u8]>) -> VkResult<Self::Library>;
    fn serialize_library(&self, library: &Self::Library) -> VkResult<Vec<u8>>;
    fn load_pipeline(&self, library: &Self::Library, name: &str) -> Option<Self::Pipeline>;
    fn store_pipeline(
        &self,
        library: &mut Self::Library,
        name: &str,
        pipeline: &Self::Pipeline,
    ) -> VkResult<()>;

    fn build_graphics(
        &self,
        desc: &Self::GraphicsDesc,
        library: Option<&Self::Library>,
    ) -> VkResult<Self::Pipeline>;
    fn build_compute(
        &self,
        desc: &Self::ComputeDesc,
        library: Option<&Self::Library>,
    ) -> VkResult<Self::Pipeline>;
}

/// The device timeline. Values only ever increase.
pub trait TimelineDevice: Send + Sync {
    fn completed_value(&self) -> VkResult<TimelineValue>;
    /// Blocks until every queue drains. Shutdown and resize only.
    fn wait_idle(&self) -> VkResult<()>;
}

pub trait PoolDevice: CommandDevice + PipelineDevice + TimelineDevice {}
impl<T> PoolDevice for T where T: CommandDevice + PipelineDevice + TimelineDevice {}
