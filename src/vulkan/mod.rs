//! Vulkan implementation of the device traits.
//!
//! Command-recording memory blocks are `VkCommandPool`s, the durable pipeline library is
//! a `VkPipelineCache` and the device timeline is a timeline `VkSemaphore`.

use std::sync::Arc;

use ash::{prelude::VkResult, vk};

use crate::{
    command_pool::QueueClass,
    device::{CommandDevice, PipelineDevice, TimelineDevice},
    TimelineValue,
};

mod command_pool;
mod pipeline;
mod semaphore;

pub use command_pool::VulkanCommandPool;
pub use pipeline::*;
pub use semaphore::TimelineSemaphore;

pub trait HasDevice {
    fn device(&self) -> &VulkanPoolDevice;
}

/// Identifies the physical device, used to reject pipeline cache blobs written by
/// another device or driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanDeviceInfo {
    /// Queue family index for each [`QueueClass`], in `QueueClass::ALL` order.
    pub queue_families: [u32; 3],
    pub vendor_id: u32,
    pub device_id: u32,
    pub pipeline_cache_uuid: [u8; vk::UUID_SIZE],
}

impl VulkanDeviceInfo {
    pub fn from_properties(properties: &vk::PhysicalDeviceProperties, queue_families: [u32; 3]) -> Self {
        Self {
            queue_families,
            vendor_id: properties.vendor_id,
            device_id: properties.device_id,
            pipeline_cache_uuid: properties.pipeline_cache_uuid,
        }
    }
    pub fn queue_family(&self, queue: QueueClass) -> u32 {
        self.queue_families[queue.index()]
    }
}

#[derive(Clone)]
pub struct VulkanPoolDevice(Arc<VulkanPoolDeviceInner>);

struct VulkanPoolDeviceInner {
    device: ash::Device,
    info: VulkanDeviceInfo,
    timeline: vk::Semaphore,
}

impl Drop for VulkanPoolDeviceInner {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.timeline, None);
        }
    }
}

impl VulkanPoolDevice {
    /// Wraps an existing logical device. The device must outlive this object and every
    /// block, pipeline and library created from it. A timeline semaphore is created; the
    /// renderer signals it with the values passed to `release` and `end_frame`.
    pub fn new(device: ash::Device, info: VulkanDeviceInfo) -> VkResult<Self> {
        let timeline = semaphore::create_timeline(&device, 0)?;
        tracing::info!(
            device = ?device.handle(),
            vendor_id = info.vendor_id,
            device_id = info.device_id,
            "vulkan pool device created"
        );
        Ok(Self(Arc::new(VulkanPoolDeviceInner {
            device,
            info,
            timeline,
        })))
    }
    pub fn raw(&self) -> &ash::Device {
        &self.0.device
    }
    pub fn info(&self) -> &VulkanDeviceInfo {
        &self.0.info
    }
    /// The timeline whose completed value drives reclamation.
    pub fn timeline(&self) -> TimelineSemaphore {
        TimelineSemaphore::new(self.clone(), self.0.timeline)
    }
}

impl CommandDevice for VulkanPoolDevice {
    type CommandBlock = VulkanCommandPool;

    fn create_command_block(&self, queue: QueueClass) -> VkResult<VulkanCommandPool> {
        VulkanCommandPool::new(self.clone(), self.0.info.queue_family(queue))
    }
    fn reset_command_block(&self, block: &mut VulkanCommandPool) -> VkResult<()> {
        block.reset()
    }
}

impl PipelineDevice for VulkanPoolDevice {
    type Pipeline = VulkanPipeline;
    type Library = VulkanPipelineLibrary;
    type GraphicsDesc = GraphicsPipelineDesc;
    type ComputeDesc = ComputePipelineDesc;

    fn create_library(&self, initial_data: Option<&[u8]>) -> VkResult<VulkanPipelineLibrary> {
        if let Some(data) = initial_data {
            pipeline::validate_cache_header(data, &self.0.info)?;
        }
        VulkanPipelineLibrary::new(self.clone(), initial_data.unwrap_or(&[]))
    }
    fn serialize_library(&self, library: &VulkanPipelineLibrary) -> VkResult<Vec<u8>> {
        library.data()
    }
    fn load_pipeline(&self, _library: &VulkanPipelineLibrary, _name: &str) -> Option<VulkanPipeline> {
        // A VkPipelineCache is not addressable by name; it only speeds up builds.
        None
    }
    fn store_pipeline(
        &self,
        _library: &mut VulkanPipelineLibrary,
        _name: &str,
        _pipeline: &VulkanPipeline,
    ) -> VkResult<()> {
        // Already merged into the cache by the build that passed it in.
        Ok(())
    }
    fn build_graphics(
        &self,
        desc: &GraphicsPipelineDesc,
        library: Option<&VulkanPipelineLibrary>,
    ) -> VkResult<VulkanPipeline> {
        pipeline::build_graphics(self, desc, library)
    }
    fn build_compute(
        &self,
        desc: &ComputePipelineDesc,
        library: Option<&VulkanPipelineLibrary>,
    ) -> VkResult<VulkanPipeline> {
        pipeline::build_compute(self, desc, library)
    }
}

impl TimelineDevice for VulkanPoolDevice {
    fn completed_value(&self) -> VkResult<TimelineValue> {
        self.timeline().value()
    }
    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.0.device.device_wait_idle() }
    }
}
