use ash::{prelude::VkResult, vk};

use super::{HasDevice, VulkanPoolDevice};

/// A transient `VkCommandPool` used as one pooled command-recording memory block.
///
/// Command buffers allocated from it are kept across resets and handed out again,
/// so a recycled pool does not reallocate.
pub struct VulkanCommandPool {
    device: VulkanPoolDevice,
    raw: vk::CommandPool,
    /// All command buffers allocated from `raw`.
    allocated_command_buffers: Vec<vk::CommandBuffer>,
    /// allocated_command_buffers[0..command_buffer_allocation_index] are used since the last reset.
    command_buffer_allocation_index: usize,
}
impl HasDevice for VulkanCommandPool {
    fn device(&self) -> &VulkanPoolDevice {
        &self.device
    }
}
impl VulkanCommandPool {
    pub fn new(device: VulkanPoolDevice, queue_family_index: u32) -> VkResult<Self> {
        let raw = unsafe {
            device.raw().create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT)
                    .queue_family_index(queue_family_index),
                None,
            )?
        };
        Ok(Self {
            device,
            raw,
            allocated_command_buffers: Vec::new(),
            command_buffer_allocation_index: 0,
        })
    }
    pub fn raw(&self) -> vk::CommandPool {
        self.raw
    }
    /// Returns a primary command buffer in the initial state, reusing one from before
    /// the last reset if available.
    pub fn allocate(&mut self) -> VkResult<vk::CommandBuffer> {
        if let Some(command_buffer) = self
            .allocated_command_buffers
            .get(self.command_buffer_allocation_index)
        {
            self.command_buffer_allocation_index += 1;
            return Ok(*command_buffer);
        }
        let command_buffers = unsafe {
            self.device.raw().allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.raw)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )?
        };
        self.allocated_command_buffers.extend_from_slice(&command_buffers);
        self.command_buffer_allocation_index = self.allocated_command_buffers.len();
        Ok(command_buffers[0])
    }
    /// Number of command buffers handed out since the last reset.
    pub fn used(&self) -> usize {
        self.command_buffer_allocation_index
    }
    pub fn reset(&mut self) -> VkResult<()> {
        unsafe {
            self.device
                .raw()
                .reset_command_pool(self.raw, vk::CommandPoolResetFlags::empty())?;
        }
        self.command_buffer_allocation_index = 0;
        Ok(())
    }
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_command_pool(self.raw, None);
        }
    }
}
