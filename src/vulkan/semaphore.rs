use std::fmt::Debug;

use ash::{prelude::VkResult, vk};

use super::{HasDevice, VulkanPoolDevice};
use crate::TimelineValue;

pub(super) fn create_timeline(device: &ash::Device, initial_value: u64) -> VkResult<vk::Semaphore> {
    unsafe {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        device.create_semaphore(&info, None)
    }
}

/// A view of the pool device's timeline semaphore. The semaphore itself is owned by
/// the [`VulkanPoolDevice`].
#[derive(Clone)]
pub struct TimelineSemaphore {
    device: VulkanPoolDevice,
    semaphore: vk::Semaphore,
}
impl Debug for TimelineSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.value().ok();
        f.debug_tuple("TimelineSemaphore")
            .field(&self.semaphore)
            .field(&value)
            .finish()
    }
}

impl TimelineSemaphore {
    pub(super) fn new(device: VulkanPoolDevice, semaphore: vk::Semaphore) -> Self {
        Self { device, semaphore }
    }
    pub fn raw(&self) -> vk::Semaphore {
        self.semaphore
    }
    pub fn value(&self) -> VkResult<TimelineValue> {
        let value = unsafe { self.device.raw().get_semaphore_counter_value(self.semaphore)? };
        Ok(TimelineValue(value))
    }
    pub fn is_signaled(&self, value: TimelineValue) -> VkResult<bool> {
        Ok(value.is_reached(self.value()?))
    }
    /// Signals `value` from the host.
    pub fn signal(&self, value: TimelineValue) -> VkResult<()> {
        unsafe {
            self.device.raw().signal_semaphore(
                &vk::SemaphoreSignalInfo::default()
                    .semaphore(self.semaphore)
                    .value(value.get()),
            )
        }
    }
    pub fn wait_blocked(&self, value: TimelineValue, timeout: u64) -> VkResult<()> {
        let semaphores = [self.semaphore];
        let values = [value.get()];
        unsafe {
            self.device.raw().wait_semaphores(
                &vk::SemaphoreWaitInfo::default()
                    .semaphores(&semaphores)
                    .values(&values),
                timeout,
            )
        }
    }
}

impl HasDevice for TimelineSemaphore {
    fn device(&self) -> &VulkanPoolDevice {
        &self.device
    }
}
