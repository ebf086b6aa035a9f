// SPDX-License-Identifier: CEPL-1.0
use ash::khr::swapchain;
use ash::vk;
use tracing::debug;

use crate::error::{RenderResult, VkResultExt};
use crate::negotiate::Adapter;

/// Logical device plus its single queue, used for both submission and
/// presentation. Objects created from it keep a clone of the function table
/// and must be dropped first.
pub struct Device {
    raw: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
}

impl Device {
    pub unsafe fn new(instance: &ash::Instance, adapter: &Adapter) -> RenderResult<Self> {
        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: adapter.queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };

        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };

        let raw = instance
            .create_device(adapter.physical, &dinfo, None)
            .creation("create_device")?;
        let queue = raw.get_device_queue(adapter.queue_family, 0);
        debug!("device created on queue family {}", adapter.queue_family);

        Ok(Self {
            raw,
            queue,
            queue_family: adapter.queue_family,
        })
    }

    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Blocks until every queue on the device has drained.
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.raw.device_wait_idle() }.sync("device_wait_idle")
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.raw.destroy_device(None);
        }
        debug!("device destroyed");
    }
}
