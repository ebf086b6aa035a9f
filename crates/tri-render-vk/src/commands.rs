// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RenderResult, VkResultExt};
use crate::pipeline::Pipeline;
use crate::swapchain::Swapchain;

/// One pre-recorded primary command buffer per swapchain image. Recorded
/// once at startup and resubmitted every frame; the clear color is baked in.
pub struct RecordedCommands {
    device: ash::Device,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl RecordedCommands {
    pub unsafe fn record(
        device: &Device,
        pipeline: &Pipeline,
        swapchain: &Swapchain,
        clear_color: [f32; 4],
    ) -> RenderResult<Self> {
        let d = device.raw();
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: device.queue_family(),
            ..Default::default()
        };
        let pool = d
            .create_command_pool(&pool_info, None)
            .creation("create_command_pool")?;

        let mut out = Self {
            device: d.clone(),
            pool,
            buffers: Vec::new(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: swapchain.image_count() as u32,
            ..Default::default()
        };
        // Buffers are freed with the pool.
        out.buffers = d
            .allocate_command_buffers(&alloc_info)
            .creation("allocate_command_buffers")?;

        let clear = [clear_value(clear_color)];
        let area = render_area(swapchain.extent());
        for (&cmd, &framebuffer) in out.buffers.iter().zip(swapchain.framebuffers()) {
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)
                .creation("begin_command_buffer")?;

            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: pipeline.render_pass(),
                framebuffer,
                render_area: area,
                clear_value_count: clear.len() as u32,
                p_clear_values: clear.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
            d.cmd_draw(cmd, 3, 1, 0, 0);
            d.cmd_end_render_pass(cmd);

            d.end_command_buffer(cmd).creation("end_command_buffer")?;
        }

        debug!("recorded {} command buffers", out.buffers.len());
        Ok(out)
    }

    /// Indexed by swapchain image.
    pub fn buffers(&self) -> &[vk::CommandBuffer] {
        &self.buffers
    }
}

impl Drop for RecordedCommands {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

fn render_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
