// SPDX-License-Identifier: CEPL-1.0
//! The one graphics pipeline: empty layout, single-attachment render pass,
//! two shader stages, all state baked in (no dynamic state).

use std::ffi::CStr;
use std::io::Cursor;

use ash::util::read_spv;
use ash::vk;
use tracing::debug;
use tri_render::{ShaderBinary, ShaderError};

use crate::error::{RenderError, RenderResult, VkResultExt};

const SHADER_ENTRY: &CStr = c"main";

pub struct Pipeline {
    device: ash::Device,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Builds layout, render pass, then the pipeline. Shader modules only live
    /// for the duration of this call.
    pub unsafe fn new(
        device: &ash::Device,
        format: vk::Format,
        extent: vk::Extent2D,
        vertex: &ShaderBinary,
        fragment: &ShaderBinary,
    ) -> RenderResult<Self> {
        // Null handles are valid to destroy, so a partial build drops cleanly.
        let mut out = Self {
            device: device.clone(),
            layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            pipeline: vk::Pipeline::null(),
        };

        out.layout = create_layout(device)?;
        out.render_pass = create_render_pass(device, format)?;

        let vs = ShaderModule::new(device, vertex)?;
        let fs = ShaderModule::new(device, fragment)?;
        out.pipeline = create_graphics_pipeline(device, out.layout, out.render_pass, extent, &vs, &fs)?;
        drop(vs);
        drop(fs);

        debug!(
            "pipeline ready ({:?}, {}x{})",
            format, extent.width, extent.height
        );
        Ok(out)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_render_pass(self.render_pass, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
        debug!("pipeline destroyed");
    }
}

struct ShaderModule<'a> {
    device: &'a ash::Device,
    raw: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    unsafe fn new(device: &'a ash::Device, binary: &ShaderBinary) -> RenderResult<Self> {
        let code = spirv_words(binary)?;
        let ci = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: code.len() * 4,
            p_code: code.as_ptr(),
            ..Default::default()
        };
        let raw = device
            .create_shader_module(&ci, None)
            .creation("create_shader_module")?;
        Ok(Self { device, raw })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.raw, None);
        }
    }
}

/// Re-aligns the blob to `u32` words. Anything deeper is left to the driver.
fn spirv_words(binary: &ShaderBinary) -> RenderResult<Vec<u32>> {
    read_spv(&mut Cursor::new(binary.bytes())).map_err(|_| {
        RenderError::from(ShaderError::Malformed {
            label: binary.label().to_owned(),
            len: binary.bytes().len(),
        })
    })
}

unsafe fn create_layout(device: &ash::Device) -> RenderResult<vk::PipelineLayout> {
    let info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        ..Default::default()
    };
    device
        .create_pipeline_layout(&info, None)
        .creation("create_pipeline_layout")
}

fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

/// Holds color writes until the acquire semaphore wait (same stage) has
/// released the image.
fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

unsafe fn create_render_pass(device: &ash::Device, format: vk::Format) -> RenderResult<vk::RenderPass> {
    let color_att = color_attachment(format);
    let att_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &att_ref,
        ..Default::default()
    };
    let dependency = external_dependency();

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_att,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    device
        .create_render_pass(&rp_info, None)
        .creation("create_render_pass")
}

fn viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
    }
}

fn blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        ..Default::default()
    }
}

unsafe fn create_graphics_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    vs: &ShaderModule<'_>,
    fs: &ShaderModule<'_>,
) -> RenderResult<vk::Pipeline> {
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs.raw,
            p_name: SHADER_ENTRY.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs.raw,
            p_name: SHADER_ENTRY.as_ptr(),
            ..Default::default()
        },
    ];

    // Vertices come from gl_VertexIndex; nothing is bound.
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };

    let vp = viewport(extent);
    let sc = scissor(extent);
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &vp,
        scissor_count: 1,
        p_scissors: &sc,
        ..Default::default()
    };

    let raster = rasterization_state();
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        sample_shading_enable: vk::FALSE,
        ..Default::default()
    };

    let color_blend_att = blend_attachment();
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        logic_op_enable: vk::FALSE,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        layout,
        render_pass,
        subpass: 0,
        base_pipeline_index: -1,
        ..Default::default()
    };

    match device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    ) {
        Ok(pipelines) => Ok(pipelines[0]),
        Err((_, result)) => Err(RenderError::Creation {
            stage: "create_graphics_pipelines",
            result,
        }),
    }
}
