// SPDX-License-Identifier: CEPL-1.0
use ash::khr::swapchain;
use ash::vk;
use tracing::{debug, info};

use crate::context::Surface;
use crate::device::Device;
use crate::error::{RenderResult, VkResultExt};
use crate::negotiate::SurfaceConfig;

/// Presentable images with one view and one framebuffer each. Built once;
/// there is no recreation path.
pub struct Swapchain {
    device: ash::Device,
    loader: swapchain::Device,
    raw: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &Device,
        surface: &Surface,
        config: &SurfaceConfig,
        render_pass: vk::RenderPass,
    ) -> RenderResult<Self> {
        let loader = swapchain::Device::new(instance, device.raw());
        let family = device.queue_family();

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.raw(),
            min_image_count: config.image_count,
            image_format: config.format.format,
            image_color_space: config.format.color_space,
            image_extent: config.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: 1,
            p_queue_family_indices: &family,
            pre_transform: config.transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: config.present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        let raw = loader
            .create_swapchain(&swap_info, None)
            .creation("create_swapchain")?;

        let mut out = Self {
            device: device.raw().clone(),
            loader,
            raw,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            format: config.format.format,
            extent: config.extent,
        };

        // The driver may hand back more images than requested.
        out.images = out
            .loader
            .get_swapchain_images(raw)
            .creation("get_swapchain_images")?;

        out.views.reserve(out.images.len());
        for &image in &out.images {
            let view = out
                .device
                .create_image_view(&view_info(image, out.format), None)
                .creation("create_image_view")?;
            out.views.push(view);
        }

        out.framebuffers.reserve(out.views.len());
        for view in &out.views {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: view,
                width: out.extent.width,
                height: out.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = out
                .device
                .create_framebuffer(&fb_info, None)
                .creation("create_framebuffer")?;
            out.framebuffers.push(fb);
        }

        info!(
            "swapchain ready: {} images (requested {}), {}x{}",
            out.images.len(),
            config.image_count,
            out.extent.width,
            out.extent.height
        );
        Ok(out)
    }

    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Framebuffer `i` targets swapchain image `i`.
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &fb in &self.framebuffers {
                self.device.destroy_framebuffer(fb, None);
            }
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
        debug!("swapchain destroyed ({} images)", self.images.len());
    }
}

fn view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    }
}
