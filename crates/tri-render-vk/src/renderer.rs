// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context as _, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, warn};
use tri_render::{RenderSize, Renderer, ShaderBinary};

use crate::commands::RecordedCommands;
use crate::context::{Context, Surface};
use crate::device::Device;
use crate::diagnostics::DiagnosticSink;
use crate::error::RenderResult;
use crate::frame::{FrameReport, FrameSyncObjects, FrameSynchronizer, VkFrameBackend, FRAMES_IN_FLIGHT};
use crate::negotiate::{self, Adapter, PresentModePreference, SurfaceConfig};
use crate::pipeline::Pipeline;
use crate::swapchain::Swapchain;

pub struct VkSettings {
    pub app_name: String,
    pub clear_color: [f32; 4],
    pub present_mode: PresentModePreference,
    pub validation: bool,
    /// `None` skips the debug messenger entirely.
    pub diagnostics: Option<Box<dyn DiagnosticSink>>,
    pub vertex_shader: ShaderBinary,
    pub fragment_shader: ShaderBinary,
}

// STRICT TEARDOWN ORDER (fields drop top to bottom, after the idle wait in
// `Drop`): sync objects → command pool → framebuffers/views/swapchain →
// pipeline/render pass/layout → device → surface → messenger → instance.
pub struct VkRenderer {
    sync: FrameSyncObjects,
    commands: RecordedCommands,
    swapchain: Swapchain,
    // Held for drop order only; the recorded commands carry its handles.
    #[allow(dead_code)]
    pipeline: Pipeline,
    device: Device,
    // Held for drop order only; must outlive the swapchain.
    #[allow(dead_code)]
    surface: Surface,
    context: Context,

    frames: FrameSynchronizer,
    adapter: Adapter,
    config: SurfaceConfig,
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still references it.
        if let Err(e) = self.device.wait_idle() {
            warn!("device idle wait failed during teardown: {e}");
        }
        info!(
            "shutting down after {} frames",
            self.frames.frames_drawn()
        );
    }
}

unsafe fn build_renderer(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    size: RenderSize,
    settings: VkSettings,
) -> RenderResult<VkRenderer> {
    let display_raw = display.display_handle()?.as_raw();
    let window_raw = window.window_handle()?.as_raw();

    // 1) Instance (+ messenger), surface
    let context = Context::new(
        display_raw,
        &settings.app_name,
        settings.validation,
        settings.diagnostics,
    )?;
    let surface = Surface::new(&context, display_raw, window_raw)?;

    // 2) Adapter + queue family, then surface negotiation
    let adapter = negotiate::select_adapter(context.instance(), &surface)?;
    let config = negotiate::query_surface_config(&surface, &adapter, size, settings.present_mode)?;

    // 3) Device, pipeline, swapchain targets
    let device = Device::new(context.instance(), &adapter)?;
    let pipeline = Pipeline::new(
        device.raw(),
        config.format.format,
        config.extent,
        &settings.vertex_shader,
        &settings.fragment_shader,
    )?;
    let swapchain = Swapchain::new(
        context.instance(),
        &device,
        &surface,
        &config,
        pipeline.render_pass(),
    )?;

    // 4) Record once, then per-slot sync
    let commands = RecordedCommands::record(&device, &pipeline, &swapchain, settings.clear_color)?;
    let sync = FrameSyncObjects::new(device.raw(), FRAMES_IN_FLIGHT)?;

    info!(
        "renderer ready on {} ({} images, {} frames in flight)",
        adapter.name,
        swapchain.image_count(),
        FRAMES_IN_FLIGHT
    );

    Ok(VkRenderer {
        sync,
        commands,
        swapchain,
        pipeline,
        device,
        surface,
        context,
        frames: FrameSynchronizer::new(),
        adapter,
        config,
    })
}

impl VkRenderer {
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn surface_config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn validation_enabled(&self) -> bool {
        self.context.validation_enabled()
    }

    /// One wait → acquire → submit → present iteration.
    pub fn draw_frame(&mut self) -> RenderResult<FrameReport> {
        let mut backend = VkFrameBackend {
            device: &self.device,
            swapchain: &self.swapchain,
            sync: &self.sync,
        };
        self.frames.draw_frame(&mut backend, self.commands.buffers())
    }
}

impl Renderer for VkRenderer {
    type Settings = VkSettings;

    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: VkSettings,
    ) -> Result<Self> {
        unsafe { build_renderer(window, display, size, settings) }.context("vulkan bootstrap")
    }

    fn render(&mut self) -> Result<()> {
        self.draw_frame()?;
        Ok(())
    }

    fn frames_rendered(&self) -> u64 {
        self.frames.frames_drawn()
    }
}
