// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: bootstrap, one fixed pipeline, pre-recorded commands and a
//! double-buffered acquire/submit/present loop.

mod commands;
mod context;
mod device;
mod diagnostics;
mod error;
mod frame;
mod negotiate;
mod pipeline;
mod renderer;
mod swapchain;

pub use diagnostics::{Category, DiagnosticSink, FileSink, Severity, TracingSink};
pub use error::{RenderError, RenderResult};
pub use frame::{FrameBackend, FrameReport, FrameSynchronizer, SlotState, FRAMES_IN_FLIGHT};
pub use negotiate::{
    choose_extent, choose_present_mode, choose_surface_format, negotiate_surface,
    select_queue_family, Adapter, PresentModePreference, SurfaceConfig, PREFERRED_SURFACE_FORMAT,
};
pub use renderer::{VkRenderer, VkSettings};
