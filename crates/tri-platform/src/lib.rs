// SPDX-License-Identifier: CEPL-1.0
//! Windowing glue. The app talks to winit through this crate only.

pub use winit;

use anyhow::{Context, Result};
use tracing::debug;
use winit::{
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::Window,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowDesc {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowDesc {
    fn default() -> Self {
        Self {
            title: "Test Triangle".to_owned(),
            width: 500,
            height: 500,
        }
    }
}

/// Opens a fixed-size window. The swapchain is never recreated, so the window
/// is not user-resizable.
pub fn create_window(event_loop: &ActiveEventLoop, desc: &WindowDesc) -> Result<Window> {
    let attrs = Window::default_attributes()
        .with_title(desc.title.clone())
        .with_inner_size(PhysicalSize::new(desc.width.max(1), desc.height.max(1)))
        .with_resizable(false);
    let window = event_loop.create_window(attrs).context("create_window")?;
    let size = window.inner_size();
    debug!("window '{}' open at {}x{}", desc.title, size.width, size.height);
    Ok(window)
}

/// The only events the render loop reacts to. Everything else is ignored.
pub fn is_quit_event(event: &WindowEvent) -> bool {
    matches!(event, WindowEvent::CloseRequested | WindowEvent::Destroyed)
}
