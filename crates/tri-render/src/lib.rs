// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod shader;

pub use shader::{ShaderBinary, ShaderError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

pub trait Renderer {
    /// Everything the backend needs beyond the window: shader blobs, clear
    /// color, presentation preferences.
    type Settings;

    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: Self::Settings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Draws and presents one frame.
    fn render(&mut self) -> Result<()>;

    fn frames_rendered(&self) -> u64;
}
