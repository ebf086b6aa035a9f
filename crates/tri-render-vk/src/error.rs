// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;
use tri_render::ShaderError;

pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Every failure here is fatal; the variant says which stage gave up.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load the Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("{stage} failed: {result}")]
    Creation {
        stage: &'static str,
        result: vk::Result,
    },

    /// Acquire or present did not return plain success. Suboptimal counts:
    /// there is no swapchain recreation path.
    #[error("{stage} did not succeed: {result}")]
    Acquire {
        stage: &'static str,
        result: vk::Result,
    },

    /// Fence waits, submission and idle waits.
    #[error("{stage} failed: {result}")]
    Sync {
        stage: &'static str,
        result: vk::Result,
    },

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error("no queue family supports both graphics and presentation")]
    NoPresentQueue,

    #[error("surface reports no {0}")]
    NoSurfaceSupport(&'static str),

    #[error("acquired image index {index} outside swapchain of {count} images")]
    ImageIndexOutOfRange { index: u32, count: usize },
}

/// `.context(...)`-style tagging for raw `VkResult`s.
pub(crate) trait VkResultExt<T> {
    fn creation(self, stage: &'static str) -> RenderResult<T>;
    fn acquire(self, stage: &'static str) -> RenderResult<T>;
    fn sync(self, stage: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn creation(self, stage: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Creation { stage, result })
    }

    fn acquire(self, stage: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Acquire { stage, result })
    }

    fn sync(self, stage: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Sync { stage, result })
    }
}
