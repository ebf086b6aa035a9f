// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use tri_platform::WindowDesc;
use tri_render_vk::PresentModePreference;

#[derive(Debug, Deserialize, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub shaders: ShaderCfg,
    #[serde(default)]
    pub diagnostics: DiagnosticsCfg,
}

#[derive(Debug, Deserialize)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_side")]
    pub width: u32,
    #[serde(default = "default_side")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModeCfg,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Mailbox,
    Fifo,
    FifoRelaxed,
    Immediate,
}

/// Unset paths fall back to the bundled SPIR-V when built with
/// `builtin-shaders`, otherwise to `shader-bin/*.spv`.
#[derive(Debug, Deserialize, Default)]
pub struct ShaderCfg {
    pub vertex: Option<PathBuf>,
    pub fragment: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct DiagnosticsCfg {
    #[serde(default = "default_validation")]
    pub validation: bool,
    #[serde(default = "default_true")]
    pub messenger: bool,
    /// Messenger output goes here instead of the log when set.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_filter")]
    pub log_filter: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_side(),
            height: default_side(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::default(),
        }
    }
}

impl Default for DiagnosticsCfg {
    fn default() -> Self {
        DiagnosticsCfg {
            validation: default_validation(),
            messenger: true,
            log_file: None,
            log_filter: default_filter(),
        }
    }
}

impl WindowCfg {
    pub fn desc(&self) -> WindowDesc {
        WindowDesc {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

impl From<PresentModeCfg> for PresentModePreference {
    fn from(mode: PresentModeCfg) -> Self {
        match mode {
            PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
            PresentModeCfg::Fifo => PresentModePreference::Fifo,
            PresentModeCfg::FifoRelaxed => PresentModePreference::FifoRelaxed,
            PresentModeCfg::Immediate => PresentModePreference::Immediate,
        }
    }
}

fn default_title() -> String {
    WindowDesc::default().title
}
fn default_side() -> u32 {
    500
}
fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_validation() -> bool {
    cfg!(debug_assertions)
}
fn default_true() -> bool {
    true
}
fn default_filter() -> String {
    tri_core::DEFAULT_FILTER.to_owned()
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// A missing file means defaults; anything unreadable or malformed is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(s) => Self::parse(&s).with_context(|| format!("malformed config {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("read config {}", path.display())),
        }
    }
}
