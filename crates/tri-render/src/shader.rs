// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("cannot read shader '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("shader '{label}' is not a SPIR-V module ({len} bytes)")]
    Malformed { label: String, len: usize },
}

/// A compiled shader module, opaque to everything but module creation.
#[derive(Clone, Debug)]
pub struct ShaderBinary {
    label: String,
    bytes: Vec<u8>,
}

impl ShaderBinary {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ShaderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded shader {} ({} bytes)", path.display(), bytes.len());
        Ok(Self {
            label: path.display().to_string(),
            bytes,
        })
    }

    pub fn from_bytes(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
