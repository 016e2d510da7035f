//! Viewer configuration.

use crate::refresh::DEFAULT_ADDR_GAP;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    /// SVD file to load when the session does not provide one.
    pub svd_path: Option<PathBuf>,
    /// probe-rs target name, auto-detected when absent.
    pub device_name: Option<String>,
    /// Maximum byte gap between registers read in one transport call.
    pub addr_gap_threshold: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            svd_path: None,
            device_name: None,
            addr_gap_threshold: DEFAULT_ADDR_GAP,
        }
    }
}

impl ViewerConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
