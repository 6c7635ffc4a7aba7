//! Engine Configuration
//!
//! Every field is optional on disk; missing fields take the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::Color;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Quiet period before a burst of edits is applied.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub autofit: AutofitConfig,
    /// Line advance as a multiple of font size.
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    /// Painted where media has not been decoded.
    #[serde(default = "default_placeholder_color")]
    pub placeholder_color: Color,
    #[serde(default)]
    pub export: ExportConfig,
}

fn default_debounce_ms() -> u64 { 300 }
fn default_line_height() -> f64 { 1.2 }
fn default_placeholder_color() -> Color { Color::rgb(0xd9, 0xd9, 0xd9) }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            autofit: AutofitConfig::default(),
            line_height: default_line_height(),
            placeholder_color: default_placeholder_color(),
            export: ExportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutofitConfig {
    /// Search stops once the candidate interval is narrower than this (px).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_tolerance() -> f64 { 0.5 }
fn default_max_iterations() -> u32 { 24 }

impl Default for AutofitConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Upper bound on frames in one sequence export.
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
}

fn default_fps() -> u32 { 30 }
fn default_max_frames() -> u32 { 3600 }

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            max_frames: default_max_frames(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.line_height.is_finite() && self.line_height > 0.0) {
            return Err(ConfigError::Invalid("lineHeight must be positive".into()));
        }
        if !(self.autofit.tolerance.is_finite() && self.autofit.tolerance > 0.0) {
            return Err(ConfigError::Invalid("autofit.tolerance must be positive".into()));
        }
        if self.autofit.max_iterations == 0 {
            return Err(ConfigError::Invalid("autofit.maxIterations must be at least 1".into()));
        }
        if self.export.fps == 0 {
            return Err(ConfigError::Invalid("export.fps must be at least 1".into()));
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
