// SPDX-License-Identifier: MPL-2.0
//! This module handles the pipeline configuration, including loading and saving
//! it to a `pipeline.toml` file.
//!
//! # Examples
//!
//! ```no_run
//! use video_sync::config::{self, PipelineConfig};
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Modify a setting
//! config.loop_playback = Some(true);
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//! ```

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::video_player::{BufferCapacity, MasterSync};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "pipeline.toml";
const APP_NAME: &str = "VideoSync";

/// User-tunable pipeline settings. Every field is optional so partial files
/// keep working; accessors fall back to the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub video_buffer_frames: Option<usize>,
    #[serde(default)]
    pub audio_buffer_frames: Option<usize>,
    #[serde(default)]
    pub sync_threshold_secs: Option<f64>,
    #[serde(default)]
    pub nosync_threshold_secs: Option<f64>,
    #[serde(default)]
    pub master_sync: Option<MasterSync>,
    #[serde(default)]
    pub audio_enabled: Option<bool>,
    #[serde(default)]
    pub loop_playback: Option<bool>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_buffer_frames: Some(DEFAULT_VIDEO_BUFFER_FRAMES),
            audio_buffer_frames: Some(DEFAULT_AUDIO_BUFFER_FRAMES),
            sync_threshold_secs: Some(DEFAULT_SYNC_THRESHOLD_SECS),
            nosync_threshold_secs: Some(DEFAULT_NOSYNC_THRESHOLD_SECS),
            master_sync: Some(MasterSync::default()),
            audio_enabled: Some(true),
            loop_playback: Some(false),
        }
    }
}

impl PipelineConfig {
    pub fn video_capacity(&self) -> BufferCapacity {
        self.video_buffer_frames
            .map(BufferCapacity::new)
            .unwrap_or_default()
    }

    pub fn audio_capacity(&self) -> BufferCapacity {
        self.audio_buffer_frames
            .map(BufferCapacity::new)
            .unwrap_or_else(|| BufferCapacity::new(DEFAULT_AUDIO_BUFFER_FRAMES))
    }

    /// Validated drift thresholds.
    pub fn thresholds(&self) -> Result<SyncThresholds> {
        SyncThresholds::new(
            self.sync_threshold_secs
                .unwrap_or(DEFAULT_SYNC_THRESHOLD_SECS),
            self.nosync_threshold_secs
                .unwrap_or(DEFAULT_NOSYNC_THRESHOLD_SECS),
        )
    }
}

/// Pair of drift thresholds, guaranteed to satisfy `0 < sync < nosync`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncThresholds {
    sync_secs: f64,
    nosync_secs: f64,
}

impl SyncThresholds {
    pub fn new(sync_secs: f64, nosync_secs: f64) -> Result<Self> {
        if !(sync_secs > 0.0 && sync_secs.is_finite()) {
            return Err(Error::Config(format!(
                "sync threshold must be a positive number of seconds, got {sync_secs}"
            )));
        }
        if !(nosync_secs > sync_secs && nosync_secs.is_finite()) {
            return Err(Error::Config(format!(
                "no-sync threshold ({nosync_secs}) must exceed sync threshold ({sync_secs})"
            )));
        }
        Ok(Self {
            sync_secs,
            nosync_secs,
        })
    }

    #[must_use]
    pub fn sync_secs(self) -> f64 {
        self.sync_secs
    }

    #[must_use]
    pub fn nosync_secs(self) -> f64 {
        self.nosync_secs
    }
}

impl Default for SyncThresholds {
    fn default() -> Self {
        Self {
            sync_secs: DEFAULT_SYNC_THRESHOLD_SECS,
            nosync_secs: DEFAULT_NOSYNC_THRESHOLD_SECS,
        }
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<PipelineConfig> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(PipelineConfig::default())
}

pub fn save(config: &PipelineConfig) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content).unwrap_or_else(|err| {
        log::warn!("Ignoring invalid pipeline config {}: {err}", path.display());
        PipelineConfig::default()
    }))
}

pub fn save_to_path(config: &PipelineConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
