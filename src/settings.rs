// src/settings.rs
//
// Persisted simulator settings (settings.json in the user config directory).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::serial::framer::{
    FrameGeometry, DEFAULT_MAX_LINE_LENGTH, DISPLAY_HEIGHT, DISPLAY_WIDTH, IMAGE_MARKER,
};
use crate::io::{LineSettings, Parity};

const APP_DIR_NAME: &str = "glance-sim";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SimSettings {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_display_width")]
    pub display_width: usize,
    #[serde(default = "default_display_height")]
    pub display_height: usize,
    #[serde(default = "default_image_marker")]
    pub image_marker: String,
    /// Silence (ms) mid-framebuffer before the frame is dropped
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Lines kept in the log pane
    #[serde(default = "default_log_history")]
    pub log_history: usize,
    /// Where headless mode writes .pbm snapshots (None = don't write)
    #[serde(default)]
    pub snapshot_dir: Option<String>,
}

fn default_baud_rate() -> u32 {
    115_200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_display_width() -> usize {
    DISPLAY_WIDTH
}
fn default_display_height() -> usize {
    DISPLAY_HEIGHT
}
fn default_image_marker() -> String {
    IMAGE_MARKER.to_string()
}
fn default_frame_timeout_ms() -> u64 {
    1000
}
fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}
fn default_log_history() -> usize {
    1000
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            display_width: default_display_width(),
            display_height: default_display_height(),
            image_marker: default_image_marker(),
            frame_timeout_ms: default_frame_timeout_ms(),
            max_line_length: default_max_line_length(),
            log_history: default_log_history(),
            snapshot_dir: None,
        }
    }
}

impl SimSettings {
    /// Check values the decoder and port cannot work with
    pub fn validate(&self) -> Result<(), String> {
        self.geometry()?;
        if self.image_marker.is_empty() {
            return Err("image_marker must not be empty".to_string());
        }
        if self.frame_timeout_ms == 0 {
            return Err("frame_timeout_ms must be greater than zero".to_string());
        }
        if self.max_line_length == 0 {
            return Err("max_line_length must be greater than zero".to_string());
        }
        if self.baud_rate == 0 {
            return Err("baud_rate must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<FrameGeometry, String> {
        FrameGeometry::new(self.display_width, self.display_height).map_err(|e| e.to_string())
    }

    pub fn line_settings(&self) -> LineSettings {
        LineSettings {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
        }
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

/// Default location: `<config dir>/glance-sim/settings.json`
pub fn default_settings_path() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir().ok_or_else(|| "Failed to get user config dir".to_string())?;
    Ok(config_dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings; on first run the defaults are written to `path`.
pub fn load_settings(path: &Path) -> Result<SimSettings, String> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))
    } else {
        let settings = SimSettings::default();
        save_settings(path, &settings)?;
        tlog!("[settings] Wrote defaults to {}", path.display());
        Ok(settings)
    }
}

pub fn save_settings(path: &Path, settings: &SimSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {}", e))?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
}
