//! View settings persistence.
//!
//! This module handles loading and saving the viewer's navigation and
//! buffer preferences across sessions.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clock::TICKS_PER_SECOND;

/// Settings that shape how view buffers are built
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewSettings {
    /// Settings file version for migration support
    #[serde(default = "default_version")]
    pub version: u32,

    /// Page duration used when nothing else is requested, in ticks
    #[serde(default = "default_page_time")]
    pub default_page_time: i64,

    /// Page duration a frame falls back to when the buffer would be too
    /// large, in ticks
    #[serde(default = "default_fallback_page_time")]
    pub fallback_page_time: i64,

    /// Override of the view buffer size ceiling, in bytes
    #[serde(default)]
    pub buffer_ceiling: Option<u64>,

    /// Extract filtered traces of different compositions on worker threads
    #[serde(default)]
    pub parallel_traces: bool,
}

fn default_version() -> u32 {
    1
}

fn default_page_time() -> i64 {
    10 * TICKS_PER_SECOND
}

fn default_fallback_page_time() -> i64 {
    TICKS_PER_SECOND
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            version: 1,
            default_page_time: default_page_time(),
            fallback_page_time: default_fallback_page_time(),
            buffer_ceiling: None,
            parallel_traces: false,
        }
    }
}

/// Largest view buffer the platform can address, in bytes
pub fn platform_buffer_ceiling() -> u64 {
    if cfg!(target_pointer_width = "64") {
        u32::MAX as u64 * 32
    } else {
        u32::MAX as u64
    }
}

impl ViewSettings {
    /// The effective buffer ceiling: the override if set, else the
    /// platform limit
    pub fn buffer_ceiling(&self) -> u64 {
        self.buffer_ceiling.unwrap_or_else(platform_buffer_ceiling)
    }

    /// Get the config directory path for edfview
    pub fn get_config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            dirs::data_dir().map(|p| p.join("edfview"))
        }

        #[cfg(target_os = "windows")]
        {
            dirs::config_dir().map(|p| p.join("edfview"))
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs::config_dir().map(|p| p.join("edfview"))
        }
    }

    /// Get the path to the settings JSON file
    pub fn get_settings_path() -> Option<PathBuf> {
        Self::get_config_dir().map(|p| p.join("view_settings.json"))
    }

    /// Load settings from the default location
    pub fn load() -> Self {
        match Self::get_settings_path() {
            Some(p) => Self::load_from(&p),
            None => Self::default(),
        }
    }

    /// Load settings from a file, falling back to defaults if it is
    /// missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), String> {
        let path = Self::get_settings_path().ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&path)
    }

    /// Save settings to a file
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, content).map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }
}
