// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{SessionPreset, StillImageCodec};
use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, SESSION_QUEUE_NAME};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Session manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resolution preset applied when the session is configured
    pub preset: SessionPreset,
    /// Add the default microphone as a best-effort input
    pub capture_audio: bool,
    /// Codec of the still image output
    pub still_image_codec: StillImageCodec,
    /// Lock exposure once the device settles after a tap-to-expose
    pub lock_exposure_after_tap: bool,
    /// Thread name of the session queue
    pub queue_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preset: SessionPreset::High,
            capture_audio: true,
            still_image_codec: StillImageCodec::Jpeg,
            lock_exposure_after_tap: true,
            queue_name: SESSION_QUEUE_NAME.to_string(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults
    ///
    /// A missing file is silent; an unreadable or malformed one is logged.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Using default config");
                Self::default()
            }
        }
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Write to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }
}
