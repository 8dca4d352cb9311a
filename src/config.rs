// SPDX-License-Identifier: GPL-3.0-only

//! Persistent application settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::constants::storage;

/// Settings persisted as JSON under the user config directory.
///
/// Loading and saving never fail the application: a missing or corrupt
/// file falls back to defaults, a failed write is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel assignment: true routes the left capture into the red channel
    pub left_is_red: bool,
    /// Camera re-selected on the next launch
    pub last_camera_path: Option<String>,
    /// Folder name under the user's Pictures directory for saved composites
    pub save_folder: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            left_is_red: false,
            last_camera_path: None,
            save_folder: storage::DEFAULT_SAVE_FOLDER.to_string(),
        }
    }
}

impl Config {
    /// Load the config, falling back to defaults when missing or invalid.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            warn!("no config directory available, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "invalid config file, using defaults"
                    );
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read config");
                Self::default()
            }
        }
    }

    /// Persist the config. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = config_path() else {
            warn!("no config directory available, settings not saved");
            return;
        };

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(error = %e, "failed to create config directory");
            return;
        }

        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    warn!(path = %path.display(), error = %e, "failed to write config");
                } else {
                    debug!(path = %path.display(), "saved config");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize config"),
        }
    }
}

/// Path of the settings file under the user config directory.
fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(storage::CONFIG_DIR).join(storage::CONFIG_FILE))
}
