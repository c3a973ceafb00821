//! App settings — a small JSON file next to the rule store.
//!
//! Loading is fail-open: a missing file is written back with defaults, a
//! malformed one is logged and replaced by defaults in memory. Settings
//! must never block the masking/reference features.

use std::path::Path;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::paths::DataPaths;

/// Environment variable taking precedence over the stored API key.
pub const ENV_API_KEY: &str = "SHEET_ASSIST_API_KEY";

/// Persisted application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// API key for the completion provider. Prefer the environment
    /// variable; the file field exists for hosts without one.
    pub api_key: String,
    /// Model identifier passed through to the completion client.
    pub model: String,
    /// Recent-message window included as the transcript excerpt.
    pub max_transcript_messages: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            max_transcript_messages: 20,
        }
    }
}

impl Settings {
    /// Load settings from the data directory.
    ///
    /// A missing file seeds defaults on disk; an unreadable or malformed
    /// file degrades to in-memory defaults without touching the file.
    pub fn load(paths: &DataPaths) -> Self {
        let path = paths.settings_file();
        if !path.exists() {
            let defaults = Self::default();
            if let Err(e) = defaults.save(paths) {
                warn!(error = %e, "Failed to seed default settings");
            } else {
                info!(path = %path.display(), "Seeded default settings");
            }
            return defaults;
        }

        match read_settings(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                Self::default()
            }
        }
    }

    /// Write settings to the data directory.
    pub fn save(&self, paths: &DataPaths) -> Result<(), ConfigError> {
        let path = paths.settings_file();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Malformed {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| ConfigError::Write { path, source })
    }

    /// Resolve the API key: environment first, then the stored field.
    pub fn api_key(&self) -> Option<SecretString> {
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Some(SecretString::from(key));
            }
        }
        let stored = self.api_key.trim();
        if stored.is_empty() {
            None
        } else {
            Some(SecretString::from(stored.to_string()))
        }
    }
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}
