//! Persistent data locations.
//!
//! Everything the add-in persists lives under one data directory:
//! - `rules.json` — masking rules
//! - `config.json` — app settings
//! - `templates.json` — prompt templates
//! - `sessions/` — one JSON file per chat session
//!
//! The directory is resolved once: the `SHEET_ASSIST_DATA_DIR` environment
//! variable wins, otherwise the platform data dir. Files left behind by the
//! predecessor app are copied forward on first use.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "SHEET_ASSIST_DATA_DIR";

const DEFAULT_DIR_NAME: &str = "sheet-assist";

/// Data directory of the predecessor app, consulted for one-time migration.
const LEGACY_DIR_NAME: &str = "sheet-chat";

const RULES_FILE: &str = "rules.json";
const SETTINGS_FILE: &str = "config.json";
const TEMPLATES_FILE: &str = "templates.json";
const SESSIONS_DIR: &str = "sessions";

/// Resolved locations of all persisted files.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Resolve the data directory from the environment and platform defaults.
    pub fn resolve() -> Self {
        Self {
            root: resolve_root(std::env::var_os(ENV_DATA_DIR)),
        }
    }

    /// Use an explicit root directory (tests, embedded hosts).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules_file(&self) -> PathBuf {
        self.root.join(RULES_FILE)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn templates_file(&self) -> PathBuf {
        self.root.join(TEMPLATES_FILE)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    /// Rules file in the predecessor's data directory, if that exists.
    ///
    /// The rule store copies it forward exactly once when the current
    /// location has no rule file yet.
    pub fn legacy_rules_file(&self) -> Option<PathBuf> {
        let legacy = legacy_root()?;
        if legacy == self.root {
            return None;
        }
        Some(legacy.join(RULES_FILE))
    }

    /// Create the directory tree and migrate predecessor files.
    ///
    /// Best-effort: failures are logged and never raised, so a read-only
    /// disk degrades to in-memory operation instead of blocking startup.
    pub fn ensure(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.root) {
            warn!(path = %self.root.display(), error = %e, "Failed to create data directory");
            return;
        }
        if let Err(e) = std::fs::create_dir_all(self.sessions_dir()) {
            warn!(error = %e, "Failed to create sessions directory");
        }
        self.migrate_legacy_dir();
    }

    /// Copy settings/templates forward from the predecessor's directory.
    ///
    /// Skipped entirely once any current-generation file exists, so the
    /// migration runs at most once.
    fn migrate_legacy_dir(&self) {
        let Some(legacy) = legacy_root() else {
            return;
        };
        if legacy == self.root || !legacy.is_dir() {
            return;
        }
        if self.rules_file().exists()
            || self.settings_file().exists()
            || self.templates_file().exists()
        {
            return;
        }

        // rules.json is migrated by the rule store itself (it also handles
        // the placeholder-format rewrite); only the rest moves here.
        for name in [SETTINGS_FILE, TEMPLATES_FILE] {
            let src = legacy.join(name);
            let dst = self.root.join(name);
            if !src.is_file() || dst.exists() {
                continue;
            }
            match std::fs::copy(&src, &dst) {
                Ok(_) => info!(file = name, "Migrated file from legacy data directory"),
                Err(e) => warn!(file = name, error = %e, "Legacy file migration failed"),
            }
        }
    }
}

fn resolve_root(env_override: Option<OsString>) -> PathBuf {
    if let Some(dir) = env_override {
        let trimmed = dir.to_string_lossy().trim().to_string();
        if !trimmed.is_empty() {
            debug!(path = %trimmed, "Using data directory from environment");
            return PathBuf::from(trimmed);
        }
    }
    platform_data_dir().join(DEFAULT_DIR_NAME)
}

fn legacy_root() -> Option<PathBuf> {
    Some(platform_data_dir().join(LEGACY_DIR_NAME))
}

fn platform_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}
