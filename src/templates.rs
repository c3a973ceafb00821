//! Prompt templates — a user-editable list persisted as one JSON file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;

/// A reusable prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl TemplateEntry {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            id: new_id(),
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// File-backed template list.
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load all templates. Missing or unreadable files yield an empty
    /// list — templates never block the app.
    pub fn load_all(&self) -> Vec<TemplateEntry> {
        if !self.path.exists() {
            return Vec::new();
        }
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read templates");
                return Vec::new();
            }
        };
        match serde_json::from_str(&json) {
            Ok(list) => list,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed templates file");
                Vec::new()
            }
        }
    }

    pub fn save_all(&self, templates: &[TemplateEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let json =
            serde_json::to_string_pretty(templates).map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        std::fs::write(&self.path, json).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
