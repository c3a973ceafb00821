//! Chat session history — one JSON file per session.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a conversation.
///
/// User turns keep both the raw text and the masked form actually sent;
/// assistant turns keep the (already unmasked) reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub masked: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default)]
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
}

impl ChatMessage {
    pub fn user(raw: &str, masked: &str, model: &str) -> Self {
        Self {
            role: Role::User,
            raw: raw.to_string(),
            masked: masked.to_string(),
            content: String::new(),
            sent: true,
            sent_at: Some(Utc::now()),
            model: model.to_string(),
        }
    }

    pub fn assistant(content: &str, model: &str) -> Self {
        Self {
            role: Role::Assistant,
            raw: String::new(),
            masked: String::new(),
            content: content.to_string(),
            sent: false,
            sent_at: None,
            model: model.to_string(),
        }
    }

    /// The text this turn contributes to an outbound transcript: the
    /// masked form for user turns, the reply for assistant turns.
    pub fn outbound_text(&self) -> &str {
        match self.role {
            Role::User => &self.masked,
            Role::Assistant => &self.content,
        }
    }
}

/// A whole conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// The most recent `max` messages (all of them when fewer).
    pub fn recent(&self, max: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(max.max(1));
        &self.messages[start..]
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Render messages as the transcript excerpt scanned for reference tags.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{role}: {}", m.outbound_text())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// File-per-session storage under the data directory.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create and immediately persist a fresh session.
    pub fn create_new(&self) -> ChatSession {
        let session = ChatSession::new();
        if let Err(e) = self.save(&session) {
            warn!(error = %e, "Failed to persist new session");
        }
        debug!(session_id = %session.session_id, "Session created");
        session
    }

    pub fn save(&self, session: &ChatSession) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.session_file(&session.session_id);
        let json = serde_json::to_string_pretty(session).map_err(|source| {
            StoreError::Malformed {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, json).map_err(|source| StoreError::Write { path, source })
    }

    /// Load a session by id; `None` when no such file exists.
    pub fn load(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        let path = self.session_file(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        let session =
            serde_json::from_str(&json).map_err(|source| StoreError::Malformed { path, source })?;
        Ok(Some(session))
    }

    /// Ids of all stored sessions, sorted. Unreadable entries are skipped.
    pub fn list_ids(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        ids.sort();
        ids
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}
