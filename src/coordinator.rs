//! ChatCoordinator — masking → send → history in one place.
//!
//! The coordinator is the consumer of the core contract: it assembles the
//! outbound payload from the resolver, hands it to the completion client,
//! restores the reply with `unmask`, and records both forms in the
//! session history. Reference ids in the reply (the service echoes them
//! verbatim) are left alone — they are sender-side bookkeeping.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm::{CompletionClient, SYSTEM_PREAMBLE};
use crate::masking::MaskingEngine;
use crate::reference::{BuiltPayload, ReferenceResolver};
use crate::session::{ChatMessage, ChatSession, SessionStore, render_transcript};
use crate::settings::Settings;

pub struct ChatCoordinator {
    masking: Arc<MaskingEngine>,
    resolver: Arc<ReferenceResolver>,
    sessions: SessionStore,
    settings: Settings,
    client: Arc<dyn CompletionClient>,
    session: Mutex<ChatSession>,
}

impl ChatCoordinator {
    pub fn new(
        masking: Arc<MaskingEngine>,
        resolver: Arc<ReferenceResolver>,
        sessions: SessionStore,
        settings: Settings,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        let session = sessions.create_new();
        Self {
            masking,
            resolver,
            sessions,
            settings,
            client,
            session: Mutex::new(session),
        }
    }

    pub fn session_id(&self) -> String {
        self.lock_session().session_id.clone()
    }

    /// Start a fresh session: history and all reference state reset.
    pub fn new_session(&self) {
        let fresh = self.sessions.create_new();
        info!(session_id = %fresh.session_id, "New session started");
        *self.lock_session() = fresh;
        self.resolver.clear();
    }

    /// Non-mutating payload preview for UI display. Nothing is sent,
    /// nothing is allocated, nothing is stored.
    pub fn preview(&self, input: &str, target_label: Option<&str>) -> BuiltPayload {
        let transcript = self.transcript_excerpt();
        self.resolver
            .build_payload(input, &transcript, target_label, false)
    }

    /// Send one user turn and return the unmasked reply.
    pub async fn send(&self, input: &str, target_label: Option<&str>) -> Result<String> {
        let transcript = self.transcript_excerpt();
        let built = self
            .resolver
            .build_payload(input, &transcript, target_label, true);
        debug!(
            references = built.references.len(),
            bytes = built.text.len(),
            "Payload assembled"
        );

        let model = &self.settings.model;
        let reply_masked = self
            .client
            .complete(SYSTEM_PREAMBLE, &built.text, model)
            .await?;
        let reply = self.masking.unmask(&reply_masked);

        {
            let mut session = self.lock_session();
            session
                .messages
                .push(ChatMessage::user(input, &self.masking.mask(input), model));
            session.messages.push(ChatMessage::assistant(&reply, model));
            if let Err(e) = self.sessions.save(&session) {
                warn!(error = %e, "Failed to persist session history");
            }
        }
        Ok(reply)
    }

    fn transcript_excerpt(&self) -> String {
        let session = self.lock_session();
        render_transcript(session.recent(self.settings.max_transcript_messages))
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, ChatSession> {
        self.session.lock().expect("session lock poisoned")
    }
}
