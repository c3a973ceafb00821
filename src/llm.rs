//! Completion client boundary.
//!
//! The network client that carries masked payloads to the text-generation
//! service is an external collaborator; the core only sees this trait.
//! Transport, retries, and authentication live on the other side of it.

use async_trait::async_trait;

use crate::error::CompletionError;

/// System instruction sent ahead of every payload. The service must never
/// touch the `__…__` identifiers or the reply becomes un-restorable.
pub const SYSTEM_PREAMBLE: &str = "\
You are the chat engine of a spreadsheet add-in.
Follow these rules strictly:
1. Reply in plain text. No markdown.
2. Never delete, alter, or reformat identifiers wrapped in double \
underscores (for example __PERSON_1__). Echo them exactly as given.";

/// A stateless completion endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Send one payload and return the raw completion text.
    ///
    /// The payload is already masked; the caller restores the reply with
    /// `MaskingEngine::unmask`. Reference ids are sender-side bookkeeping
    /// and come back verbatim, never unmasked.
    async fn complete(
        &self,
        system: &str,
        payload: &str,
        model: &str,
    ) -> Result<String, CompletionError>;
}
