//! ReferenceResolver — stable short ids for external data blocks across a
//! multi-turn conversation.
//!
//! Every key keeps the same `R<n>` id for the life of the session once
//! allocated. The receiving service is stateless, so a referenced block's
//! data is re-emitted on every build that mentions its key; the sent-marker
//! set is bookkeeping only and never gates inclusion.
//!
//! One mutex owns the session state. Commit builds and clears serialize on
//! it; preview builds clone the state under the same lock, so a preview can
//! never leak a partial allocation into a later commit.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::tags::{self, RangeKey};
use crate::host::SheetDataSource;
use crate::masking::MaskingEngine;

/// Marker emitted in the target section when no explicit target applies.
pub const NO_TARGET: &str = "none";

/// A key's allocated reference id within the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    /// First-seen spelling of the key.
    pub key: String,
    /// Session-scoped id: `R1`, `R2`, …
    pub ref_id: String,
}

/// Per-session reference state.
#[derive(Debug, Clone, Default)]
struct SessionRefs {
    /// canonical key → entry
    entries: HashMap<String, ReferenceEntry>,
    next_id: u32,
    /// Ids included in at least one committed payload.
    sent: HashSet<String>,
    /// Raised by `clear()`, lowered by the next non-blank input: an
    /// implicit selection label must not leak data right after a reset.
    suppress_target: bool,
}

impl SessionRefs {
    fn resolve(&mut self, key: &RangeKey) -> ReferenceEntry {
        let canonical = key.canonical();
        if let Some(entry) = self.entries.get(&canonical) {
            return entry.clone();
        }
        self.next_id += 1;
        let entry = ReferenceEntry {
            key: key.to_string(),
            ref_id: format!("R{}", self.next_id),
        };
        self.entries.insert(canonical, entry.clone());
        entry
    }
}

/// The assembled outbound body plus the references it names.
#[derive(Debug, Clone)]
pub struct BuiltPayload {
    pub text: String,
    /// Entries in emission order (input before transcript, left to right).
    pub references: Vec<ReferenceEntry>,
}

/// Resolves inline range tags to session-stable reference ids and builds
/// the reference-annotated, masked payload body.
pub struct ReferenceResolver {
    masking: Arc<MaskingEngine>,
    source: Arc<dyn SheetDataSource>,
    state: Mutex<SessionRefs>,
}

impl ReferenceResolver {
    pub fn new(masking: Arc<MaskingEngine>, source: Arc<dyn SheetDataSource>) -> Self {
        Self {
            masking,
            source,
            state: Mutex::new(SessionRefs::default()),
        }
    }

    /// Build the outbound payload body.
    ///
    /// With `commit` the session state is mutated and each resolved id is
    /// marked sent; without it the whole resolution runs against a copy and
    /// nothing persists (preview semantics).
    pub fn build_payload(
        &self,
        input: &str,
        transcript: &str,
        target_label: Option<&str>,
        commit: bool,
    ) -> BuiltPayload {
        // Collect keys first-seen order: input before transcript, left to
        // right within each, case-insensitive dedup.
        let mut keys: Vec<RangeKey> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for key in tags::scan_tags(input)
            .into_iter()
            .chain(tags::scan_tags(transcript))
        {
            if seen.insert(key.canonical()) {
                keys.push(key);
            }
        }

        let (resolved, suppress_target) = {
            let mut state = self.state.lock().expect("reference state lock poisoned");
            let mut scratch;
            let refs: &mut SessionRefs = if commit {
                &mut *state
            } else {
                scratch = state.clone();
                &mut scratch
            };

            if !input.trim().is_empty() {
                refs.suppress_target = false;
            }
            let resolved: Vec<ReferenceEntry> =
                keys.iter().map(|key| refs.resolve(key)).collect();
            if commit {
                for entry in &resolved {
                    refs.sent.insert(entry.ref_id.clone());
                }
            }
            (resolved, refs.suppress_target)
        };
        debug!(
            commit,
            references = resolved.len(),
            "Resolved payload references"
        );

        let by_canonical: HashMap<String, String> = keys
            .iter()
            .zip(&resolved)
            .map(|(key, entry)| (key.canonical(), entry.ref_id.clone()))
            .collect();
        let resolve_fn = |key: &RangeKey| by_canonical.get(&key.canonical()).cloned();

        let mut out = String::new();

        if !resolved.is_empty() {
            out.push_str("[references]\n");
            for (key, entry) in keys.iter().zip(&resolved) {
                out.push_str(&format!("#{} = {}\n", entry.ref_id, entry.key));
                // Missing data yields an empty but present block; the build
                // never aborts over a resolution miss.
                let block = self.source.range_text(key).unwrap_or_default();
                let masked = self.mask_block(&block);
                if !masked.is_empty() {
                    out.push_str(&masked);
                    out.push('\n');
                }
                out.push('\n');
            }
        }

        if !transcript.trim().is_empty() {
            let rewritten = tags::rewrite_tags(transcript, resolve_fn);
            out.push_str("[transcript]\n");
            out.push_str(self.masking.mask(&rewritten).trim_end());
            out.push_str("\n\n");
        }

        let rewritten_input = tags::rewrite_tags(input, resolve_fn);
        out.push_str("[input]\n");
        out.push_str(self.masking.mask(&rewritten_input).trim_end());
        out.push_str("\n\n");

        // The explicit target label is only emitted when its key was
        // referenced somewhere visible; an implicit current-selection label
        // must not smuggle in data the user never mentioned.
        let target = if suppress_target {
            None
        } else {
            target_label
                .and_then(RangeKey::parse)
                .filter(|key| seen.contains(&key.canonical()))
        };
        out.push_str("[target]\n");
        match target {
            Some(key) => {
                out.push_str(&key.to_string());
                out.push('\n');
            }
            None => {
                out.push_str(NO_TARGET);
                out.push('\n');
            }
        }

        BuiltPayload {
            text: out,
            references: resolved,
        }
    }

    /// Reset all reference state for a fresh session.
    ///
    /// Ids are reallocated from `R1` afterwards, and the implicit target
    /// fallback stays suppressed until the user types something new.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("reference state lock poisoned");
        *state = SessionRefs {
            suppress_target: true,
            ..Default::default()
        };
        debug!("Reference state cleared");
    }

    /// Snapshot of allocated entries, in allocation order.
    pub fn entries(&self) -> Vec<ReferenceEntry> {
        let state = self.state.lock().expect("reference state lock poisoned");
        let mut entries: Vec<ReferenceEntry> = state.entries.values().cloned().collect();
        entries.sort_by_key(|e| ref_number(&e.ref_id));
        entries
    }

    /// Ids that have appeared in at least one committed payload.
    pub fn sent_ref_ids(&self) -> Vec<String> {
        let state = self.state.lock().expect("reference state lock poisoned");
        let mut ids: Vec<String> = state.sent.iter().cloned().collect();
        ids.sort_by_key(|id| ref_number(id));
        ids
    }

    /// Mask a data block cell by cell when it is tabular, whole otherwise.
    fn mask_block(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        if raw.lines().any(|line| line.contains('\t')) {
            raw.lines()
                .map(|line| {
                    line.split('\t')
                        .map(|cell| self.masking.mask(cell))
                        .collect::<Vec<_>>()
                        .join("\t")
                })
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            self.masking.mask(raw)
        }
    }
}

fn ref_number(ref_id: &str) -> u32 {
    ref_id
        .strip_prefix('R')
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}
