//! Inline reference tag grammar.
//!
//! Input form: `@range(<sheet>,<address>)` — keyword case-insensitive,
//! whitespace around the separators tolerated, sheet and address free text
//! up to the next comma or closing parenthesis. Outbound form:
//! `@range_ref(#R<n>)`. Anything off-grammar is inert and passes through.

use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)@range\(\s*([^,()]+?)\s*,\s*([^,()]+?)\s*\)").unwrap()
    })
}

/// Composite identifier of one external data block: `sheet!address`.
///
/// Equality is case-insensitive; the first-seen spelling is kept for
/// display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeKey {
    sheet: String,
    address: String,
}

impl RangeKey {
    /// Build a key from its parts; `None` when either side is blank.
    pub fn new(sheet: &str, address: &str) -> Option<Self> {
        let sheet = sheet.trim();
        let address = address.trim();
        if sheet.is_empty() || address.is_empty() {
            return None;
        }
        Some(Self {
            sheet: sheet.to_string(),
            address: address.to_string(),
        })
    }

    /// Parse a `sheet!address` label (the form target labels arrive in).
    pub fn parse(label: &str) -> Option<Self> {
        let (sheet, address) = label.split_once('!')?;
        Self::new(sheet, address)
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Case-folded identity used for deduplication and lookup.
    pub fn canonical(&self) -> String {
        format!("{}!{}", self.sheet, self.address).to_lowercase()
    }
}

impl fmt::Display for RangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.address)
    }
}

/// The rewritten outbound form for a resolved reference.
pub fn ref_tag(ref_id: &str) -> String {
    format!("@range_ref(#{ref_id})")
}

/// Collect every well-formed tag's key, left to right, duplicates included.
pub fn scan_tags(text: &str) -> Vec<RangeKey> {
    tag_regex()
        .captures_iter(text)
        .filter_map(|caps| RangeKey::new(&caps[1], &caps[2]))
        .collect()
}

/// Rewrite each resolvable tag to its `@range_ref(#Rn)` form.
///
/// `resolve` maps a key to its reference id (e.g. `R1`); tags it declines
/// are left exactly as written.
pub fn rewrite_tags<F>(text: &str, resolve: F) -> String
where
    F: Fn(&RangeKey) -> Option<String>,
{
    tag_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            RangeKey::new(&caps[1], &caps[2])
                .and_then(|key| resolve(&key))
                .map(|ref_id| ref_tag(&ref_id))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
