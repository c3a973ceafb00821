//! RuleStore — persistence for the original→placeholder rule set.
//!
//! The on-disk format is a single flat JSON object mapping each sensitive
//! literal to its placeholder, human-editable. Registration order is the
//! file order and survives reload (the unmask tie-break depends on it).

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// A registered (original literal, placeholder) association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskRule {
    pub original: String,
    pub placeholder: String,
}

/// The full rule set, in registration order.
///
/// The original→placeholder mapping is many-to-one: alias registration
/// binds several originals to one placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<MaskRule>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaskRule> {
        self.rules.iter()
    }

    pub fn contains_original(&self, original: &str) -> bool {
        self.rules.iter().any(|r| r.original == original)
    }

    /// Whether any rule already uses `placeholder` as its value.
    pub fn has_placeholder(&self, placeholder: &str) -> bool {
        self.rules.iter().any(|r| r.placeholder == placeholder)
    }

    pub fn placeholder_for(&self, original: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.original == original)
            .map(|r| r.placeholder.as_str())
    }

    /// Append a rule. The caller is responsible for original-uniqueness.
    pub fn push(&mut self, rule: MaskRule) {
        self.rules.push(rule);
    }

    pub fn to_vec(&self) -> Vec<MaskRule> {
        self.rules.clone()
    }
}

impl FromIterator<MaskRule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = MaskRule>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// File-backed storage for the rule set.
pub struct RuleStore {
    path: PathBuf,
    legacy_path: Option<PathBuf>,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path: None,
        }
    }

    /// Also consult a legacy rules file, copied forward exactly once when
    /// the current location has no rule file yet.
    pub fn with_legacy(path: impl Into<PathBuf>, legacy_path: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the rule set.
    ///
    /// A missing file yields an empty set (`Ok`); only an unreadable or
    /// malformed file is an error. Legacy bracket-style placeholders
    /// (`[X]`) are rewritten to the underscore grammar and the migrated
    /// set is re-saved immediately.
    pub fn load(&self) -> Result<RuleSet, StoreError> {
        self.copy_forward_legacy();

        if !self.path.exists() {
            debug!(path = %self.path.display(), "No rule file yet, starting empty");
            return Ok(RuleSet::default());
        }

        let json = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let map: serde_json::Map<String, Value> =
            serde_json::from_str(&json).map_err(|source| StoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;

        let mut rules = RuleSet::default();
        let mut migrated = false;
        for (original, value) in map {
            let Value::String(placeholder) = value else {
                return Err(StoreError::InvalidRule {
                    path: self.path.clone(),
                    key: original,
                });
            };
            let placeholder = match migrate_bracket_placeholder(&placeholder) {
                Some(rewritten) => {
                    migrated = true;
                    rewritten
                }
                None => placeholder,
            };
            rules.push(MaskRule {
                original,
                placeholder,
            });
        }

        if migrated {
            info!(path = %self.path.display(), "Rewrote legacy bracket placeholders");
            self.save(&rules)?;
        }

        debug!(count = rules.len(), "Mask rules loaded");
        Ok(rules)
    }

    /// Write the rule set as pretty-printed JSON, in registration order.
    pub fn save(&self, rules: &RuleSet) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let mut map = serde_json::Map::new();
        for rule in rules.iter() {
            map.insert(rule.original.clone(), Value::String(rule.placeholder.clone()));
        }
        let json = serde_json::to_string_pretty(&Value::Object(map)).map_err(|source| {
            StoreError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn copy_forward_legacy(&self) {
        let Some(legacy) = &self.legacy_path else {
            return;
        };
        if self.path.exists() || !legacy.is_file() {
            return;
        }
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::copy(legacy, &self.path) {
            Ok(_) => info!(from = %legacy.display(), "Copied rules forward from legacy location"),
            Err(e) => warn!(from = %legacy.display(), error = %e, "Legacy rules copy failed"),
        }
    }
}

/// Rewrite a legacy `[X]` placeholder to `__X__`; `None` if already current.
fn migrate_bracket_placeholder(placeholder: &str) -> Option<String> {
    if placeholder.len() >= 2 && placeholder.starts_with('[') && placeholder.ends_with(']') {
        let inner = placeholder.trim_matches(|c| c == '[' || c == ']');
        Some(format!("__{inner}__"))
    } else {
        None
    }
}
