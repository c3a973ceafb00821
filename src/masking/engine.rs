//! MaskingEngine — reversible substitution of sensitive literals.
//!
//! Masking runs as one linear pass through a single alternation pattern
//! over every registered original, longest first, so a short original that
//! is a substring of a longer one never shadows the longer match and a
//! placeholder can never be re-matched by a later rule.
//!
//! Unmasking is lossy: alias registration binds several originals to one
//! placeholder, and the most-recently-registered original wins when
//! restoring.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;
use tracing::{debug, warn};

use super::store::{MaskRule, RuleSet, RuleStore};

/// Category used when registration supplies a blank one.
pub const GENERIC_CATEGORY: &str = "MASK";

struct Inner {
    rules: RuleSet,
    /// Alternation over all originals, longest first. `None` when the rule
    /// set is empty or the pattern failed to compile.
    pattern: Option<Regex>,
}

/// Reversible multi-pattern literal substitution over a persisted rule set.
///
/// Rule mutations and persistence form one critical section behind the
/// write lock; `mask`/`unmask` are shared reads.
pub struct MaskingEngine {
    store: RuleStore,
    inner: RwLock<Inner>,
}

impl MaskingEngine {
    /// Open the engine over a rule store, loading persisted rules.
    ///
    /// Load failures are logged and degrade to an empty rule set so the
    /// rest of the app keeps working (fail-open).
    pub fn open(store: RuleStore) -> Self {
        let rules = match store.load() {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Failed to load mask rules, starting with an empty set");
                RuleSet::default()
            }
        };
        let pattern = compile_pattern(&rules);
        Self {
            store,
            inner: RwLock::new(Inner { rules, pattern }),
        }
    }

    /// Register a new original under a category.
    ///
    /// Returns the generated placeholder, or `None` when the original is
    /// blank or already registered. The placeholder is the lowest-numbered
    /// `__CATEGORY_N__` not yet used as a value.
    pub fn add_rule(&self, original: &str, category: &str) -> Option<String> {
        if original.trim().is_empty() {
            return None;
        }
        let mut inner = self.inner.write().expect("rule lock poisoned");
        if inner.rules.contains_original(original) {
            return None;
        }

        let category = normalize_category(category);
        let mut n = 1u32;
        let placeholder = loop {
            let candidate = format!("__{category}_{n}__");
            if !inner.rules.has_placeholder(&candidate) {
                break candidate;
            }
            n += 1;
        };

        inner.rules.push(MaskRule {
            original: original.to_string(),
            placeholder: placeholder.clone(),
        });
        inner.pattern = compile_pattern(&inner.rules);
        self.persist(&inner.rules);
        debug!(placeholder = %placeholder, "Mask rule added");
        Some(placeholder)
    }

    /// Bind a new original to an existing placeholder (variant spelling).
    ///
    /// No uniqueness check on the placeholder: the map becomes many-to-one
    /// on purpose. Returns false when either argument is blank or the
    /// original is already registered.
    pub fn add_rule_with_placeholder(&self, original: &str, placeholder: &str) -> bool {
        if original.trim().is_empty() || placeholder.trim().is_empty() {
            return false;
        }
        let mut inner = self.inner.write().expect("rule lock poisoned");
        if inner.rules.contains_original(original) {
            return false;
        }
        inner.rules.push(MaskRule {
            original: original.to_string(),
            placeholder: placeholder.to_string(),
        });
        inner.pattern = compile_pattern(&inner.rules);
        self.persist(&inner.rules);
        debug!(placeholder = placeholder, "Alias rule added");
        true
    }

    /// Replace every registered original with its placeholder.
    pub fn mask(&self, text: &str) -> String {
        if text.is_empty() {
            return text.to_string();
        }
        let inner = self.inner.read().expect("rule lock poisoned");
        let Some(pattern) = &inner.pattern else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let matched = &caps[0];
                inner
                    .rules
                    .placeholder_for(matched)
                    .unwrap_or(matched)
                    .to_string()
            })
            .into_owned()
    }

    /// Replace every placeholder occurrence with an original.
    ///
    /// Placeholders are processed longest first. Where several originals
    /// share a placeholder, the most recently registered one is restored.
    pub fn unmask(&self, text: &str) -> String {
        if text.is_empty() {
            return text.to_string();
        }
        let inner = self.inner.read().expect("rule lock poisoned");
        if inner.rules.is_empty() {
            return text.to_string();
        }

        // Later registrations overwrite earlier ones: last writer wins.
        let mut reverse: HashMap<&str, &str> = HashMap::new();
        for rule in inner.rules.iter() {
            reverse.insert(rule.placeholder.as_str(), rule.original.as_str());
        }
        let mut pairs: Vec<(&str, &str)> = reverse.into_iter().collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

        let mut output = text.to_string();
        for (placeholder, original) in pairs {
            output = output.replace(placeholder, original);
        }
        output
    }

    /// Snapshot of all rules, in registration order.
    pub fn all_rules(&self) -> Vec<MaskRule> {
        self.inner.read().expect("rule lock poisoned").rules.to_vec()
    }

    pub fn rule_count(&self) -> usize {
        self.inner.read().expect("rule lock poisoned").rules.len()
    }

    /// Atomically replace the whole rule set (rule-editor save path).
    ///
    /// This is the only mutation that can remove rules.
    pub fn override_rules(&self, rules: RuleSet) {
        let mut inner = self.inner.write().expect("rule lock poisoned");
        inner.pattern = compile_pattern(&rules);
        inner.rules = rules;
        self.persist(&inner.rules);
        debug!(count = inner.rules.len(), "Rule set replaced");
    }

    /// Distinct placeholders with the first original bound to each, sorted
    /// by placeholder. Feeds the alias-registration picker.
    pub fn placeholders_with_example(&self) -> Vec<(String, String)> {
        let inner = self.inner.read().expect("rule lock poisoned");
        let mut out: Vec<(String, String)> = Vec::new();
        for rule in inner.rules.iter() {
            if !out.iter().any(|(p, _)| p == &rule.placeholder) {
                out.push((rule.placeholder.clone(), rule.original.clone()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn persist(&self, rules: &RuleSet) {
        if let Err(e) = self.store.save(rules) {
            warn!(error = %e, "Failed to persist mask rules");
        }
    }
}

/// `__CATEGORY_N__` → `CATEGORY`, or `None` for anything off-grammar.
pub fn placeholder_category(placeholder: &str) -> Option<&str> {
    let inner = placeholder.strip_prefix("__")?.strip_suffix("__")?;
    let (category, n) = inner.rsplit_once('_')?;
    if category.is_empty() || n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(category)
}

fn normalize_category(raw: &str) -> String {
    let cleaned: Vec<&str> = raw.split_whitespace().collect();
    if cleaned.is_empty() {
        return GENERIC_CATEGORY.to_string();
    }
    cleaned.join("_").to_uppercase()
}

fn compile_pattern(rules: &RuleSet) -> Option<Regex> {
    if rules.is_empty() {
        return None;
    }
    let mut originals: Vec<&str> = rules.iter().map(|r| r.original.as_str()).collect();
    // Longest first; the alternation prefers earlier branches, so this is
    // what gives longer originals precedence at the same position.
    originals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = originals
        .iter()
        .map(|o| regex::escape(o))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&alternation) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(error = %e, "Failed to compile mask pattern, masking disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> (tempfile::TempDir, MaskingEngine) {
        let tmp = tempfile::tempdir().unwrap();
        let store = RuleStore::new(tmp.path().join("rules.json"));
        (tmp, MaskingEngine::open(store))
    }

    #[test]
    fn mask_is_identity_with_no_rules() {
        let (_tmp, engine) = test_engine();
        assert_eq!(engine.mask("nothing to hide"), "nothing to hide");
        assert_eq!(engine.unmask("nothing to hide"), "nothing to hide");
    }

    #[test]
    fn mask_unmask_roundtrip() {
        let (_tmp, engine) = test_engine();
        engine.add_rule("Alice", "person").unwrap();
        engine.add_rule("Acme Corp", "company").unwrap();

        let masked = engine.mask("Alice works at Acme Corp.");
        assert_eq!(masked, "__PERSON_1__ works at __COMPANY_1__.");
        assert_eq!(engine.unmask(&masked), "Alice works at Acme Corp.");
    }

    #[test]
    fn placeholder_numbering_picks_smallest_free() {
        let (_tmp, engine) = test_engine();
        assert_eq!(engine.add_rule("Alice", "person").unwrap(), "__PERSON_1__");
        assert_eq!(engine.add_rule("Bob", "person").unwrap(), "__PERSON_2__");
        assert_eq!(engine.add_rule("Carol", "PLACE").unwrap(), "__PLACE_1__");
    }

    #[test]
    fn category_is_normalized() {
        let (_tmp, engine) = test_engine();
        assert_eq!(
            engine.add_rule("Acme", "  client  name ").unwrap(),
            "__CLIENT_NAME_1__"
        );
        assert_eq!(engine.add_rule("Widget", "").unwrap(), "__MASK_1__");
    }

    #[test]
    fn duplicate_registration_is_a_noop() {
        let (_tmp, engine) = test_engine();
        let first = engine.add_rule("Alice", "person").unwrap();
        assert!(engine.add_rule("Alice", "company").is_none());
        assert_eq!(engine.all_rules().len(), 1);
        assert_eq!(engine.all_rules()[0].placeholder, first);
    }

    #[test]
    fn blank_original_is_a_noop() {
        let (_tmp, engine) = test_engine();
        assert!(engine.add_rule("   ", "person").is_none());
        assert!(!engine.add_rule_with_placeholder("", "__PERSON_1__"));
        assert!(!engine.add_rule_with_placeholder("Alice", "  "));
        assert_eq!(engine.rule_count(), 0);
    }

    #[test]
    fn longest_match_wins() {
        let (_tmp, engine) = test_engine();
        engine.add_rule("Bob", "person").unwrap();
        engine.add_rule("Bob Smith", "person").unwrap();

        let masked = engine.mask("Bob Smith called Bob");
        assert_eq!(masked, "__PERSON_2__ called __PERSON_1__");
    }

    #[test]
    fn aliases_share_a_placeholder_and_last_bound_wins_on_unmask() {
        let (_tmp, engine) = test_engine();
        let placeholder = engine.add_rule("Jon", "person").unwrap();
        assert!(engine.add_rule_with_placeholder("John", &placeholder));

        assert_eq!(engine.mask("Jon and John"), "__PERSON_1__ and __PERSON_1__");
        // Unmask restores the most recently registered spelling.
        assert_eq!(engine.unmask("__PERSON_1__"), "John");
    }

    #[test]
    fn alias_numbering_skips_nothing_but_stays_unique_at_creation() {
        let (_tmp, engine) = test_engine();
        let p1 = engine.add_rule("Jon", "person").unwrap();
        engine.add_rule_with_placeholder("John", &p1);
        // The next generated person placeholder must not collide with P1.
        assert_eq!(engine.add_rule("Mary", "person").unwrap(), "__PERSON_2__");
    }

    #[test]
    fn override_rules_replaces_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rules.json");
        let engine = MaskingEngine::open(RuleStore::new(&path));
        engine.add_rule("Alice", "person").unwrap();
        engine.add_rule("Bob", "person").unwrap();

        let kept: RuleSet = engine
            .all_rules()
            .into_iter()
            .filter(|r| r.original == "Alice")
            .collect();
        engine.override_rules(kept);

        assert_eq!(engine.rule_count(), 1);
        assert_eq!(engine.mask("Bob"), "Bob");

        // Removal reached the disk too.
        let reloaded = MaskingEngine::open(RuleStore::new(&path));
        assert_eq!(reloaded.rule_count(), 1);
    }

    #[test]
    fn rules_survive_restart_in_registration_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rules.json");
        {
            let engine = MaskingEngine::open(RuleStore::new(&path));
            let p = engine.add_rule("Jon", "person").unwrap();
            engine.add_rule_with_placeholder("John", &p);
        }
        let engine = MaskingEngine::open(RuleStore::new(&path));
        // Last-bound-wins is stable across restarts.
        assert_eq!(engine.unmask("__PERSON_1__"), "John");
    }

    #[test]
    fn placeholders_with_example_lists_first_binding() {
        let (_tmp, engine) = test_engine();
        let p = engine.add_rule("Jon", "person").unwrap();
        engine.add_rule_with_placeholder("John", &p);
        engine.add_rule("Acme", "company").unwrap();

        let listing = engine.placeholders_with_example();
        assert_eq!(
            listing,
            vec![
                ("__COMPANY_1__".to_string(), "Acme".to_string()),
                ("__PERSON_1__".to_string(), "Jon".to_string()),
            ]
        );
    }

    #[test]
    fn placeholder_category_parses_the_grammar() {
        assert_eq!(placeholder_category("__PERSON_1__"), Some("PERSON"));
        assert_eq!(placeholder_category("__CLIENT_NAME_12__"), Some("CLIENT_NAME"));
        assert_eq!(placeholder_category("__PERSON__"), None);
        assert_eq!(placeholder_category("PERSON_1"), None);
        assert_eq!(placeholder_category("__PERSON_x__"), None);
    }

    #[test]
    fn masking_special_characters_in_originals() {
        let (_tmp, engine) = test_engine();
        engine.add_rule("a.b (c)", "code").unwrap();
        assert_eq!(engine.mask("see a.b (c) here"), "see __CODE_1__ here");
        // The dot must not behave as a wildcard.
        assert_eq!(engine.mask("aXb (c)"), "aXb (c)");
    }
}
