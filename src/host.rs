//! Host spreadsheet boundary.
//!
//! The host application is an external collaborator; the core only sees
//! this trait. Implementations must be cheap, synchronous, and must not
//! reach back into resolver state.

use crate::reference::tags::RangeKey;

/// Read-only access to the host's tabular data, plus selection control.
pub trait SheetDataSource: Send + Sync {
    /// Raw text of the block named by `key` — rows separated by newlines,
    /// cells by tabs. `None` when the host has nothing for the key.
    fn range_text(&self, key: &RangeKey) -> Option<String>;

    /// Move the host's visible selection to the range. Default no-op for
    /// hosts without a selection concept.
    fn select_range(&self, _key: &RangeKey) {}
}

/// In-memory data source (tests, hosts without a live sheet).
#[derive(Debug, Default)]
pub struct StaticSheetData {
    blocks: std::collections::HashMap<String, String>,
}

impl StaticSheetData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data block under a `sheet!address` label.
    pub fn insert(&mut self, label: &str, text: &str) {
        if let Some(key) = RangeKey::parse(label) {
            self.blocks.insert(key.canonical(), text.to_string());
        }
    }
}

impl SheetDataSource for StaticSheetData {
    fn range_text(&self, key: &RangeKey) -> Option<String> {
        self.blocks.get(&key.canonical()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_source_is_case_insensitive() {
        let mut data = StaticSheetData::new();
        data.insert("Sheet1!A1", "42");

        let key = RangeKey::parse("SHEET1!a1").unwrap();
        assert_eq!(data.range_text(&key).as_deref(), Some("42"));

        let missing = RangeKey::parse("Sheet2!A1").unwrap();
        assert!(data.range_text(&missing).is_none());
    }
}
