//! Reversible masking of sensitive literals behind stable placeholders.

pub mod engine;
pub mod store;

pub use engine::{GENERIC_CATEGORY, MaskingEngine, placeholder_category};
pub use store::{MaskRule, RuleSet, RuleStore};
