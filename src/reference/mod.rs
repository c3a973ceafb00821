//! Stable reference resolution for externally-sourced data blocks.

pub mod resolver;
pub mod tags;

pub use resolver::{BuiltPayload, NO_TARGET, ReferenceEntry, ReferenceResolver};
pub use tags::RangeKey;
