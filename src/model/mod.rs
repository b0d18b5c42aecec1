//! Canonical document model: types, nodes, validation, canonical bytes,
//! patches, and the structured conflict vocabulary.

pub mod canonical;
pub mod conflict;
pub mod document;
pub mod node;
pub mod patch;
pub mod types;
pub mod validate;
