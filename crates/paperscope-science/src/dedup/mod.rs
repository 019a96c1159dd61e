//! Merging per-source search hits into one canonical dataset.

pub mod engine;
pub mod input;

pub use engine::{
    ConflictReason, MergeEngine, MergeOutcome, MergeStats, MergeWarning, normalize_title,
};
pub use input::{MergeInput, RawHit, SourceBatch, parse_merge_input};
