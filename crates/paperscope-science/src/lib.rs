//! Paperscope Science: merge and dedup, identifier enrichment, PubMed lookup, export.

pub mod dedup;
pub mod enrichment;
pub mod error;
pub mod export;
pub mod formats;
pub mod http;
pub mod identifiers;
pub mod sources;

pub use dedup::{MergeEngine, MergeInput, MergeOutcome, MergeWarning, SourceBatch, parse_merge_input};
pub use enrichment::{
    EnrichmentPolicy, EnrichmentReport, EnrichmentRequest, EnrichmentService, IdentifierLookup,
    LookupOutcome,
};
pub use error::{Result, ScienceError};
pub use export::{CitationEntry, Export, ExportFilter, ExportRow, ExportSummary, Exporter};
pub use sources::PubmedLookup;
