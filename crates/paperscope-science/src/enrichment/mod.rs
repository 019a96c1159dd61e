//! Backfilling missing identifiers through an external lookup.

pub mod service;

use std::time::Duration;

use async_trait::async_trait;
use paperscope_core::IdentifierKind;
use paperscope_core::config::EnrichmentConfig;
use serde::Serialize;
use uuid::Uuid;

pub use service::EnrichmentService;

/// Result of a single lookup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(String),
    /// The service answered and has no value for this record.
    NotFound,
    /// Network trouble, rate limiting or an unreadable answer. Worth retrying.
    Transient(String),
}

/// External service resolving one identifier kind from another.
#[async_trait]
pub trait IdentifierLookup: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, source: &IdentifierKind, target: &IdentifierKind) -> bool;

    async fn lookup(
        &self,
        source: &IdentifierKind,
        value: &str,
        target: &IdentifierKind,
    ) -> LookupOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    pub source: IdentifierKind,
    pub target: IdentifierKind,
    /// Retry records whose previous attempt already settled.
    pub force: bool,
}

impl EnrichmentRequest {
    pub fn new(source: IdentifierKind, target: IdentifierKind) -> Self {
        Self {
            source,
            target,
            force: false,
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentPolicy {
    pub min_interval: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Persist after this many completed lookups. 0 = only at the end.
    pub checkpoint_every: usize,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

impl From<&EnrichmentConfig> for EnrichmentPolicy {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.min_interval_ms),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            checkpoint_every: config.checkpoint_every,
        }
    }
}

/// A found value that another record already carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PossibleDuplicate {
    pub record: Uuid,
    pub other: Uuid,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub found: usize,
    pub not_found: usize,
    /// Gave up after the last retry; still `not_attempted`.
    pub deferred: usize,
    /// Not eligible: target present, source missing, or already settled.
    pub skipped: usize,
    pub interrupted: bool,
    pub possible_duplicates: Vec<PossibleDuplicate>,
}

impl EnrichmentReport {
    pub fn attempted(&self) -> usize {
        self.found + self.not_found + self.deferred
    }
}
