use std::future::Future;
use std::path::Path;

use paperscope_core::storage::{DatasetStore, FileStore, load_dataset, write_backup};
use paperscope_core::{Dataset, EnrichmentStatus, IdentifierKind};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{
    EnrichmentPolicy, EnrichmentReport, EnrichmentRequest, IdentifierLookup, LookupOutcome,
    PossibleDuplicate,
};
use crate::error::{Result, ScienceError};
use crate::http::{Pacer, backoff_delay};

/// How one record's lookup ended after retries.
enum Attempt {
    Found(String),
    NotFound,
    Deferred(String),
}

/// Runs one lookup per eligible record, one at a time, paced and retried.
pub struct EnrichmentService<L> {
    lookup: L,
    policy: EnrichmentPolicy,
    pacer: Pacer,
}

impl<L: IdentifierLookup> EnrichmentService<L> {
    pub fn new(lookup: L, policy: EnrichmentPolicy) -> Self {
        let pacer = Pacer::new(policy.min_interval);
        Self {
            lookup,
            policy,
            pacer,
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn policy(&self) -> &EnrichmentPolicy {
        &self.policy
    }

    fn ensure_supported(&self, request: &EnrichmentRequest) -> Result<()> {
        if request.source == request.target
            || !self.lookup.supports(&request.source, &request.target)
        {
            return Err(ScienceError::UnsupportedLookup {
                lookup: self.lookup.name().to_string(),
                source_kind: request.source.clone(),
                target: request.target.clone(),
            });
        }
        Ok(())
    }

    /// Enrich a dataset file in place. A `<stem>_backup.<ext>` copy of the
    /// current file is written before anything else touches it.
    pub async fn enrich_file<F>(
        &self,
        path: &Path,
        request: &EnrichmentRequest,
        shutdown: F,
    ) -> Result<EnrichmentReport>
    where
        F: Future<Output = ()>,
    {
        self.ensure_supported(request)?;
        let mut dataset = load_dataset(path)?;
        let backup = write_backup(path)?;
        info!(backup = %backup.display(), "backup written");

        let mut store = FileStore::new(path);
        self.enrich(&mut dataset, request, &mut store, shutdown).await
    }

    /// Enrich `dataset`, persisting through `store` at checkpoints and at the
    /// end. When `shutdown` resolves the in-flight lookup is dropped and the
    /// state up to the last completed lookup is saved.
    pub async fn enrich<S, F>(
        &self,
        dataset: &mut Dataset,
        request: &EnrichmentRequest,
        mut store: S,
        shutdown: F,
    ) -> Result<EnrichmentReport>
    where
        S: DatasetStore,
        F: Future<Output = ()>,
    {
        self.ensure_supported(request)?;
        let target = &request.target;
        let source = &request.source;

        let mut report = EnrichmentReport::default();
        let mut dirty = false;

        if request.force {
            let mut reset = 0usize;
            for record in dataset.records.iter_mut() {
                if !record.identifiers.contains(target) && record.reset_enrichment(target) {
                    reset += 1;
                }
            }
            if reset > 0 {
                info!(reset, %target, "forced re-enrichment");
                dirty = true;
            }
        }

        tokio::pin!(shutdown);
        let mut completed = 0usize;

        for idx in 0..dataset.len() {
            let record = &dataset.records[idx];
            let value = match record.identifiers.get(source) {
                Some(value)
                    if !record.identifiers.contains(target)
                        && record.enrichment_status(target) == EnrichmentStatus::NotAttempted =>
                {
                    value.to_string()
                }
                _ => {
                    report.skipped += 1;
                    continue;
                }
            };

            let attempt = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                attempt = self.resolve(request, &value) => Some(attempt),
            };
            let Some(attempt) = attempt else {
                warn!(record = %dataset.records[idx].id, "enrichment interrupted");
                report.interrupted = true;
                break;
            };

            let changed = match attempt {
                Attempt::Found(raw) => match target.normalize(&raw) {
                    Some(found) => {
                        apply_found(dataset, idx, target, found, &mut report);
                        true
                    }
                    None => {
                        warn!(%target, %value, "lookup returned an empty value");
                        dataset.records[idx]
                            .settle_enrichment(target.clone(), EnrichmentStatus::NotFound);
                        report.not_found += 1;
                        true
                    }
                },
                Attempt::NotFound => {
                    dataset.records[idx]
                        .settle_enrichment(target.clone(), EnrichmentStatus::NotFound);
                    report.not_found += 1;
                    true
                }
                Attempt::Deferred(reason) => {
                    warn!(
                        record = %dataset.records[idx].id,
                        attempts = self.policy.max_attempts,
                        "lookup deferred: {reason}"
                    );
                    report.deferred += 1;
                    false
                }
            };

            dirty |= changed;
            completed += 1;
            self.checkpoint(&mut store, dataset, completed, &mut dirty)?;
        }

        if dirty {
            store.save(dataset)?;
        }
        info!(
            lookup = self.lookup.name(),
            found = report.found,
            not_found = report.not_found,
            deferred = report.deferred,
            skipped = report.skipped,
            interrupted = report.interrupted,
            "enrichment finished"
        );
        Ok(report)
    }

    fn checkpoint<S: DatasetStore>(
        &self,
        store: &mut S,
        dataset: &Dataset,
        completed: usize,
        dirty: &mut bool,
    ) -> Result<()> {
        let every = self.policy.checkpoint_every;
        if *dirty && every > 0 && completed % every == 0 {
            store.save(dataset)?;
            *dirty = false;
            debug!(completed, "enrichment checkpoint saved");
        }
        Ok(())
    }

    async fn resolve(&self, request: &EnrichmentRequest, value: &str) -> Attempt {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.pacer.wait().await;
            match self
                .lookup
                .lookup(&request.source, value, &request.target)
                .await
            {
                LookupOutcome::Found(found) => return Attempt::Found(found),
                LookupOutcome::NotFound => return Attempt::NotFound,
                LookupOutcome::Transient(reason) if attempt >= max_attempts => {
                    return Attempt::Deferred(reason);
                }
                LookupOutcome::Transient(reason) => {
                    let delay = backoff_delay(self.policy.backoff_base, attempt);
                    warn!(value, attempt, ?delay, "transient lookup failure: {reason}");
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn apply_found(
    dataset: &mut Dataset,
    idx: usize,
    target: &IdentifierKind,
    found: String,
    report: &mut EnrichmentReport,
) {
    if let Some(other) = dataset.find_by_identifier(target, &found, Some(idx)) {
        let duplicate = PossibleDuplicate {
            record: dataset.records[idx].id,
            other: dataset.records[other].id,
            value: found.clone(),
        };
        warn!(
            record = %duplicate.record,
            other = %duplicate.other,
            %target,
            value = %found,
            "found identifier already held by another record"
        );
        report.possible_duplicates.push(duplicate);
    }

    let record = &mut dataset.records[idx];
    if let Err(conflict) = record.identifiers.insert(target.clone(), &found) {
        warn!(record = %record.id, "{conflict}");
    }
    record.settle_enrichment(target.clone(), EnrichmentStatus::Found);
    debug!(record = %record.id, %target, value = %found, "identifier found");
    report.found += 1;
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use paperscope_core::storage::{MemoryStore, save_dataset};
    use paperscope_core::Record;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use uuid::Uuid;

    use super::*;

    /// Replays canned outcomes per source value; unscripted values are `NotFound`.
    #[derive(Default)]
    struct ScriptedLookup {
        script: Mutex<HashMap<String, VecDeque<LookupOutcome>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedLookup {
        fn with(mut self, value: &str, outcomes: Vec<LookupOutcome>) -> Self {
            self.script
                .get_mut()
                .unwrap()
                .insert(value.to_string(), outcomes.into());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IdentifierLookup for ScriptedLookup {
        fn name(&self) -> &str {
            "scripted"
        }

        fn supports(&self, source: &IdentifierKind, target: &IdentifierKind) -> bool {
            *source == IdentifierKind::PubmedId && *target == IdentifierKind::Doi
        }

        async fn lookup(
            &self,
            _source: &IdentifierKind,
            value: &str,
            _target: &IdentifierKind,
        ) -> LookupOutcome {
            self.calls.lock().unwrap().push(value.to_string());
            self.script
                .lock()
                .unwrap()
                .get_mut(value)
                .and_then(VecDeque::pop_front)
                .unwrap_or(LookupOutcome::NotFound)
        }
    }

    fn fast_policy() -> EnrichmentPolicy {
        EnrichmentPolicy {
            min_interval: Duration::ZERO,
            max_attempts: 3,
            backoff_base: Duration::ZERO,
            checkpoint_every: 0,
        }
    }

    fn record(n: u128, pmid: Option<&str>, doi: Option<&str>) -> Record {
        let mut r = Record::new(Uuid::from_u128(n), format!("Paper {n}"));
        r.provenance.insert("pubmed".to_string());
        if let Some(pmid) = pmid {
            r.identifiers.insert(IdentifierKind::PubmedId, pmid).unwrap();
        }
        if let Some(doi) = doi {
            r.identifiers.insert(IdentifierKind::Doi, doi).unwrap();
        }
        r
    }

    fn doi_request() -> EnrichmentRequest {
        EnrichmentRequest::new(IdentifierKind::PubmedId, IdentifierKind::Doi)
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test]
    async fn found_doi_is_recorded() {
        let lookup = ScriptedLookup::default().with(
            "39011768",
            vec![LookupOutcome::Found("10.1001/JAMA.2024.0001".to_string())],
        );
        let service = EnrichmentService::new(lookup, fast_policy());
        let mut dataset = Dataset::from_records(vec![record(1, Some("39011768"), None)]);
        let mut store = MemoryStore::new();

        let report = service
            .enrich(&mut dataset, &doi_request(), &mut store, never())
            .await
            .unwrap();

        assert_eq!(report.found, 1);
        let r = &dataset.records[0];
        assert_eq!(r.identifiers.doi(), Some("10.1001/jama.2024.0001"));
        assert_eq!(r.enrichment_status(&IdentifierKind::Doi), EnrichmentStatus::Found);
        assert_eq!(store.snapshots.len(), 1);
        assert_eq!(store.last().unwrap(), &dataset);
    }

    #[tokio::test]
    async fn not_found_is_not_retried_without_force() {
        let service = EnrichmentService::new(ScriptedLookup::default(), fast_policy());
        let mut dataset = Dataset::from_records(vec![record(1, Some("111"), None)]);

        let first = service
            .enrich(&mut dataset, &doi_request(), MemoryStore::new(), never())
            .await
            .unwrap();
        assert_eq!(first.not_found, 1);
        assert_eq!(
            dataset.records[0].enrichment_status(&IdentifierKind::Doi),
            EnrichmentStatus::NotFound
        );

        let second = service
            .enrich(&mut dataset, &doi_request(), MemoryStore::new(), never())
            .await
            .unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(service.lookup().calls().len(), 1);

        let forced = service
            .enrich(&mut dataset, &doi_request().forced(true), MemoryStore::new(), never())
            .await
            .unwrap();
        assert_eq!(forced.not_found, 1);
        assert_eq!(service.lookup().calls().len(), 2);
    }

    #[tokio::test]
    async fn existing_identifier_is_never_overwritten() {
        let lookup = ScriptedLookup::default()
            .with("111", vec![LookupOutcome::Found("10.1000/new".to_string())]);
        let service = EnrichmentService::new(lookup, fast_policy());
        let mut dataset = Dataset::from_records(vec![
            record(1, Some("111"), Some("10.1000/old")),
            record(2, None, None),
        ]);
        let mut store = MemoryStore::new();

        let report = service
            .enrich(&mut dataset, &doi_request().forced(true), &mut store, never())
            .await
            .unwrap();

        assert_eq!(report.skipped, 2);
        assert!(service.lookup().calls().is_empty());
        assert_eq!(dataset.records[0].identifiers.doi(), Some("10.1000/old"));
        assert!(store.snapshots.is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_deferred() {
        let transient = || LookupOutcome::Transient("HTTP 503".to_string());
        let lookup = ScriptedLookup::default()
            .with(
                "1",
                vec![transient(), LookupOutcome::Found("10.1000/one".to_string())],
            )
            .with("2", vec![transient(), transient(), transient(), transient()]);
        let service = EnrichmentService::new(lookup, fast_policy());
        let mut dataset =
            Dataset::from_records(vec![record(1, Some("1"), None), record(2, Some("2"), None)]);

        let report = service
            .enrich(&mut dataset, &doi_request(), MemoryStore::new(), never())
            .await
            .unwrap();

        assert_eq!(report.found, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(service.lookup().calls(), ["1", "1", "2", "2", "2"]);
        assert_eq!(
            dataset.records[1].enrichment_status(&IdentifierKind::Doi),
            EnrichmentStatus::NotAttempted
        );
    }

    #[tokio::test]
    async fn every_call_is_paced_including_retries() {
        let lookup = ScriptedLookup::default().with(
            "1",
            vec![
                LookupOutcome::Transient("timeout".to_string()),
                LookupOutcome::Transient("timeout".to_string()),
            ],
        );
        let policy = EnrichmentPolicy {
            min_interval: Duration::from_millis(50),
            ..fast_policy()
        };
        let service = EnrichmentService::new(lookup, policy);
        let mut dataset = Dataset::from_records(vec![record(1, Some("1"), None)]);

        let start = Instant::now();
        service
            .enrich(&mut dataset, &doi_request(), MemoryStore::new(), never())
            .await
            .unwrap();
        assert_eq!(service.lookup().calls().len(), 3);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn unsupported_pair_is_rejected_up_front() {
        let service = EnrichmentService::new(ScriptedLookup::default(), fast_policy());
        let mut dataset = Dataset::from_records(vec![record(1, Some("1"), None)]);
        let request = EnrichmentRequest::new(IdentifierKind::ArxivId, IdentifierKind::Doi);

        let err = service
            .enrich(&mut dataset, &request, MemoryStore::new(), never())
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::UnsupportedLookup { .. }));
        assert!(service.lookup().calls().is_empty());
    }

    #[tokio::test]
    async fn checkpoints_flush_periodically() {
        let service = EnrichmentService::new(
            ScriptedLookup::default(),
            EnrichmentPolicy {
                checkpoint_every: 2,
                ..fast_policy()
            },
        );
        let mut dataset = Dataset::from_records(
            (1..=5)
                .map(|n| record(n, Some(&n.to_string()), None))
                .collect(),
        );
        let mut store = MemoryStore::new();
        service
            .enrich(&mut dataset, &doi_request(), &mut store, never())
            .await
            .unwrap();
        // After lookups 2 and 4, then the remainder at the end.
        assert_eq!(store.snapshots.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_found_value_is_reported() {
        let lookup = ScriptedLookup::default()
            .with("2", vec![LookupOutcome::Found("10.1000/dup".to_string())]);
        let service = EnrichmentService::new(lookup, fast_policy());
        let mut dataset = Dataset::from_records(vec![
            record(1, None, Some("10.1000/dup")),
            record(2, Some("2"), None),
        ]);

        let report = service
            .enrich(&mut dataset, &doi_request(), MemoryStore::new(), never())
            .await
            .unwrap();
        assert_eq!(report.possible_duplicates.len(), 1);
        assert_eq!(report.possible_duplicates[0].other, Uuid::from_u128(1));
        assert_eq!(dataset.records[1].identifiers.doi(), Some("10.1000/dup"));
    }

    /// Answers "1" and hangs on everything else after signalling `started`.
    struct HangingLookup {
        started: Mutex<Option<oneshot::Sender<()>>>,
    }

    #[async_trait]
    impl IdentifierLookup for HangingLookup {
        fn name(&self) -> &str {
            "hanging"
        }

        fn supports(&self, _source: &IdentifierKind, _target: &IdentifierKind) -> bool {
            true
        }

        async fn lookup(
            &self,
            _source: &IdentifierKind,
            value: &str,
            _target: &IdentifierKind,
        ) -> LookupOutcome {
            if value == "1" {
                return LookupOutcome::Found("10.1000/one".to_string());
            }
            let started = self.started.lock().unwrap().take();
            if let Some(tx) = started {
                let _ = tx.send(());
            }
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_flushes_completed_lookups() {
        let (tx, rx) = oneshot::channel();
        let lookup = HangingLookup {
            started: Mutex::new(Some(tx)),
        };
        let service = EnrichmentService::new(lookup, fast_policy());
        let mut dataset =
            Dataset::from_records(vec![record(1, Some("1"), None), record(2, Some("2"), None)]);
        let mut store = MemoryStore::new();

        let report = service
            .enrich(&mut dataset, &doi_request(), &mut store, async {
                let _ = rx.await;
            })
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.found, 1);
        let saved = store.last().unwrap();
        assert_eq!(saved.records[0].identifiers.doi(), Some("10.1000/one"));
        assert_eq!(
            saved.records[1].enrichment_status(&IdentifierKind::Doi),
            EnrichmentStatus::NotAttempted
        );
    }

    #[tokio::test]
    async fn enrich_file_writes_backup_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("search_results.json");
        let dataset = Dataset::from_records(vec![record(1, Some("39011768"), None)]);
        save_dataset(&path, &dataset).unwrap();
        let original = std::fs::read(&path).unwrap();

        let lookup = ScriptedLookup::default().with(
            "39011768",
            vec![LookupOutcome::Found("10.1001/jama.2024.0001".to_string())],
        );
        let service = EnrichmentService::new(lookup, fast_policy());
        let report = service
            .enrich_file(&path, &doi_request(), never())
            .await
            .unwrap();
        assert_eq!(report.found, 1);

        let backup = dir.path().join("search_results_backup.json");
        assert_eq!(std::fs::read(backup).unwrap(), original);
        let enriched = load_dataset(&path).unwrap();
        assert_eq!(
            enriched.records[0].identifiers.doi(),
            Some("10.1001/jama.2024.0001")
        );
    }
}
