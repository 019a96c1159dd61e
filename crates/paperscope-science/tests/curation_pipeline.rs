//! Raw hits → merged dataset → review → enrichment → export, all through files.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use paperscope_core::config::{CategoryConfig, ReviewConfig};
use paperscope_core::storage::{backup_path, dataset_to_bytes, load_dataset, save_dataset};
use paperscope_core::{
    EnrichmentStatus, FileStore, IdentifierKind, ReviewAction, ReviewSession, SelectionState,
    SessionEnd,
};
use paperscope_science::formats::generate_bibliography;
use paperscope_science::{
    EnrichmentPolicy, EnrichmentRequest, EnrichmentService, ExportFilter, ExportSummary, Exporter,
    IdentifierLookup, LookupOutcome, MergeEngine, MergeInput, parse_merge_input,
};
use tempfile::TempDir;

const SEARCH_HITS: &str = r#"[
    {"source": "crossref", "hits": [
        {"title": "Remote CBT for Adolescent Anxiety", "doi": "10.1/x", "year": 2024,
         "authors": ["Doe, Jane"], "journal": "JAMA Pediatrics",
         "abstract": "Anxiety is common in adolescents."}
    ]},
    {"source": "pubmed", "hits": [
        {"title": "Remote CBT for adolescent anxiety.", "pmid": "111", "year": "2024"},
        {"title": "Sleep and mood in shift workers", "pmid": "39011768", "year": 2023,
         "authors": ["Roe, Rick"], "journal": "JAMA"}
    ]},
    {"source": "scopus", "hits": [
        {"title": "Deep Learning for Anxiety Detection", "publication_date": "2022-03-01"}
    ]}
]"#;

struct TableLookup(BTreeMap<&'static str, &'static str>);

#[async_trait]
impl IdentifierLookup for TableLookup {
    fn name(&self) -> &str {
        "table"
    }

    fn supports(&self, source: &IdentifierKind, target: &IdentifierKind) -> bool {
        *source == IdentifierKind::PubmedId && *target == IdentifierKind::Doi
    }

    async fn lookup(&self, _: &IdentifierKind, value: &str, _: &IdentifierKind) -> LookupOutcome {
        match self.0.get(value) {
            Some(doi) => LookupOutcome::Found(doi.to_string()),
            None => LookupOutcome::NotFound,
        }
    }
}

fn merge_hits() -> paperscope_core::Dataset {
    let MergeInput::Raw(batches) = parse_merge_input(SEARCH_HITS).unwrap() else {
        panic!("expected source batches");
    };
    MergeEngine::new().merge_batches(batches).into_strict().unwrap()
}

#[tokio::test]
async fn test_full_curation_pipeline() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("review.json");

    // Merge: the crossref and pubmed copies of the CBT paper collapse.
    let dataset = merge_hits();
    assert_eq!(dataset.len(), 3);
    let cbt = &dataset.records[0];
    assert_eq!(cbt.identifiers.doi(), Some("10.1/x"));
    assert_eq!(cbt.identifiers.pubmed_id(), Some("111"));
    assert_eq!(
        cbt.provenance.iter().collect::<Vec<_>>(),
        ["crossref", "pubmed"]
    );
    assert_eq!(dataset_to_bytes(&dataset).unwrap(), dataset_to_bytes(&merge_hits()).unwrap());
    save_dataset(&path, &dataset).unwrap();

    // Review: classify all three, then quit.
    let config = ReviewConfig {
        categories: vec![CategoryConfig {
            name: "Study Type".to_string(),
            labels: vec!["RCT".to_string(), "Cohort".to_string()],
        }],
        highlights: vec!["anxiety".to_string()],
        start_at_first_unreviewed: true,
    };
    let mut dataset = load_dataset(&path).unwrap();
    let mut session = ReviewSession::start(&mut dataset, FileStore::new(&path), config).unwrap();
    assert_eq!(session.current().unwrap().highlighted_terms.len(), 1);
    let end = session
        .run([
            ReviewAction::Select,
            ReviewAction::AssignCategory {
                category: "Study Type".to_string(),
                label: "RCT".to_string(),
            },
            ReviewAction::Next,
            ReviewAction::Select,
            ReviewAction::Next,
            ReviewAction::Select,
            ReviewAction::Quit,
        ])
        .unwrap();
    assert_eq!(end, SessionEnd::Quit);

    let reviewed = load_dataset(&path).unwrap();
    assert!(reviewed.iter().all(|r| r.selection_state == SelectionState::Selected));
    assert_eq!(reviewed.records[0].categories["Study Type"], vec!["RCT"]);
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains("cursor"));
    assert!(!raw.contains("highlighted_terms"));

    // Enrich: only the shift-work paper needs a DOI.
    let service = EnrichmentService::new(
        TableLookup(BTreeMap::from([("39011768", "10.1001/jama.2024.0001")])),
        EnrichmentPolicy {
            min_interval: Duration::ZERO,
            max_attempts: 1,
            backoff_base: Duration::ZERO,
            checkpoint_every: 0,
        },
    );
    let request = EnrichmentRequest::new(IdentifierKind::PubmedId, IdentifierKind::Doi);
    let report = service
        .enrich_file(&path, &request, std::future::pending())
        .await
        .unwrap();
    assert_eq!(report.found, 1);
    assert_eq!(report.skipped, 2);
    assert!(!report.interrupted);
    assert!(backup_path(&path).exists());

    let enriched = load_dataset(&path).unwrap();
    let shift = &enriched.records[1];
    assert_eq!(shift.identifiers.doi(), Some("10.1001/jama.2024.0001"));
    assert_eq!(shift.enrichment_status(&IdentifierKind::Doi), EnrichmentStatus::Found);

    // Export.
    let export = Exporter::default().export(&enriched, ExportFilter::Selected);
    assert_eq!(
        export.summary,
        ExportSummary {
            selected: 3,
            missing_doi: 1,
            with_secondary: 2,
        }
    );
    let detection = &export.rows[2];
    assert_eq!(detection.doi_link, "");
    assert_eq!(detection.pubmed_link, "");
    assert_eq!(
        detection.search_link,
        "https://scholar.google.com/scholar?q=deep%20learning%20for%20anxiety%20detection"
    );
    assert_eq!(export.rows[1].doi_link, "https://doi.org/10.1001/jama.2024.0001");

    let keys: Vec<_> = export.citations.iter().map(|c| c.cite_key.as_str()).collect();
    assert_eq!(keys, vec!["doe2024remote", "roe2023sleep", "anon2022deep"]);
    let bib = generate_bibliography(&export.citations);
    assert!(bib.contains("@article{roe2023sleep,"));
    assert!(bib.contains("doi = {10.1001/jama.2024.0001}"));
}

#[tokio::test]
async fn test_rerun_enrichment_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("review.json");
    save_dataset(&path, &merge_hits()).unwrap();

    let service = EnrichmentService::new(TableLookup(BTreeMap::new()), EnrichmentPolicy {
        min_interval: Duration::ZERO,
        max_attempts: 1,
        backoff_base: Duration::ZERO,
        checkpoint_every: 0,
    });
    let request = EnrichmentRequest::new(IdentifierKind::PubmedId, IdentifierKind::Doi);

    let first = service
        .enrich_file(&path, &request, std::future::pending())
        .await
        .unwrap();
    assert_eq!(first.not_found, 1);
    let after_first = std::fs::read(&path).unwrap();

    let second = service
        .enrich_file(&path, &request, std::future::pending())
        .await
        .unwrap();
    assert_eq!(second.attempted(), 0);
    assert_eq!(std::fs::read(&path).unwrap(), after_first);
}
