use std::fmt;

use paperscope_core::config::MergeConfig;
use paperscope_core::{
    CategoryConfig, Dataset, EnrichmentStatus, IdentifierKind, Record, SelectionState,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::input::{MergeInput, SourceBatch};
use crate::error::{Result, ScienceError};

/// Namespace for record ids derived from dedup keys.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d5_5b7a_8c0e_4d2f_1a9b_7e35);

/// Identifier kinds that identify a record exactly, in matching order.
static EXACT_KEYS: [IdentifierKind; 3] = [
    IdentifierKind::Doi,
    IdentifierKind::PubmedId,
    IdentifierKind::ArxivId,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The record already holds a different value for this kind.
    ConflictsWith { kept: String },
    /// The value is already carried by another record.
    HeldBy(Uuid),
}

/// An identifier value that was not applied during a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeWarning {
    pub record: Uuid,
    pub title: String,
    pub source: String,
    pub kind: IdentifierKind,
    pub rejected: String,
    pub reason: ConflictReason,
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {} ({:?}): {} {:?} from {}",
            self.record, self.title, self.kind, self.rejected, self.source
        )?;
        match &self.reason {
            ConflictReason::ConflictsWith { kept } => {
                write!(f, " conflicts with kept value {kept:?}")
            }
            ConflictReason::HeldBy(other) => write!(f, " already belongs to record {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Hits and canonical records offered to the engine.
    pub inputs: usize,
    pub created: usize,
    pub merged: usize,
    /// Existing records folded together once a merge filled in a title or year.
    pub folded: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub dataset: Dataset,
    pub warnings: Vec<MergeWarning>,
    pub stats: MergeStats,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Fail on the first collected conflict.
    pub fn into_strict(self) -> Result<Dataset> {
        let Some(first) = self.warnings.first() else {
            return Ok(self.dataset);
        };
        let mut detail = first.to_string();
        if self.warnings.len() > 1 {
            detail.push_str(&format!(" (+{} more conflicts)", self.warnings.len() - 1));
        }
        Err(ScienceError::DataQuality {
            record: first.record.to_string(),
            detail,
        })
    }
}

/// Folds raw hits and canonical records into one deduplicated dataset.
///
/// Matching order: record id (canonical input only), DOI, PubMed id, arXiv id,
/// then fuzzy title with equal year. The first match wins.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    title_similarity_threshold: f64,
    /// Configured review categories. Raw hits keep only labels listed here.
    categories: Option<Vec<CategoryConfig>>,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.91,
            categories: None,
        }
    }
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title_threshold(mut self, threshold: f64) -> Self {
        self.title_similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Restrict category labels imported from raw hits to `categories`.
    pub fn with_categories(mut self, categories: &[CategoryConfig]) -> Self {
        self.categories = Some(categories.to_vec());
        self
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        Self::new().with_title_threshold(config.title_similarity_threshold)
    }

    pub fn merge_batches(&self, batches: Vec<SourceBatch>) -> MergeOutcome {
        self.merge(Dataset::new(), vec![MergeInput::Raw(batches)])
    }

    /// Merge `inputs` into `base`, in order.
    pub fn merge(&self, base: Dataset, inputs: Vec<MergeInput>) -> MergeOutcome {
        let mut ws = Workspace::new(base);

        for input in inputs {
            match input {
                MergeInput::Raw(batches) => {
                    for batch in batches {
                        for hit in &batch.hits {
                            let (mut record, conflicts) = hit.to_record(&batch.source);
                            self.keep_configured_labels(&mut record);
                            let source = source_label(&record);
                            let idx = self.place(&mut ws, record, false);
                            for conflict in conflicts {
                                ws.warn(
                                    idx,
                                    &source,
                                    conflict.kind,
                                    conflict.incoming,
                                    ConflictReason::ConflictsWith {
                                        kept: conflict.existing,
                                    },
                                );
                            }
                        }
                    }
                }
                MergeInput::Canonical(dataset) => {
                    for record in dataset.records {
                        self.place(&mut ws, record, true);
                    }
                }
            }
        }

        info!(
            inputs = ws.stats.inputs,
            created = ws.stats.created,
            merged = ws.stats.merged,
            folded = ws.stats.folded,
            conflicts = ws.warnings.len(),
            "merge finished"
        );
        MergeOutcome {
            dataset: ws.dataset,
            warnings: ws.warnings,
            stats: ws.stats,
        }
    }

    fn place(&self, ws: &mut Workspace, record: Record, canonical: bool) -> usize {
        ws.stats.inputs += 1;
        match self.find_match(ws, &record, canonical) {
            Some(idx) => {
                ws.stats.merged += 1;
                if ws.absorb(idx, record) {
                    self.fold_duplicates(ws, idx)
                } else {
                    idx
                }
            }
            None => {
                ws.stats.created += 1;
                ws.insert_new(record, canonical)
            }
        }
    }

    fn find_match(&self, ws: &Workspace, incoming: &Record, canonical: bool) -> Option<usize> {
        if canonical && let Some(idx) = ws.dataset.position_of(&incoming.id) {
            return Some(idx);
        }

        for kind in &EXACT_KEYS {
            if let Some(value) = incoming.identifiers.get(kind)
                && let Some(idx) = ws.dataset.find_by_identifier(kind, value, None)
            {
                debug!(%kind, value, "matched on identifier");
                return Some(idx);
            }
        }

        self.closest_title(ws, &normalize_title(&incoming.title), incoming, None)
    }

    /// Best fuzzy title match with equal year and no contradicting identifier.
    fn closest_title(
        &self,
        ws: &Workspace,
        title: &str,
        incoming: &Record,
        skip: Option<usize>,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, existing) in ws.dataset.records.iter().enumerate() {
            if Some(idx) == skip
                || existing.publication_year != incoming.publication_year
                || identifiers_disagree(existing, incoming)
            {
                continue;
            }
            let Some(score) =
                title_similarity(&ws.titles[idx], title, self.title_similarity_threshold)
            else {
                continue;
            };
            // Strictly greater keeps the earliest record on ties.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// The record at `idx` just gained a title or year and may now duplicate
    /// another record. Fold such pairs into the earlier one until none match.
    /// Returns the surviving index.
    fn fold_duplicates(&self, ws: &mut Workspace, mut idx: usize) -> usize {
        while let Some(other) =
            self.closest_title(ws, &ws.titles[idx], &ws.dataset.records[idx], Some(idx))
        {
            let (keep, gone) = (idx.min(other), idx.max(other));
            let folded = ws.remove(gone);
            let kept_id = ws.dataset.records[keep].id;
            debug!(kept = %kept_id, folded = %folded.id, "folding duplicate record");
            ws.redirect_warnings(folded.id, kept_id);
            ws.stats.folded += 1;
            ws.absorb(keep, folded);
            idx = keep;
        }
        idx
    }

    fn keep_configured_labels(&self, record: &mut Record) {
        let Some(configured) = &self.categories else {
            return;
        };
        record.categories.retain(|name, labels| {
            let Some(category) = configured.iter().find(|c| c.name == *name) else {
                debug!(category = %name, "dropping unconfigured category");
                return false;
            };
            labels.retain(|label| category.labels.contains(label));
            !labels.is_empty()
        });
    }
}

struct Workspace {
    dataset: Dataset,
    /// Normalized title per record, kept in step with `dataset.records`.
    titles: Vec<String>,
    warnings: Vec<MergeWarning>,
    stats: MergeStats,
}

impl Workspace {
    fn new(dataset: Dataset) -> Self {
        let titles = dataset
            .records
            .iter()
            .map(|r| normalize_title(&r.title))
            .collect();
        Self {
            dataset,
            titles,
            warnings: Vec::new(),
            stats: MergeStats::default(),
        }
    }

    fn warn(
        &mut self,
        idx: usize,
        source: &str,
        kind: IdentifierKind,
        rejected: String,
        reason: ConflictReason,
    ) {
        let record = &self.dataset.records[idx];
        let warning = MergeWarning {
            record: record.id,
            title: record.title.clone(),
            source: source.to_string(),
            kind,
            rejected,
            reason,
        };
        warn!("{warning}");
        self.warnings.push(warning);
    }

    fn insert_new(&mut self, mut record: Record, canonical: bool) -> usize {
        let source = source_label(&record);
        let title = normalize_title(&record.title);
        if !canonical || record.id.is_nil() {
            record.id = self.derive_id(&record, &title);
        }

        // Identifiers owned elsewhere stay with their owner.
        let offered = std::mem::take(&mut record.identifiers);
        let mut rejected = Vec::new();
        for (kind, value) in offered.iter() {
            match self.dataset.find_by_identifier(kind, value, None) {
                Some(owner) => rejected.push((kind.clone(), value.to_string(), owner)),
                None => {
                    let _ = record.identifiers.insert(kind.clone(), value);
                }
            }
        }

        self.dataset.records.push(record);
        self.titles.push(title);
        let idx = self.dataset.len() - 1;

        for (kind, value, owner) in rejected {
            let owner_id = self.dataset.records[owner].id;
            self.warn(idx, &source, kind, value, ConflictReason::HeldBy(owner_id));
        }
        idx
    }

    fn remove(&mut self, idx: usize) -> Record {
        self.titles.remove(idx);
        self.dataset.records.remove(idx)
    }

    fn redirect_warnings(&mut self, from: Uuid, to: Uuid) {
        for warning in &mut self.warnings {
            if warning.record == from {
                warning.record = to;
            }
            if warning.reason == ConflictReason::HeldBy(from) {
                warning.reason = ConflictReason::HeldBy(to);
            }
        }
    }

    /// Fold `incoming` into the record at `idx`. Returns whether the record
    /// gained a title or a year, which changes what it fuzzy-matches.
    fn absorb(&mut self, idx: usize, incoming: Record) -> bool {
        let source = source_label(&incoming);

        for (kind, value) in incoming.identifiers.iter() {
            match self.dataset.records[idx].identifiers.get(kind) {
                Some(existing) if existing == value => continue,
                Some(existing) => {
                    let kept = existing.to_string();
                    self.warn(
                        idx,
                        &source,
                        kind.clone(),
                        value.to_string(),
                        ConflictReason::ConflictsWith { kept },
                    );
                    continue;
                }
                None => {}
            }
            if let Some(owner) = self.dataset.find_by_identifier(kind, value, Some(idx)) {
                let owner_id = self.dataset.records[owner].id;
                self.warn(
                    idx,
                    &source,
                    kind.clone(),
                    value.to_string(),
                    ConflictReason::HeldBy(owner_id),
                );
                continue;
            }
            let _ = self.dataset.records[idx]
                .identifiers
                .insert(kind.clone(), value);
        }

        let target = &mut self.dataset.records[idx];
        target.provenance.extend(incoming.provenance);

        let mut reshaped = false;
        if target.title.trim().is_empty() && !incoming.title.trim().is_empty() {
            self.titles[idx] = normalize_title(&incoming.title);
            target.title = incoming.title;
            reshaped = true;
        }
        let longer_abstract = match (&target.abstract_text, &incoming.abstract_text) {
            (Some(kept), Some(offered)) => offered.chars().count() > kept.chars().count(),
            (None, Some(offered)) => !offered.is_empty(),
            _ => false,
        };
        if longer_abstract {
            target.abstract_text = incoming.abstract_text;
        }
        if target.publication_year.is_none() && incoming.publication_year.is_some() {
            target.publication_year = incoming.publication_year;
            reshaped = true;
        }
        if target.venue_name.trim().is_empty() {
            target.venue_name = incoming.venue_name;
        }
        if target.authors.is_empty() {
            target.authors = incoming.authors;
        }

        // Review work: the first decision sticks, labels and statuses accumulate.
        if target.selection_state == SelectionState::Unreviewed
            && incoming.selection_state != SelectionState::Unreviewed
        {
            target.selection_state = incoming.selection_state;
            target.reviewed_at = incoming.reviewed_at;
        }
        for (category, labels) in incoming.categories {
            let kept = target.categories.entry(category).or_default();
            for label in labels {
                if !kept.contains(&label) {
                    kept.push(label);
                }
            }
        }
        for (kind, status) in incoming.enrichment_status {
            let current = target.enrichment_status(&kind);
            if status.rank() > current.rank() {
                target.enrichment_status.insert(kind, status);
            }
        }
        target
            .enrichment_status
            .retain(|_, status| *status != EnrichmentStatus::NotAttempted);

        reshaped
    }

    fn derive_id(&self, record: &Record, normalized_title: &str) -> Uuid {
        let key = dedup_key(record, normalized_title);
        let mut position = self.dataset.len();
        loop {
            let id = Uuid::new_v5(&RECORD_NAMESPACE, format!("{key}#{position}").as_bytes());
            if self.dataset.position_of(&id).is_none() {
                return id;
            }
            position += 1;
        }
    }
}

/// First dedup key a record offers, e.g. `doi:10.1000/x` or `title:deep learning`.
fn dedup_key(record: &Record, normalized_title: &str) -> String {
    EXACT_KEYS
        .iter()
        .chain(record.identifiers.iter().map(|(kind, _)| kind))
        .find_map(|kind| {
            record
                .identifiers
                .get(kind)
                .map(|value| format!("{kind}:{value}"))
        })
        .unwrap_or_else(|| format!("title:{normalized_title}"))
}

fn source_label(record: &Record) -> String {
    record
        .provenance
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("+")
}

/// Any kind both records carry, with different values.
fn identifiers_disagree(a: &Record, b: &Record) -> bool {
    b.identifiers
        .iter()
        .any(|(kind, value)| a.identifiers.get(kind).is_some_and(|v| v != value))
}

/// Case-folded, punctuation replaced by spaces, whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of two normalized titles, or `None` below `threshold`.
fn title_similarity(a: &str, b: &str, threshold: f64) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(1.0);
    }
    if a.len() < 5 || b.len() < 5 {
        return None;
    }
    let score = strsim::normalized_levenshtein(a, b);
    (score >= threshold).then_some(score)
}
