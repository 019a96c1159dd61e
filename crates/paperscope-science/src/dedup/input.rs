//! Loosely structured search-hit input.
//!
//! Two shapes are accepted: an array of `{ "source": .., "hits": [..] }`
//! batches, or a search-results document `{ "papers": [..] }` whose papers
//! name their contributing `databases`. A document with a `records` array is
//! an already merged dataset.

use std::collections::{BTreeMap, BTreeSet};

use paperscope_core::{Dataset, IdentifierConflict, IdentifierKind, Record, SelectionState};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, ScienceError};

/// Provenance used when a hit names no source at all.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// One search hit as a source reported it. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<Value>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default, alias = "pmid")]
    pub pubmed_id: Option<String>,
    #[serde(default, alias = "arxiv")]
    pub arxiv_id: Option<String>,
    #[serde(default)]
    pub pmcid: Option<String>,
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub publication_year: Option<Value>,
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub publication: Option<Value>,
    #[serde(default)]
    pub journal: Option<String>,
    /// Extra contributing databases, as listed by search-results documents.
    #[serde(default)]
    pub databases: Vec<String>,
    /// Review decision recorded by an earlier refinement of the results file.
    #[serde(default)]
    pub selected: Option<bool>,
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceBatch {
    pub source: String,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

/// One unit of merge input.
#[derive(Debug, Clone)]
pub enum MergeInput {
    Raw(Vec<SourceBatch>),
    Canonical(Dataset),
}

#[derive(Deserialize)]
struct SearchResults {
    #[serde(default)]
    papers: Vec<RawHit>,
}

/// Detect the input shape and parse it.
pub fn parse_merge_input(text: &str) -> Result<MergeInput> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ScienceError::Parse(format!("invalid JSON: {e}")))?;

    match &value {
        Value::Array(_) => {
            let batches: Vec<SourceBatch> = serde_json::from_value(value)
                .map_err(|e| ScienceError::Parse(format!("invalid source batches: {e}")))?;
            Ok(MergeInput::Raw(batches))
        }
        Value::Object(map) if map.contains_key("records") => {
            let dataset: Dataset = serde_json::from_value(value)
                .map_err(|e| ScienceError::Parse(format!("invalid dataset: {e}")))?;
            dataset.validate().map_err(ScienceError::Parse)?;
            Ok(MergeInput::Canonical(dataset))
        }
        Value::Object(map) if map.contains_key("papers") => {
            let results: SearchResults = serde_json::from_value(value)
                .map_err(|e| ScienceError::Parse(format!("invalid search results: {e}")))?;
            Ok(MergeInput::Raw(vec![SourceBatch {
                source: String::new(),
                hits: results.papers,
            }]))
        }
        _ => Err(ScienceError::Parse(
            "expected an array of source batches, a search-results document or a dataset"
                .to_string(),
        )),
    }
}

impl RawHit {
    /// Build a provisional record (nil id) and report identifier values that
    /// contradicted each other inside this single hit.
    pub fn to_record(&self, source: &str) -> (Record, Vec<IdentifierConflict>) {
        let mut record = Record::new(Uuid::nil(), clean_text(self.title.as_deref()));
        let mut conflicts = Vec::new();

        let named = [
            (IdentifierKind::Doi, &self.doi),
            (IdentifierKind::PubmedId, &self.pubmed_id),
            (IdentifierKind::ArxivId, &self.arxiv_id),
            (IdentifierKind::Pmcid, &self.pmcid),
        ];
        let named = named
            .into_iter()
            .filter_map(|(kind, value)| value.as_deref().map(|v| (kind, v.to_string())));
        let mapped = self.identifiers.iter().filter_map(|(kind, value)| {
            kind.parse::<IdentifierKind>()
                .ok()
                .map(|kind| (kind, value.clone()))
        });
        for (kind, value) in named.chain(mapped) {
            if let Err(conflict) = record.identifiers.insert(kind, &value) {
                conflicts.push(conflict);
            }
        }

        record.abstract_text =
            Some(clean_text(self.abstract_text.as_deref())).filter(|a| !a.is_empty());
        record.authors = self.authors.iter().filter_map(author_name).collect();
        record.publication_year = self.resolve_year();
        record.venue_name = self.resolve_venue();
        record.provenance = self.provenance(source);

        record.selection_state = match self.selected {
            Some(true) => SelectionState::Selected,
            Some(false) => SelectionState::Rejected,
            None => SelectionState::Unreviewed,
        };
        for (category, labels) in &self.categories {
            let mut kept: Vec<String> = Vec::new();
            for label in labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
                if !kept.iter().any(|k| k == label) {
                    kept.push(label.to_string());
                }
            }
            if !category.trim().is_empty() && !kept.is_empty() {
                record.categories.insert(category.trim().to_string(), kept);
            }
        }

        (record, conflicts)
    }

    fn resolve_year(&self) -> Option<i32> {
        self.publication_year
            .as_ref()
            .and_then(year_from_value)
            .or_else(|| self.year.as_ref().and_then(year_from_value))
            .or_else(|| self.publication_date.as_deref().and_then(leading_year))
    }

    fn resolve_venue(&self) -> String {
        let from_publication = match &self.publication {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Object(map)) => map.get("title").and_then(Value::as_str),
            _ => None,
        };
        [self.venue.as_deref(), from_publication, self.journal.as_deref()]
            .into_iter()
            .flatten()
            .map(|v| clean_text(Some(v)))
            .find(|v| !v.is_empty())
            .unwrap_or_default()
    }

    fn provenance(&self, source: &str) -> BTreeSet<String> {
        let mut provenance: BTreeSet<String> = std::iter::once(source)
            .chain(self.databases.iter().map(String::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if provenance.is_empty() {
            warn!(title = ?self.title, "hit names no source database");
            provenance.insert(UNKNOWN_SOURCE.to_string());
        }
        provenance
    }
}

fn clean_text(input: Option<&str>) -> String {
    input
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn author_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("name").and_then(Value::as_str)?,
        _ => return None,
    };
    Some(clean_text(Some(name))).filter(|n| !n.is_empty())
}

fn year_from_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => leading_year(s),
        _ => None,
    }
}

fn leading_year(text: &str) -> Option<i32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
