use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identifiers::{IdentifierKind, Identifiers};

/// Reviewer classification of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    #[default]
    Unreviewed,
    Selected,
    Rejected,
}

impl fmt::Display for SelectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreviewed => write!(f, "unreviewed"),
            Self::Selected => write!(f, "selected"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for SelectionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreviewed" => Ok(Self::Unreviewed),
            "selected" => Ok(Self::Selected),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid SelectionState: {s}")),
        }
    }
}

/// Outcome of backfilling one identifier kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    #[default]
    NotAttempted,
    Found,
    NotFound,
}

impl EnrichmentStatus {
    /// Ordering used when two records are merged: the more settled status wins.
    pub fn rank(self) -> u8 {
        match self {
            Self::NotAttempted => 0,
            Self::NotFound => 1,
            Self::Found => 2,
        }
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAttempted => write!(f, "not_attempted"),
            Self::Found => write!(f, "found"),
            Self::NotFound => write!(f, "not_found"),
        }
    }
}

/// A keyword occurrence in a record's abstract. Byte offsets into the abstract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatch {
    pub keyword: String,
    pub start: usize,
    pub end: usize,
}

/// One bibliographic entry of the canonical dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,

    #[serde(default, skip_serializing_if = "Identifiers::is_empty")]
    pub identifiers: Identifiers,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,

    #[serde(default)]
    pub venue_name: String,

    pub provenance: BTreeSet<String>,

    #[serde(default)]
    pub selection_state: SelectionState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, Vec<String>>,

    /// Recomputed whenever the record is viewed; never persisted.
    #[serde(skip)]
    pub highlighted_terms: Vec<TermMatch>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enrichment_status: BTreeMap<IdentifierKind, EnrichmentStatus>,
}

impl Record {
    pub fn new(id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id,
            identifiers: Identifiers::new(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: None,
            publication_year: None,
            venue_name: String::new(),
            provenance: BTreeSet::new(),
            selection_state: SelectionState::Unreviewed,
            reviewed_at: None,
            categories: BTreeMap::new(),
            highlighted_terms: Vec::new(),
            enrichment_status: BTreeMap::new(),
        }
    }

    pub fn enrichment_status(&self, kind: &IdentifierKind) -> EnrichmentStatus {
        self.enrichment_status
            .get(kind)
            .copied()
            .unwrap_or_default()
    }

    /// Moves `kind` out of `NotAttempted`. Returns `false` (and changes nothing)
    /// if the kind was already settled or `status` is `NotAttempted`.
    pub fn settle_enrichment(&mut self, kind: IdentifierKind, status: EnrichmentStatus) -> bool {
        if status == EnrichmentStatus::NotAttempted
            || self.enrichment_status(&kind) != EnrichmentStatus::NotAttempted
        {
            return false;
        }
        self.enrichment_status.insert(kind, status);
        true
    }

    /// Forced re-enrichment: forget the previous outcome for `kind`.
    pub fn reset_enrichment(&mut self, kind: &IdentifierKind) -> bool {
        self.enrichment_status.remove(kind).is_some()
    }

    pub fn is_selected(&self) -> bool {
        self.selection_state == SelectionState::Selected
    }

    /// Short human-readable locator for diagnostics.
    pub fn locator(&self) -> String {
        let mut title: String = self.title.chars().take(60).collect();
        if title.len() < self.title.len() {
            title.push('…');
        }
        format!("{} ({title:?})", self.id)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.identifiers == other.identifiers
            && self.title == other.title
            && self.authors == other.authors
            && self.abstract_text == other.abstract_text
            && self.publication_year == other.publication_year
            && self.venue_name == other.venue_name
            && self.provenance == other.provenance
            && self.selection_state == other.selection_state
            && self.reviewed_at == other.reviewed_at
            && self.categories == other.categories
            && self.enrichment_status == other.enrichment_status
    }
}
