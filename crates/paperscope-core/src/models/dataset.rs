use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identifiers::IdentifierKind;
use super::record::{Record, SelectionState};

pub const DATASET_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    DATASET_FORMAT_VERSION
}

/// The canonical, ordered record collection shared by every pipeline step.
///
/// Order is the merge insertion order and survives save/load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewProgress {
    pub total: usize,
    pub selected: usize,
    pub rejected: usize,
    pub unreviewed: usize,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    pub fn new() -> Self {
        Self::from_records(Vec::new())
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            format_version: DATASET_FORMAT_VERSION,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn position_of(&self, id: &Uuid) -> Option<usize> {
        self.records.iter().position(|r| r.id == *id)
    }

    /// Index of the first record other than `except` holding `value` for `kind`.
    pub fn find_by_identifier(
        &self,
        kind: &IdentifierKind,
        value: &str,
        except: Option<usize>,
    ) -> Option<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != except)
            .find(|(_, r)| r.identifiers.get(kind) == Some(value))
            .map(|(idx, _)| idx)
    }

    pub fn first_unreviewed(&self) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.selection_state == SelectionState::Unreviewed)
    }

    pub fn progress(&self) -> ReviewProgress {
        let mut progress = ReviewProgress {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            match record.selection_state {
                SelectionState::Selected => progress.selected += 1,
                SelectionState::Rejected => progress.rejected += 1,
                SelectionState::Unreviewed => progress.unreviewed += 1,
            }
        }
        progress
    }

    /// Structural checks applied after loading. Returns a diagnostic naming the
    /// first offending record.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.format_version != DATASET_FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version {} (expected {DATASET_FORMAT_VERSION})",
                self.format_version
            ));
        }

        let mut seen = HashSet::with_capacity(self.records.len());
        for (idx, record) in self.records.iter().enumerate() {
            if !seen.insert(record.id) {
                return Err(format!("record #{idx} {}: duplicate record id", record.locator()));
            }
            if record.provenance.is_empty() {
                return Err(format!("record #{idx} {}: empty provenance", record.locator()));
            }
            if record.provenance.iter().any(|source| source.trim().is_empty()) {
                return Err(format!("record #{idx} {}: blank source name", record.locator()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u128, state: SelectionState) -> Record {
        let mut r = Record::new(Uuid::from_u128(id), format!("Paper {id}"));
        r.provenance.insert("arxiv".to_string());
        r.selection_state = state;
        r
    }

    #[test]
    fn test_progress_counts_each_state() {
        let dataset = Dataset::from_records(vec![
            record(1, SelectionState::Selected),
            record(2, SelectionState::Rejected),
            record(3, SelectionState::Unreviewed),
            record(4, SelectionState::Selected),
        ]);
        let progress = dataset.progress();
        assert_eq!(progress.total, 4);
        assert_eq!(progress.selected, 2);
        assert_eq!(progress.rejected, 1);
        assert_eq!(progress.unreviewed, 1);
        assert_eq!(dataset.first_unreviewed(), Some(2));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let dataset = Dataset::from_records(vec![
            record(1, SelectionState::Unreviewed),
            record(1, SelectionState::Unreviewed),
        ]);
        let err = dataset.validate().unwrap_err();
        assert!(err.contains("record #1"));
        assert!(err.contains("duplicate record id"));
    }

    #[test]
    fn test_validate_rejects_empty_provenance() {
        let mut r = record(1, SelectionState::Unreviewed);
        r.provenance.clear();
        let err = Dataset::from_records(vec![r]).validate().unwrap_err();
        assert!(err.contains("empty provenance"));
    }

    #[test]
    fn test_find_by_identifier_skips_excluded() {
        let mut a = record(1, SelectionState::Unreviewed);
        a.identifiers.insert(IdentifierKind::Doi, "10.1/x").unwrap();
        let mut b = record(2, SelectionState::Unreviewed);
        b.identifiers.insert(IdentifierKind::Doi, "10.1/x").unwrap();
        let dataset = Dataset::from_records(vec![a, b]);

        assert_eq!(dataset.find_by_identifier(&IdentifierKind::Doi, "10.1/x", None), Some(0));
        assert_eq!(dataset.find_by_identifier(&IdentifierKind::Doi, "10.1/x", Some(0)), Some(1));
        assert_eq!(dataset.find_by_identifier(&IdentifierKind::Doi, "10.1/y", None), None);
    }
}
