//! Access links, link tables and citation entries for curated records.
//!
//! Everything here is a pure function of the dataset: no network calls, and
//! the same dataset always yields the same rows, counts and cite keys.

pub mod citation;

use std::fmt;
use std::str::FromStr;

use paperscope_core::config::ExportConfig;
use paperscope_core::{Dataset, Record, SelectionState};
use serde::Serialize;
use uuid::Uuid;

use crate::dedup::normalize_title;
use crate::identifiers::ArxivId;

pub use citation::{CitationEntry, EntryType, assign_cite_keys};

pub const DOI_RESOLVER: &str = "https://doi.org/";
pub const PUBMED_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov/";

/// Which records an export covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFilter {
    #[default]
    Selected,
    NotRejected,
    All,
}

impl ExportFilter {
    pub fn matches(self, record: &Record) -> bool {
        match self {
            Self::Selected => record.selection_state == SelectionState::Selected,
            Self::NotRejected => record.selection_state != SelectionState::Rejected,
            Self::All => true,
        }
    }
}

impl fmt::Display for ExportFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selected => write!(f, "selected"),
            Self::NotRejected => write!(f, "not-rejected"),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for ExportFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "selected" => Ok(Self::Selected),
            "not-rejected" | "not_rejected" => Ok(Self::NotRejected),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown export filter '{other}' (expected selected, not-rejected or all)"
            )),
        }
    }
}

/// Access links for one record. `search` is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLinks {
    pub doi: Option<String>,
    pub pubmed: Option<String>,
    pub arxiv: Option<String>,
    pub search: String,
}

impl AccessLinks {
    /// Resolver first, then repositories, then the search fallback.
    pub fn ordered(&self) -> Vec<&str> {
        [self.doi.as_deref(), self.pubmed.as_deref(), self.arxiv.as_deref()]
            .into_iter()
            .flatten()
            .chain(std::iter::once(self.search.as_str()))
            .collect()
    }
}

pub fn access_links(record: &Record, search_base_url: &str) -> AccessLinks {
    let doi = record
        .identifiers
        .doi()
        .map(|doi| format!("{DOI_RESOLVER}{doi}"));
    let pubmed = record
        .identifiers
        .pubmed_id()
        .map(|pmid| format!("{PUBMED_BASE}{pmid}/"));
    let arxiv = record.identifiers.arxiv_id().map(|raw| {
        ArxivId::parse(raw)
            .map(|id| id.abs_url())
            .unwrap_or_else(|_| format!("https://arxiv.org/abs/{raw}"))
    });

    AccessLinks {
        doi,
        pubmed,
        arxiv,
        search: search_link(&record.title, search_base_url),
    }
}

fn search_link(title: &str, search_base_url: &str) -> String {
    format!(
        "{}?q={}",
        search_base_url.trim_end_matches(['?', '/']),
        urlencoding::encode(&normalize_title(title))
    )
}

/// One line of the link table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub number: usize,
    pub id: Uuid,
    pub title: String,
    pub year: Option<i32>,
    pub venue: String,
    pub doi: String,
    pub pubmed_id: String,
    pub arxiv_id: String,
    pub doi_link: String,
    pub pubmed_link: String,
    pub arxiv_link: String,
    pub search_link: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub selected: usize,
    pub missing_doi: usize,
    /// Records with a PubMed or arXiv id.
    pub with_secondary: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Export {
    pub rows: Vec<ExportRow>,
    pub summary: ExportSummary,
    pub citations: Vec<CitationEntry>,
}

pub struct Exporter {
    search_base_url: String,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

impl Exporter {
    pub fn new(search_base_url: impl Into<String>) -> Self {
        Self {
            search_base_url: search_base_url.into(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.search_base_url.clone())
    }

    pub fn export(&self, dataset: &Dataset, filter: ExportFilter) -> Export {
        self.export_where(dataset, |record| filter.matches(record))
    }

    /// Export the records accepted by an arbitrary predicate, in dataset order.
    pub fn export_where<F>(&self, dataset: &Dataset, predicate: F) -> Export
    where
        F: Fn(&Record) -> bool,
    {
        let records: Vec<&Record> = dataset.iter().filter(|r| predicate(r)).collect();

        let rows = records
            .iter()
            .enumerate()
            .map(|(i, record)| self.row(i + 1, record))
            .collect();

        let summary = ExportSummary {
            selected: records.len(),
            missing_doi: records
                .iter()
                .filter(|r| r.identifiers.doi().is_none())
                .count(),
            with_secondary: records
                .iter()
                .filter(|r| r.identifiers.pubmed_id().is_some() || r.identifiers.arxiv_id().is_some())
                .count(),
        };

        Export {
            rows,
            summary,
            citations: assign_cite_keys(records.iter().map(|r| CitationEntry::from_record(r))),
        }
    }

    fn row(&self, number: usize, record: &Record) -> ExportRow {
        let links = access_links(record, &self.search_base_url);
        let ids = &record.identifiers;
        ExportRow {
            number,
            id: record.id,
            title: record.title.clone(),
            year: record.publication_year,
            venue: record.venue_name.clone(),
            doi: ids.doi().unwrap_or_default().to_string(),
            pubmed_id: ids.pubmed_id().unwrap_or_default().to_string(),
            arxiv_id: ids.arxiv_id().unwrap_or_default().to_string(),
            doi_link: links.doi.unwrap_or_default(),
            pubmed_link: links.pubmed.unwrap_or_default(),
            arxiv_link: links.arxiv.unwrap_or_default(),
            search_link: links.search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperscope_core::IdentifierKind;

    fn record(n: u128, title: &str, state: SelectionState) -> Record {
        let mut r = Record::new(Uuid::from_u128(n), title);
        r.selection_state = state;
        r
    }

    #[test]
    fn record_without_doi_gets_only_search_link() {
        let r = record(1, "Deep Learning for Anxiety Detection", SelectionState::Selected);
        let links = access_links(&r, "https://scholar.google.com/scholar");

        assert_eq!(
            links.ordered(),
            vec!["https://scholar.google.com/scholar?q=deep%20learning%20for%20anxiety%20detection"]
        );

        let export = Exporter::default().export(&Dataset::from_records(vec![r]), ExportFilter::Selected);
        assert_eq!(
            export.summary,
            ExportSummary {
                selected: 1,
                missing_doi: 1,
                with_secondary: 0
            }
        );
        assert_eq!(export.rows[0].doi_link, "");
        assert!(export.rows[0].search_link.ends_with("?q=deep%20learning%20for%20anxiety%20detection"));
    }

    #[test]
    fn links_follow_resolver_repository_search_order() {
        let mut r = record(1, "Attention: Is All You Need?", SelectionState::Selected);
        r.identifiers.insert(IdentifierKind::ArxivId, "1706.03762v5").unwrap();
        r.identifiers.insert(IdentifierKind::PubmedId, "39011768").unwrap();
        r.identifiers.insert(IdentifierKind::Doi, "10.1/x").unwrap();

        let links = access_links(&r, "https://search.example/");
        assert_eq!(
            links.ordered(),
            vec![
                "https://doi.org/10.1/x",
                "https://pubmed.ncbi.nlm.nih.gov/39011768/",
                "https://arxiv.org/abs/1706.03762",
                "https://search.example?q=attention%20is%20all%20you%20need",
            ]
        );
    }

    #[test]
    fn filters_pick_records_in_dataset_order() {
        let mut with_doi = record(1, "Alpha", SelectionState::Selected);
        with_doi.identifiers.insert(IdentifierKind::Doi, "10.1000/alpha").unwrap();
        let mut pmid_only = record(2, "Beta", SelectionState::Unreviewed);
        pmid_only.identifiers.insert(IdentifierKind::PubmedId, "42").unwrap();
        let rejected = record(3, "Gamma", SelectionState::Rejected);
        let dataset = Dataset::from_records(vec![with_doi, pmid_only, rejected]);
        let exporter = Exporter::default();

        let selected = exporter.export(&dataset, ExportFilter::Selected);
        assert_eq!(selected.rows.len(), 1);
        assert_eq!(selected.rows[0].doi, "10.1000/alpha");

        let open = exporter.export(&dataset, ExportFilter::NotRejected);
        let titles: Vec<_> = open.rows.iter().map(|r| (r.number, r.title.as_str())).collect();
        assert_eq!(titles, vec![(1, "Alpha"), (2, "Beta")]);
        assert_eq!(open.summary.missing_doi, 1);
        assert_eq!(open.summary.with_secondary, 1);

        let custom = exporter.export_where(&dataset, |r| r.title.starts_with('G'));
        assert_eq!(custom.rows.len(), 1);
        assert_eq!(custom.citations.len(), 1);

        assert_eq!(exporter.export(&dataset, ExportFilter::All).summary.selected, 3);
    }

    #[test]
    fn filter_parses_cli_names() {
        assert_eq!("not-rejected".parse::<ExportFilter>(), Ok(ExportFilter::NotRejected));
        assert_eq!("ALL".parse::<ExportFilter>(), Ok(ExportFilter::All));
        assert!("maybe".parse::<ExportFilter>().is_err());
        assert_eq!(ExportFilter::default().to_string(), "selected");
    }
}
