use std::collections::{HashMap, HashSet};

use paperscope_core::Record;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Article,
    Preprint,
    Misc,
}

/// Canonical citation data for one exported record, ready for a formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CitationEntry {
    pub cite_key: String,
    pub record: Uuid,
    pub entry_type: EntryType,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub doi: Option<String>,
    pub pubmed_id: Option<String>,
    pub arxiv_id: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl CitationEntry {
    /// Entry with its undisambiguated cite key.
    pub fn from_record(record: &Record) -> Self {
        let ids = &record.identifiers;
        let venue = Some(record.venue_name.clone()).filter(|v| !v.trim().is_empty());
        let entry_type = match (&venue, ids.arxiv_id()) {
            (Some(_), _) => EntryType::Article,
            (None, Some(_)) => EntryType::Preprint,
            (None, None) => EntryType::Misc,
        };

        Self {
            cite_key: base_cite_key(record),
            record: record.id,
            entry_type,
            title: record.title.clone(),
            authors: record.authors.clone(),
            year: record.publication_year,
            venue,
            doi: ids.doi().map(str::to_string),
            pubmed_id: ids.pubmed_id().map(str::to_string),
            arxiv_id: ids.arxiv_id().map(str::to_string),
            abstract_text: record.abstract_text.clone(),
        }
    }
}

/// `<family><year><first title word>`, lowercased, ASCII alphanumerics only.
fn base_cite_key(record: &Record) -> String {
    let family = record
        .authors
        .first()
        .map(|author| family_name(author))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "anon".to_string());

    let year = record
        .publication_year
        .map(|y| y.to_string())
        .unwrap_or_default();

    let title_word = record
        .title
        .split_whitespace()
        .map(key_part)
        .find(|word| !word.is_empty())
        .unwrap_or_default();

    format!("{family}{year}{title_word}")
}

/// "Doe, Jane" and "Jane Doe" both give "doe".
fn family_name(author: &str) -> String {
    let family = match author.split_once(',') {
        Some((family, _)) => family,
        None => author.split_whitespace().last().unwrap_or(author),
    };
    key_part(family)
}

fn key_part(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Finalize keys: every member of a colliding group gets `a`, `b`, …
/// in input order. Unique keys are left alone. A suffix that would land on
/// a key already in use is skipped.
pub fn assign_cite_keys(entries: impl IntoIterator<Item = CitationEntry>) -> Vec<CitationEntry> {
    let mut entries: Vec<CitationEntry> = entries.into_iter().collect();

    let mut totals: HashMap<String, usize> = HashMap::new();
    for entry in &entries {
        *totals.entry(entry.cite_key.clone()).or_default() += 1;
    }

    let mut taken: HashSet<String> = totals
        .iter()
        .filter(|(_, count)| **count < 2)
        .map(|(key, _)| key.clone())
        .collect();

    let mut seen: HashMap<String, usize> = HashMap::new();
    for entry in &mut entries {
        if totals.get(&entry.cite_key).copied().unwrap_or(0) < 2 {
            continue;
        }
        let n = seen.entry(entry.cite_key.clone()).or_default();
        let key = loop {
            let candidate = format!("{}{}", entry.cite_key, alpha_suffix(*n));
            *n += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(key.clone());
        entry.cite_key = key;
    }
    entries
}

/// 0 → "a", 25 → "z", 26 → "aa".
fn alpha_suffix(mut n: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
