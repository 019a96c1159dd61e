use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of a bibliographic identifier. Serialized as its lowercase name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IdentifierKind {
    Doi,
    PubmedId,
    ArxivId,
    Pmcid,
    Other(String),
}

impl IdentifierKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Doi => "doi",
            Self::PubmedId => "pubmed_id",
            Self::ArxivId => "arxiv_id",
            Self::Pmcid => "pmcid",
            Self::Other(name) => name,
        }
    }

    /// Canonical stored form of `raw` for this kind, or `None` when nothing is left.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        let value = match self {
            Self::Doi => {
                let mut rest = trimmed;
                for prefix in [
                    "https://doi.org/",
                    "http://doi.org/",
                    "https://dx.doi.org/",
                    "http://dx.doi.org/",
                    "doi:",
                ] {
                    if let Some(stripped) = strip_prefix_ignore_case(rest, prefix) {
                        rest = stripped.trim_start();
                        break;
                    }
                }
                rest.to_lowercase()
            }
            Self::PubmedId => strip_prefix_ignore_case(trimmed, "pmid:")
                .unwrap_or(trimmed)
                .trim()
                .to_string(),
            Self::ArxivId => {
                let mut rest = trimmed;
                for prefix in ["https://arxiv.org/abs/", "http://arxiv.org/abs/", "arxiv:"] {
                    if let Some(stripped) = strip_prefix_ignore_case(rest, prefix) {
                        rest = stripped.trim_start();
                        break;
                    }
                }
                rest.to_string()
            }
            Self::Pmcid => {
                let upper = trimmed.to_uppercase();
                if upper.is_empty() || upper.starts_with("PMC") {
                    upper
                } else {
                    format!("PMC{upper}")
                }
            }
            Self::Other(_) => trimmed.to_string(),
        };

        (!value.is_empty()).then_some(value)
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "" => Err("empty identifier kind".to_string()),
            "doi" => Ok(Self::Doi),
            "pubmed_id" | "pubmed" | "pmid" => Ok(Self::PubmedId),
            "arxiv_id" | "arxiv" => Ok(Self::ArxivId),
            "pmcid" | "pmc" => Ok(Self::Pmcid),
            _ => Ok(Self::Other(name)),
        }
    }
}

impl TryFrom<String> for IdentifierKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IdentifierKind> for String {
    fn from(kind: IdentifierKind) -> Self {
        kind.as_str().to_string()
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &s[prefix.len()..])
}

/// Result of offering a value to an [`Identifiers`] map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The same (normalized) value was already present.
    Unchanged,
    /// The value normalized to nothing and was dropped.
    Ignored,
}

/// A different value is already stored for this kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierConflict {
    pub kind: IdentifierKind,
    pub existing: String,
    pub incoming: String,
}

impl fmt::Display for IdentifierConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conflicting {} values: kept {:?}, rejected {:?}",
            self.kind, self.existing, self.incoming
        )
    }
}

/// Identifier map with at most one non-empty, normalized value per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<IdentifierKind, String>"
)]
pub struct Identifiers(BTreeMap<IdentifierKind, String>);

impl Identifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &IdentifierKind) -> Option<&str> {
        self.0.get(kind).map(String::as_str)
    }

    pub fn doi(&self) -> Option<&str> {
        self.get(&IdentifierKind::Doi)
    }

    pub fn pubmed_id(&self) -> Option<&str> {
        self.get(&IdentifierKind::PubmedId)
    }

    pub fn arxiv_id(&self) -> Option<&str> {
        self.get(&IdentifierKind::ArxivId)
    }

    pub fn contains(&self, kind: &IdentifierKind) -> bool {
        self.0.contains_key(kind)
    }

    pub fn insert(
        &mut self,
        kind: IdentifierKind,
        raw: &str,
    ) -> Result<InsertOutcome, IdentifierConflict> {
        let Some(value) = kind.normalize(raw) else {
            return Ok(InsertOutcome::Ignored);
        };
        match self.0.get(&kind) {
            Some(existing) if *existing == value => Ok(InsertOutcome::Unchanged),
            Some(existing) => Err(IdentifierConflict {
                kind,
                existing: existing.clone(),
                incoming: value,
            }),
            None => {
                self.0.insert(kind, value);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentifierKind, &str)> {
        self.0.iter().map(|(kind, value)| (kind, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keys are kept raw until each one goes through `insert`, so aliases of the
/// same kind ("pmid" and "pubmed_id") conflict instead of overwriting.
impl TryFrom<BTreeMap<String, String>> for Identifiers {
    type Error = String;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut ids = Self::new();
        for (name, raw) in map {
            let kind: IdentifierKind = name.parse()?;
            if ids.insert(kind.clone(), &raw)? == InsertOutcome::Ignored {
                return Err(format!("empty value for identifier {kind}"));
            }
        }
        Ok(ids)
    }
}

impl From<Identifiers> for BTreeMap<IdentifierKind, String> {
    fn from(ids: Identifiers) -> Self {
        ids.0
    }
}

impl From<IdentifierConflict> for String {
    fn from(conflict: IdentifierConflict) -> Self {
        conflict.to_string()
    }
}
