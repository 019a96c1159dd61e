use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ScienceError};

static DOI_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("valid DOI regex"));

const PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// A syntactically valid DOI in lowercase canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doi {
    pub normalized: String,
}

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let mut rest = trimmed;
        for prefix in PREFIXES {
            if rest.len() >= prefix.len() && rest[..prefix.len()].eq_ignore_ascii_case(prefix) {
                rest = rest[prefix.len()..].trim_start();
                break;
            }
        }

        let normalized = rest.to_lowercase();
        if !DOI_SHAPE.is_match(&normalized) {
            return Err(ScienceError::InvalidDoi(trimmed.to_string()));
        }
        Ok(Self { normalized })
    }

    pub fn resolver_url(&self) -> String {
        format!("https://doi.org/{}", self.normalized)
    }
}
