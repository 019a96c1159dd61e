use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ScienceError};

// YYMM.NNNN or YYMM.NNNNN, optional version
static NEW_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(?:v(\d+))?$").expect("valid arXiv regex"));

// archive[.SUB]/YYMMNNN, optional version
static OLD_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-zA-Z\-]+(?:\.[A-Z]{2})?/\d{7})(?:v(\d+))?$").expect("valid arXiv regex")
});

/// An arXiv identifier split into its base id and optional version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivId {
    pub id: String,
    pub version: Option<u32>,
}

impl ArxivId {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let mut rest = trimmed;
        for prefix in ["https://arxiv.org/abs/", "http://arxiv.org/abs/", "arxiv:"] {
            if rest.len() >= prefix.len() && rest[..prefix.len()].eq_ignore_ascii_case(prefix) {
                rest = rest[prefix.len()..].trim_start();
                break;
            }
        }

        let caps = NEW_FORMAT
            .captures(rest)
            .or_else(|| OLD_FORMAT.captures(rest))
            .ok_or_else(|| ScienceError::InvalidArxivId(trimmed.to_string()))?;

        Ok(Self {
            id: caps[1].to_string(),
            version: caps.get(2).and_then(|v| v.as_str().parse().ok()),
        })
    }

    /// Abstract page for the latest version.
    pub fn abs_url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_format_with_version() {
        let id = ArxivId::parse("arXiv:2301.04567v2").unwrap();
        assert_eq!(id.id, "2301.04567");
        assert_eq!(id.version, Some(2));
        assert_eq!(id.abs_url(), "https://arxiv.org/abs/2301.04567");
    }

    #[test]
    fn old_format() {
        let id = ArxivId::parse("https://arxiv.org/abs/cs.AI/0601001").unwrap();
        assert_eq!(id.id, "cs.AI/0601001");
        assert_eq!(id.version, None);
    }

    #[test]
    fn rejects_non_arxiv() {
        for raw in ["12345", "not-arxiv", "123.456", ""] {
            assert!(ArxivId::parse(raw).is_err(), "{raw}");
        }
    }
}
