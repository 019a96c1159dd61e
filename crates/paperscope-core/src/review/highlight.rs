use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use crate::error::{CoreError, Result};
use crate::models::{Record, TermMatch};

/// Case-insensitive keyword scanner for abstracts.
#[derive(Debug, Clone)]
pub struct Highlighter {
    pattern: Option<Regex>,
    keywords: HashMap<String, String>,
}

impl Highlighter {
    pub fn new(keywords: &[String]) -> Result<Self> {
        let mut unique: Vec<&str> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        // Longest first so the alternation prefers "neural network" over "neural".
        unique.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        unique.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

        if unique.is_empty() {
            return Ok(Self {
                pattern: None,
                keywords: HashMap::new(),
            });
        }

        let alternation = unique
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
            .map_err(|e| CoreError::ConfigError(format!("invalid highlight keywords: {e}")))?;

        let keywords = unique
            .iter()
            .map(|k| (k.to_lowercase(), (*k).to_string()))
            .collect();

        Ok(Self {
            pattern: Some(pattern),
            keywords,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    /// Non-overlapping keyword matches in text order.
    pub fn find(&self, text: &str) -> Vec<TermMatch> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };
        pattern
            .find_iter(text)
            .map(|m| {
                let matched = m.as_str().to_lowercase();
                let keyword = self
                    .keywords
                    .get(&matched)
                    .cloned()
                    .unwrap_or_else(|| m.as_str().to_string());
                TermMatch {
                    keyword,
                    start: m.start(),
                    end: m.end(),
                }
            })
            .collect()
    }

    /// Recompute `record.highlighted_terms` from its abstract.
    pub fn apply(&self, record: &mut Record) {
        record.highlighted_terms = record
            .abstract_text
            .as_deref()
            .map(|text| self.find(text))
            .unwrap_or_default();
    }
}
