use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root application configuration, loaded from `~/.config/paperscope/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub review: ReviewConfig,
    pub merge: MergeConfig,
    pub enrichment: EnrichmentConfig,
    pub export: ExportConfig,
}

/// One classification axis offered during review, e.g. "Study Type".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub categories: Vec<CategoryConfig>,
    pub highlights: Vec<String>,
    pub start_at_first_unreviewed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub title_similarity_threshold: f64,
    pub allow_conflicts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub min_interval_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub request_timeout_secs: u64,
    /// Flush the dataset after this many completed lookups. 0 = only at the end.
    pub checkpoint_every: usize,
    pub pubmed_base_url: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub search_base_url: String,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            highlights: Vec::new(),
            start_at_first_unreviewed: true,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.91,
            allow_conflicts: false,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 500,
            max_attempts: 3,
            backoff_base_ms: 1000,
            request_timeout_secs: 10,
            checkpoint_every: 25,
            pubmed_base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            tool: "paperscope".to_string(),
            email: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            search_base_url: "https://scholar.google.com/scholar".to_string(),
        }
    }
}

impl ReviewConfig {
    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.name == name)
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/paperscope/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PAPERSCOPE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("paperscope")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.merge.title_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CoreError::ConfigError(format!(
                "merge.title_similarity_threshold must be within 0.0..=1.0, got {threshold}"
            )));
        }
        if self.enrichment.max_attempts == 0 {
            return Err(CoreError::ConfigError(
                "enrichment.max_attempts must be at least 1".to_string(),
            ));
        }
        for (idx, category) in self.review.categories.iter().enumerate() {
            if category.name.trim().is_empty() {
                return Err(CoreError::ConfigError(format!(
                    "review.categories[{idx}] has an empty name"
                )));
            }
            if self.review.categories[..idx]
                .iter()
                .any(|c| c.name == category.name)
            {
                return Err(CoreError::ConfigError(format!(
                    "review category {:?} is defined twice",
                    category.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.enrichment.min_interval_ms, 500);
        assert_eq!(cfg.merge.title_similarity_threshold, 0.91);
        assert!(cfg.review.start_at_first_unreviewed);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.review.categories.push(CategoryConfig {
            name: "Study Type".to_string(),
            labels: vec!["Clinical Trial".to_string(), "Observational".to_string()],
        });
        cfg.review.highlights = vec!["diagnos".to_string(), "AUC".to_string()];
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.review.categories, cfg.review.categories);
        assert_eq!(loaded.review.highlights, cfg.review.highlights);
        assert_eq!(loaded.enrichment.pubmed_base_url, cfg.enrichment.pubmed_base_url);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[merge]\nallow_conflicts = true\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert!(cfg.merge.allow_conflicts);
        assert_eq!(cfg.merge.title_similarity_threshold, 0.91);
        assert_eq!(cfg.enrichment.max_attempts, 3);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg =
            AppConfig::load_from(Path::new("/tmp/nonexistent_paperscope_config.toml")).unwrap();
        assert_eq!(cfg.export.search_base_url, "https://scholar.google.com/scholar");
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut cfg = AppConfig::default();
        for _ in 0..2 {
            cfg.review.categories.push(CategoryConfig {
                name: "Quality".to_string(),
                labels: vec!["High".to_string()],
            });
        }
        assert!(matches!(cfg.validate(), Err(CoreError::ConfigError(_))));
    }
}
