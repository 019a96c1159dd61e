use std::time::Duration;

use async_trait::async_trait;
use paperscope_core::IdentifierKind;
use paperscope_core::config::EnrichmentConfig;
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::enrichment::{IdentifierLookup, LookupOutcome};
use crate::error::Result;
use crate::http::{StatusClass, build_client, classify_status};
use crate::identifiers::doi::Doi;

/// NCBI E-utilities `efetch` lookup: PubMed id → DOI or PMC id.
pub struct PubmedLookup {
    client: reqwest::Client,
    base_url: String,
    tool: String,
    email: Option<String>,
}

impl PubmedLookup {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        Self::with_params(
            &config.pubmed_base_url,
            Duration::from_secs(config.request_timeout_secs),
            &config.tool,
            config.email.clone(),
        )
    }

    pub fn with_params(
        base_url: &str,
        timeout: Duration,
        tool: &str,
        email: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            tool: tool.to_string(),
            email,
        })
    }

    async fn fetch(&self, pmid: &str) -> std::result::Result<Option<String>, String> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        let mut query = vec![
            ("db", "pubmed"),
            ("id", pmid),
            ("retmode", "xml"),
            ("tool", self.tool.as_str()),
        ];
        if let Some(email) = &self.email {
            query.push(("email", email.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::Transient => return Err(format!("HTTP {status}")),
            StatusClass::Permanent => {
                debug!(pmid, %status, "efetch rejected the request");
                return Ok(None);
            }
        }

        response
            .text()
            .await
            .map(Some)
            .map_err(|e| format!("failed to read body: {e}"))
    }
}

#[async_trait]
impl IdentifierLookup for PubmedLookup {
    fn name(&self) -> &str {
        "pubmed"
    }

    fn supports(&self, source: &IdentifierKind, target: &IdentifierKind) -> bool {
        *source == IdentifierKind::PubmedId
            && matches!(target, IdentifierKind::Doi | IdentifierKind::Pmcid)
    }

    async fn lookup(
        &self,
        _source: &IdentifierKind,
        value: &str,
        target: &IdentifierKind,
    ) -> LookupOutcome {
        let body = match self.fetch(value).await {
            Ok(Some(body)) => body,
            Ok(None) => return LookupOutcome::NotFound,
            Err(reason) => return LookupOutcome::Transient(reason),
        };

        let ids = match parse_efetch(&body, value) {
            Ok(Some(ids)) => ids,
            Ok(None) => return LookupOutcome::NotFound,
            Err(reason) => return LookupOutcome::Transient(reason),
        };

        let found = match target {
            IdentifierKind::Doi => ids.doi,
            IdentifierKind::Pmcid => ids.pmc,
            _ => None,
        };
        match found {
            Some(value) => LookupOutcome::Found(value),
            None => LookupOutcome::NotFound,
        }
    }
}

// ─── efetch XML ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
struct PubmedArticle {
    #[serde(rename = "MedlineCitation")]
    citation: MedlineCitation,
    #[serde(rename = "PubmedData")]
    data: Option<PubmedData>,
}

#[derive(Debug, Deserialize)]
struct MedlineCitation {
    #[serde(rename = "PMID")]
    pmid: Option<Tagged>,
    #[serde(rename = "Article")]
    article: Option<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(rename = "ELocationID", default)]
    locations: Vec<ELocationId>,
}

#[derive(Debug, Deserialize)]
struct PubmedData {
    #[serde(rename = "ArticleIdList")]
    ids: Option<ArticleIdList>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct Tagged {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ELocationId {
    #[serde(rename = "@EIdType")]
    kind: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(rename = "@IdType")]
    kind: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

/// Identifiers an efetch record carries about the article itself.
#[derive(Debug, Default, PartialEq, Eq)]
struct ArticleIds {
    doi: Option<String>,
    pmc: Option<String>,
}

/// `Ok(None)` when the response holds no article for `pmid`; `Err` when it is
/// unreadable.
fn parse_efetch(xml: &str, pmid: &str) -> std::result::Result<Option<ArticleIds>, String> {
    let set: ArticleSet = from_str(xml).map_err(|e| format!("invalid efetch xml: {e}"))?;

    let article = set
        .articles
        .iter()
        .find(|a| a.citation.pmid.as_ref().is_some_and(|p| p.value.trim() == pmid));
    let Some(article) = article else {
        return Ok(None);
    };

    let article_ids: &[ArticleId] = article
        .data
        .as_ref()
        .and_then(|d| d.ids.as_ref())
        .map(|list| list.ids.as_slice())
        .unwrap_or_default();
    let id_of = |kind: &str| {
        article_ids
            .iter()
            .find(|id| id.kind.as_deref() == Some(kind))
            .map(|id| id.value.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let elocation_doi = article
        .citation
        .article
        .as_ref()
        .and_then(|a| {
            a.locations
                .iter()
                .find(|l| l.kind.as_deref() == Some("doi"))
        })
        .map(|l| l.value.trim().to_string());

    let doi = elocation_doi
        .into_iter()
        .chain(id_of("doi"))
        .find_map(|raw| Doi::parse(&raw).ok())
        .map(|doi| doi.normalized);

    Ok(Some(ArticleIds {
        doi,
        pmc: id_of("pmc"),
    }))
}
