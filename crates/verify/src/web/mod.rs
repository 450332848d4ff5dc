//! Web search collaborator.
//!
//! The retriever consults a `WebSearchProvider` when local evidence is thin.
//! Providers only fetch; deadlines and degradation belong to the caller.

mod tavily;

pub use tavily::TavilyClient;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use verity_core::config::WebSearchSettings;
use verity_core::{AppError, AppResult};

/// A search hit returned by a web provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebDocument {
    pub url: String,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl WebDocument {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            published_at: None,
        }
    }
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    /// Search the web for `query`, returning at most `max_results` documents.
    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebDocument>>;
}

/// Provider used when web search is turned off. Every call fails, which the
/// retriever treats as a degraded local-only search.
#[derive(Debug, Default)]
pub struct DisabledSearch;

#[async_trait]
impl WebSearchProvider for DisabledSearch {
    fn provider_name(&self) -> &str {
        "disabled"
    }

    async fn search(&self, _query: &str, _max_results: usize) -> AppResult<Vec<WebDocument>> {
        Err(AppError::collaborator("web search", "web search is disabled"))
    }
}

/// Build the configured web search provider.
///
/// A Tavily provider without an API key falls back to `DisabledSearch`.
pub fn create_web_search(
    settings: &WebSearchSettings,
    api_key: Option<String>,
) -> AppResult<Arc<dyn WebSearchProvider>> {
    match settings.provider.to_lowercase().as_str() {
        "tavily" => match api_key {
            Some(key) if !key.trim().is_empty() => Ok(Arc::new(TavilyClient::new(
                key,
                settings.endpoint.as_deref(),
            )?)),
            _ => {
                tracing::warn!(
                    "No web search API key in ${}; web search disabled",
                    settings.api_key_env
                );
                Ok(Arc::new(DisabledSearch))
            }
        },
        "disabled" => Ok(Arc::new(DisabledSearch)),
        other => Err(AppError::Config(format!(
            "Unknown web search provider: {}",
            other
        ))),
    }
}

/// Parse the assorted date formats search APIs return.
pub(crate) fn parse_published_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
