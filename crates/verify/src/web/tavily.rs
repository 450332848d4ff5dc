//! Tavily search API client.

use super::{parse_published_date, WebDocument, WebSearchProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use verity_core::{AppError, AppResult};

const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";
const SEARCH_ENDPOINT: &str = "/search";
const SERVICE: &str = "web search";

#[derive(Debug, Clone)]
pub struct TavilyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> AppResult<Self> {
        let client = Client::builder().build().map_err(|e| {
            AppError::Config(format!("Failed to create HTTP client for Tavily: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: endpoint
                .unwrap_or(DEFAULT_TAVILY_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl WebSearchProvider for TavilyClient {
    fn provider_name(&self) -> &str {
        "tavily"
    }

    #[instrument(skip(self, query), fields(provider = "tavily"))]
    async fn search(&self, query: &str, max_results: usize) -> AppResult<Vec<WebDocument>> {
        let url = format!("{}{}", self.base_url, SEARCH_ENDPOINT);
        let request = SearchRequest {
            query,
            max_results,
            search_depth: "basic",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::collaborator(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::collaborator(
                SERVICE,
                format!("Tavily API error ({}): {}", status, error_text),
            ));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            AppError::collaborator(SERVICE, format!("Failed to parse Tavily response: {}", e))
        })?;

        let documents: Vec<WebDocument> = body
            .results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .take(max_results)
            .map(|r| WebDocument {
                published_at: r.published_date.as_deref().and_then(parse_published_date),
                url: r.url,
                text: r.content,
            })
            .collect();

        debug!("Tavily returned {} documents", documents.len());
        Ok(documents)
    }
}
