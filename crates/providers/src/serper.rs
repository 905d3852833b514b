//! Serper keyword-search adapter.
//!
//! Wraps Serper's `/search` endpoint. Zero organic results is a valid
//! response; cancellation aborts the in-flight request promptly.

use async_trait::async_trait;
use deepfin_core::error::SearchError;
use deepfin_core::search::{SearchProvider, SearchResponse};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://google.serper.dev";

/// Serper search provider.
pub struct SerperSearch {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
}

impl SerperSearch {
    /// Create a new Serper provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "serper".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, query: &str, num_results: u32) -> Result<SearchResponse, SearchError> {
        let url = format!("{}/search", self.base_url);
        let body = SerperRequest {
            q: query,
            num: num_results,
        };

        debug!(provider = %self.name, query, num_results, "Sending search request");

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Serper returned error");
            return Err(SearchError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| SearchError::ApiError {
                status_code: 200,
                message: format!("Failed to parse search response: {e}"),
            })
    }
}

#[async_trait]
impl SearchProvider for SerperSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        num_results: u32,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SearchError::Cancelled),
            result = self.send(query, num_results) => result,
        }
    }
}
