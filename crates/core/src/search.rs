//! SearchProvider trait — the abstraction over keyword-search backends.

use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// One organic search result as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A search response. Zero results is a valid response, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub organic: Vec<SearchHit>,
}

/// The keyword-search trait.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// A human-readable name for this backend (e.g., "serper").
    fn name(&self) -> &str;

    /// Issue one query, returning up to `num_results` organic hits.
    ///
    /// Implementations must observe `cancel` and return
    /// `SearchError::Cancelled` promptly once it fires.
    async fn search(
        &self,
        query: &str,
        num_results: u32,
        cancel: &CancellationToken,
    ) -> std::result::Result<SearchResponse, SearchError>;
}
