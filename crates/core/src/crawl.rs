//! CrawlProvider trait — bulk concurrent page fetch and extraction.
//!
//! The crawl boundary is deliberately infallible at the batch level: a
//! provider outage degrades to "every URL failed" rather than aborting the
//! research round.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The outcome for one URL: extracted text or a failure reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub result: std::result::Result<String, String>,
}

impl CrawledPage {
    pub fn ok(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            result: Ok(text.into()),
        }
    }

    pub fn failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            result: Err(reason.into()),
        }
    }
}

/// The result of one bulk crawl. Contains an entry for every requested URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCrawlResult {
    /// False when every URL failed (e.g. a batch-level outage).
    pub success: bool,
    pub results: Vec<CrawledPage>,
}

impl BulkCrawlResult {
    /// Mark every URL as failed with one shared reason.
    pub fn all_failed(urls: &[String], reason: &str) -> Self {
        Self {
            success: false,
            results: urls
                .iter()
                .map(|u| CrawledPage::failed(u.clone(), reason))
                .collect(),
        }
    }

    /// Look up the outcome for a URL.
    pub fn outcome_for(&self, url: &str) -> Option<&CrawledPage> {
        self.results.iter().find(|p| p.url == url)
    }
}

/// The bulk crawl trait.
#[async_trait]
pub trait CrawlProvider: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Fetch and extract every URL concurrently, returning a per-URL outcome
    /// for each. Never fails as a whole.
    async fn crawl_many(&self, urls: &[String]) -> BulkCrawlResult;
}
