//! Bulk page crawler — concurrent fetch plus HTML-to-text extraction.
//!
//! Every URL yields either extracted text or a failure reason; nothing in
//! here aborts the batch. Extraction is deterministic and "good enough",
//! not a full readability engine.

use async_trait::async_trait;
use deepfin_core::crawl::{BulkCrawlResult, CrawlProvider, CrawledPage};
use futures::future::join_all;
use std::io::Cursor;
use tracing::{debug, warn};

const DEFAULT_MAX_CONTENT_BYTES: usize = 16 * 1024;
const TEXT_WIDTH: usize = 100;

/// HTTP crawler that fetches all URLs concurrently.
pub struct BulkCrawler {
    name: String,
    client: reqwest::Client,
    /// Extracted text is truncated to this many bytes before summarization.
    max_content_bytes: usize,
}

impl BulkCrawler {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent("deepfin-crawler/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "bulk_crawler".into(),
            client,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
        }
    }

    pub fn with_max_content_bytes(mut self, max: usize) -> Self {
        self.max_content_bytes = max;
        self
    }

    async fn crawl_one(&self, url: &str) -> CrawledPage {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return CrawledPage::failed(url, format!("Request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return CrawledPage::failed(url, format!("HTTP status {}", status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return CrawledPage::failed(url, format!("Failed to read body: {e}")),
        };

        let text = if content_type.contains("text/html") || looks_like_html(&body) {
            html_to_text(&body)
        } else if content_type.starts_with("text/") || content_type.contains("json") {
            body
        } else {
            return CrawledPage::failed(url, format!("Unsupported content type: {content_type}"));
        };

        let text = normalize(&text, self.max_content_bytes);
        if text.is_empty() {
            return CrawledPage::failed(url, "No extractable text");
        }

        CrawledPage::ok(url, text)
    }
}

impl Default for BulkCrawler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrawlProvider for BulkCrawler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn crawl_many(&self, urls: &[String]) -> BulkCrawlResult {
        debug!(provider = %self.name, count = urls.len(), "Crawling batch");

        let results = join_all(urls.iter().map(|url| self.crawl_one(url))).await;

        let failures = results.iter().filter(|p| p.result.is_err()).count();
        if failures > 0 {
            warn!(failures, total = urls.len(), "Some pages failed to crawl");
        }

        BulkCrawlResult {
            // Batch-level failure means every URL failed; partial failure is
            // still a successful batch.
            success: urls.is_empty() || failures < urls.len(),
            results,
        }
    }
}

fn looks_like_html(body: &str) -> bool {
    // Sniff only the head of the document; the cut must land on a char
    // boundary or slicing panics on multibyte content.
    let mut end = body.len().min(512);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let lowered = body[..end].to_lowercase();
    lowered.contains("<!doctype html") || lowered.contains("<html")
}

/// Convert HTML to readable plain text.
fn html_to_text(html: &str) -> String {
    html2text::from_read(Cursor::new(html.as_bytes()), TEXT_WIDTH)
        .unwrap_or_else(|_| html.to_string())
}

/// Collapse blank-line runs and truncate at a char boundary.
fn normalize(text: &str, max_bytes: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_bytes));
    let mut blank_run = 0;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(trimmed);
    }

    let out = out.trim().to_string();
    if out.len() <= max_bytes {
        return out;
    }
    let mut cut = max_bytes;
    while !out.is_char_boundary(cut) {
        cut -= 1;
    }
    out[..cut].to_string()
}
