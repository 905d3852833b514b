//! Scripted doubles for loop components.
//!
//! All doubles are cheaply cloneable handles over shared state so tests can
//! keep a handle for assertions after moving a clone into the system under
//! test.

use async_trait::async_trait;
use deepfin_core::crawl::{BulkCrawlResult, CrawlProvider, CrawledPage};
use deepfin_core::error::{ModelError, SearchError};
use deepfin_core::model::{LanguageModel, ObjectRequest, TextRequest};
use deepfin_core::search::{SearchHit, SearchProvider, SearchResponse};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub fn hit(title: &str, link: &str, snippet: &str) -> SearchHit {
    SearchHit {
        title: title.into(),
        link: link.into(),
        snippet: snippet.into(),
        date: None,
    }
}

#[derive(Default)]
struct ModelScript {
    objects: VecDeque<serde_json::Value>,
    texts: VecDeque<String>,
    /// Prompt-substring keyed responses with an optional completion delay,
    /// for tests where call order is not deterministic.
    mapped_texts: Vec<(String, String, u64)>,
    object_requests: Vec<ObjectRequest>,
    text_requests: Vec<TextRequest>,
    events: Option<Arc<Mutex<Vec<String>>>>,
}

/// A language model that replays scripted responses.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    inner: Arc<Mutex<ModelScript>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_object(&self, value: serde_json::Value) {
        self.inner.lock().unwrap().objects.push_back(value);
    }

    pub fn push_text(&self, text: &str) {
        self.inner.lock().unwrap().texts.push_back(text.into());
    }

    /// Respond with `response` to any text request whose prompt contains
    /// `marker`, after sleeping `delay_ms` of (possibly virtual) time.
    pub fn map_text_delayed(&self, marker: &str, response: &str, delay_ms: u64) {
        self.inner
            .lock()
            .unwrap()
            .mapped_texts
            .push((marker.into(), response.into(), delay_ms));
    }

    pub fn map_text(&self, marker: &str, response: &str) {
        self.map_text_delayed(marker, response, 0);
    }

    /// Record an event string into `log` on every text call.
    pub fn log_events_to(&self, log: Arc<Mutex<Vec<String>>>) {
        self.inner.lock().unwrap().events = Some(log);
    }

    pub fn object_requests(&self) -> Vec<ObjectRequest> {
        self.inner.lock().unwrap().object_requests.clone()
    }

    pub fn text_requests(&self) -> Vec<TextRequest> {
        self.inner.lock().unwrap().text_requests.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> std::result::Result<serde_json::Value, ModelError> {
        let mut script = self.inner.lock().unwrap();
        script.object_requests.push(request);
        script
            .objects
            .pop_front()
            .ok_or_else(|| ModelError::MalformedOutput("no scripted object response left".into()))
    }

    async fn generate_text(
        &self,
        request: TextRequest,
    ) -> std::result::Result<String, ModelError> {
        let (response, delay_ms) = {
            let mut script = self.inner.lock().unwrap();
            if let Some(events) = &script.events {
                events.lock().unwrap().push("text-call".into());
            }
            let mapped = script
                .mapped_texts
                .iter()
                .find(|(marker, _, _)| request.prompt.contains(marker))
                .map(|(_, response, delay)| (response.clone(), *delay));
            script.text_requests.push(request);

            match mapped {
                Some(found) => found,
                None => (
                    script.texts.pop_front().ok_or_else(|| {
                        ModelError::MalformedOutput("no scripted text response left".into())
                    })?,
                    0,
                ),
            }
        };

        if delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
        }
        Ok(response)
    }
}

#[derive(Default)]
struct SearchScript {
    responses: HashMap<String, Vec<SearchHit>>,
    failing: Vec<String>,
    calls: Vec<String>,
}

/// A search provider that replays scripted hits per query. Unknown queries
/// yield zero results; queries marked failing yield a network error.
#[derive(Clone, Default)]
pub struct ScriptedSearch {
    inner: Arc<Mutex<SearchScript>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self, query: &str, hits: Vec<SearchHit>) {
        self.inner.lock().unwrap().responses.insert(query.into(), hits);
    }

    pub fn fail(&self, query: &str) {
        self.inner.lock().unwrap().failing.push(query.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(
        &self,
        query: &str,
        _num_results: u32,
        _cancel: &CancellationToken,
    ) -> std::result::Result<SearchResponse, SearchError> {
        let mut script = self.inner.lock().unwrap();
        script.calls.push(query.into());

        if script.failing.iter().any(|q| q == query) {
            return Err(SearchError::Network("scripted failure".into()));
        }

        Ok(SearchResponse {
            organic: script.responses.get(query).cloned().unwrap_or_default(),
        })
    }
}

#[derive(Default)]
struct CrawlScript {
    pages: HashMap<String, std::result::Result<String, String>>,
    batches: Vec<Vec<String>>,
}

/// A crawler that replays scripted per-URL outcomes and records every batch
/// it was asked for.
#[derive(Clone, Default)]
pub struct ScriptedCrawl {
    inner: Arc<Mutex<CrawlScript>>,
}

impl ScriptedCrawl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_ok(&self, url: &str, text: &str) {
        self.inner
            .lock()
            .unwrap()
            .pages
            .insert(url.into(), Ok(text.into()));
    }

    pub fn page_failed(&self, url: &str, reason: &str) {
        self.inner
            .lock()
            .unwrap()
            .pages
            .insert(url.into(), Err(reason.into()));
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.inner.lock().unwrap().batches.clone()
    }
}

#[async_trait]
impl CrawlProvider for ScriptedCrawl {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn crawl_many(&self, urls: &[String]) -> BulkCrawlResult {
        let mut script = self.inner.lock().unwrap();
        script.batches.push(urls.to_vec());

        let results: Vec<CrawledPage> = urls
            .iter()
            .map(|url| match script.pages.get(url) {
                Some(Ok(text)) => CrawledPage::ok(url.clone(), text.clone()),
                Some(Err(reason)) => CrawledPage::failed(url.clone(), reason.clone()),
                None => CrawledPage::failed(url.clone(), "not scripted"),
            })
            .collect();

        let failures = results.iter().filter(|p| p.result.is_err()).count();
        BulkCrawlResult {
            success: urls.is_empty() || failures < urls.len(),
            results,
        }
    }
}
