//! One research round: search every planned query, crawl the deduplicated
//! result set once, summarize each page, and record everything into the
//! research state.
//!
//! The pipeline never fails as a whole. A failed query contributes zero
//! results, and a failed crawl or summary degrades to the fixed failure
//! summary on that result.

use crate::summarizer::{PageContext, Summarizer};
use deepfin_core::crawl::CrawlProvider;
use deepfin_core::search::{SearchHit, SearchProvider};
use deepfin_core::state::{ResearchState, ResultSummary, SearchHistoryEntry, FAILURE_SUMMARY};
use deepfin_core::{favicon_url, Annotation, AnnotationSink, Source};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Executes the search, crawl, and summarize stages for one round.
pub struct ResearchPipeline {
    search: Arc<dyn SearchProvider>,
    crawl: Arc<dyn CrawlProvider>,
    summarizer: Summarizer,
    results_per_query: u32,
}

impl ResearchPipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        crawl: Arc<dyn CrawlProvider>,
        summarizer: Summarizer,
        results_per_query: u32,
    ) -> Self {
        Self {
            search,
            crawl,
            summarizer,
            results_per_query,
        }
    }

    /// Run one round for the planned queries, appending one history entry per
    /// query in submission order.
    pub async fn run(
        &self,
        state: &mut ResearchState,
        queries: &[String],
        sink: &AnnotationSink,
        cancel: &CancellationToken,
        trace_id: Option<&str>,
    ) {
        // Fan out the searches; a failed query contributes zero results and
        // never poisons its siblings.
        let searches: Vec<(String, Vec<SearchHit>)> =
            join_all(queries.iter().map(|query| async move {
                match self
                    .search
                    .search(query, self.results_per_query, cancel)
                    .await
                {
                    Ok(response) => {
                        let mut hits = response.organic;
                        hits.truncate(self.results_per_query as usize);
                        (query.clone(), hits)
                    }
                    Err(e) => {
                        warn!(query = %query, error = %e, "Search failed, treating as zero results");
                        (query.clone(), Vec::new())
                    }
                }
            }))
            .await;

        // Deduplicate URLs across the whole batch, first seen wins.
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let mut sources = Vec::new();
        for (_, hits) in &searches {
            for hit in hits {
                if seen.insert(hit.link.clone()) {
                    urls.push(hit.link.clone());
                    sources.push(Source {
                        title: hit.title.clone(),
                        url: hit.link.clone(),
                        snippet: hit.snippet.clone(),
                        favicon: favicon_url(&hit.link),
                    });
                }
            }
        }

        debug!(
            queries = queries.len(),
            unique_urls = urls.len(),
            "Research round gathered results"
        );

        // The observer sees the sources as soon as they are known, while the
        // summaries are still in flight.
        sink(&Annotation::Sources { sources });

        let crawled = self.crawl.crawl_many(&urls).await;
        if !crawled.success && !urls.is_empty() {
            warn!(urls = urls.len(), "Every crawl in the batch failed");
        }

        // Every result starts with the failure summary; successful summaries
        // overwrite it below.
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let mut entries: Vec<SearchHistoryEntry> = searches
            .iter()
            .map(|(query, hits)| SearchHistoryEntry {
                query: query.clone(),
                results: hits
                    .iter()
                    .map(|hit| ResultSummary {
                        date: hit.date.clone().unwrap_or_else(|| today.clone()),
                        title: hit.title.clone(),
                        url: hit.link.clone(),
                        snippet: hit.snippet.clone(),
                        summary: FAILURE_SUMMARY.into(),
                    })
                    .collect(),
            })
            .collect();

        let conversation = state.message_history();
        let mut jobs = Vec::new();
        for (qi, entry) in entries.iter().enumerate() {
            for (ri, result) in entry.results.iter().enumerate() {
                let Some(text) = crawled
                    .outcome_for(&result.url)
                    .and_then(|page| page.result.as_ref().ok())
                    .cloned()
                else {
                    continue;
                };

                let page = PageContext {
                    query: entry.query.clone(),
                    date: result.date.clone(),
                    title: result.title.clone(),
                    url: result.url.clone(),
                };
                let summarizer = &self.summarizer;
                let conversation = conversation.as_str();
                jobs.push(async move {
                    (
                        qi,
                        ri,
                        summarizer.summarize(conversation, &page, &text, trace_id).await,
                    )
                });
            }
        }

        for (qi, ri, outcome) in join_all(jobs).await {
            match outcome {
                Ok(summary) => entries[qi].results[ri].summary = summary,
                Err(e) => {
                    warn!(url = %entries[qi].results[ri].url, error = %e, "Summarization failed, keeping failure summary");
                }
            }
        }

        // Completion order of the summaries never reorders the record.
        for entry in entries {
            state.report_search(entry);
        }
    }
}
