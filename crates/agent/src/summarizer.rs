//! Page summarizer — condenses one crawled page into the facts relevant to
//! the conversation and the query that surfaced it.
//!
//! The caller owns the fallback policy: a summarizer error becomes the fixed
//! failure summary, never an aborted round.

use deepfin_core::error::ModelError;
use deepfin_core::{LanguageModel, TextRequest};
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "\
You are a research extraction specialist. Given a research topic and raw web \
content, create a thoroughly detailed synthesis as a cohesive narrative that \
flows naturally between key concepts.

Extract the most valuable information related to the research topic, \
including relevant facts, statistics, methodologies, claims, and contextual \
information. Preserve technical terminology and domain-specific language, and \
maintain the integrity of original quotes or statements. Include publication \
dates or timeline information where available. Write in a prose format with \
proper sentences and paragraphs; think of this as writing the perfect \
research notes that capture everything needed without padding.";

/// Identifying metadata for the page being summarized.
#[derive(Debug, Clone)]
pub struct PageContext {
    /// The query that surfaced this result.
    pub query: String,
    pub date: String,
    pub title: String,
    pub url: String,
}

/// Summarizes crawled pages against the conversation.
pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    model_id: String,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
        }
    }

    fn build_prompt(conversation: &str, page: &PageContext, content: &str) -> String {
        [
            format!("Research topic (conversation so far):\n\n{conversation}"),
            format!("This page was found by searching for: \"{}\"", page.query),
            format!(
                "Page metadata:\n\n- Date: {}\n- Title: {}\n- URL: {}",
                page.date, page.title, page.url
            ),
            format!("Raw page content:\n\n{content}"),
        ]
        .join("\n\n")
    }

    /// Summarize one page. Errors surface to the caller, which records the
    /// fixed failure summary instead.
    pub async fn summarize(
        &self,
        conversation: &str,
        page: &PageContext,
        content: &str,
        trace_id: Option<&str>,
    ) -> Result<String, ModelError> {
        debug!(url = %page.url, query = %page.query, "Summarizing page");

        let request = TextRequest {
            model: self.model_id.clone(),
            system: SYSTEM_PROMPT.into(),
            prompt: Self::build_prompt(conversation, page, content),
            trace_id: trace_id.map(String::from),
        };

        self.model.generate_text(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedModel;

    #[tokio::test]
    async fn prompt_carries_page_metadata_and_content() {
        let model = ScriptedModel::new();
        model.push_text("Paris has been the capital of France since 987.");

        let summarizer = Summarizer::new(Arc::new(model.clone()), "test-model");
        let page = PageContext {
            query: "capital of France".into(),
            date: "2026-01-01".into(),
            title: "France - Encyclopedia".into(),
            url: "https://example.com/france".into(),
        };

        let summary = summarizer
            .summarize("<User>capital?</User>", &page, "Paris is the capital.", None)
            .await
            .unwrap();
        assert!(summary.contains("987"));

        let requests = model.text_requests();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0].prompt;
        assert!(prompt.contains("https://example.com/france"));
        assert!(prompt.contains("\"capital of France\""));
        assert!(prompt.contains("Paris is the capital."));
    }
}
