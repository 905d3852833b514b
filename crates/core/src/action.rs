//! Loop actions and annotations.
//!
//! An `Action` is the decider's verdict for one research round: keep
//! gathering evidence or answer now. An `Annotation` is a unit of loop
//! telemetry streamed to an observer alongside the answer tokens, and also
//! attached to the final assistant message for replay.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The decider's verdict for one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Keep researching — more evidence could improve the answer.
    Continue {
        /// Concise UI title, e.g. "Checking HMRC industrial action".
        title: String,
        /// Why this step was chosen.
        reasoning: String,
        /// What was missing, for the planner to incorporate next pass.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    /// Enough evidence gathered — answer the question and complete the loop.
    Answer { title: String, reasoning: String },
}

impl Action {
    /// The UI title regardless of variant.
    pub fn title(&self) -> &str {
        match self {
            Self::Continue { title, .. } | Self::Answer { title, .. } => title,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer { .. })
    }
}

/// A deduplicated source shown to the user while summaries are still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Display metadata derived from the URL host; not semantically load-bearing.
    pub favicon: String,
}

/// A unit of loop telemetry, relayed live and stored on the final message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Annotation {
    /// The decider chose an action for this round.
    #[serde(rename = "NEW_ACTION")]
    NewAction { action: Action },

    /// The deduplicated sources found by one research round.
    #[serde(rename = "SOURCES")]
    Sources { sources: Vec<Source> },
}

/// Caller-supplied observer invoked synchronously for every annotation the
/// loop produces. The core does not know or care how it is transported.
pub type AnnotationSink = Arc<dyn Fn(&Annotation) + Send + Sync>;

/// A sink that drops every annotation. Useful for headless runs and tests.
pub fn null_sink() -> AnnotationSink {
    Arc::new(|_| {})
}

/// Derive a favicon URL from a page URL's host.
///
/// Returns an empty string when the URL does not parse.
pub fn favicon_url(page_url: &str) -> String {
    match url::Url::parse(page_url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("https://www.google.com/s2/favicons?domain={host}&sz=128"),
            None => String::new(),
        },
        Err(_) => String::new(),
    }
}
