//! Research state — the accumulating record of one answer-generation run.
//!
//! `ResearchState` is created once per loop invocation from the incoming
//! message sequence, mutated only by the loop (append-only history, monotonic
//! step increment), and destroyed when the loop returns. It is never shared
//! across concurrent requests.

use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// Fixed summary text recorded when a page could not be scraped.
pub const FAILURE_SUMMARY: &str = "Failed to scrape, so no summary could be generated.";

/// One search result after crawling and summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub date: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub summary: String,
}

/// All results for one issued query, in provider order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub query: String,
    pub results: Vec<ResultSummary>,
}

/// The mutable research-state container threaded through every iteration.
#[derive(Debug)]
pub struct ResearchState {
    /// Completed research rounds. Increments by exactly one per round,
    /// after the decider call, and never decreases.
    step: u32,

    /// The incoming conversation, read-only for the whole run.
    messages: Vec<Message>,

    /// Everything discovered so far, in query submission order.
    search_history: Vec<SearchHistoryEntry>,

    /// The decider's most recent "what was missing" note.
    last_feedback: Option<String>,
}

impl ResearchState {
    /// Build a fresh state from the incoming message sequence.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            step: 0,
            messages,
            search_history: Vec::new(),
            last_feedback: None,
        }
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Whether the step budget is exhausted.
    pub fn should_stop(&self, step_limit: u32) -> bool {
        self.step >= step_limit
    }

    /// Count one completed plan→research→decide round.
    pub fn increment_step(&mut self) {
        self.step += 1;
    }

    /// Append one query's results. History is append-only.
    pub fn report_search(&mut self, entry: SearchHistoryEntry) {
        self.search_history.push(entry);
    }

    pub fn search_history(&self) -> &[SearchHistoryEntry] {
        &self.search_history
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent user message, if any. Used for thread titling.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    pub fn set_feedback(&mut self, feedback: Option<String>) {
        self.last_feedback = feedback;
    }

    pub fn last_feedback(&self) -> Option<&str> {
        self.last_feedback.as_deref()
    }

    /// Render the conversation as tagged blocks for model prompts.
    ///
    /// Deterministic for a given state so prompt construction is reproducible
    /// in replay tests with scripted models.
    pub fn message_history(&self) -> String {
        self.messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "User",
                    Role::Assistant | Role::System => "Assistant",
                };
                format!("<{role}>{}</{role}>", message.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render the accumulated research, oldest query first.
    pub fn search_history_text(&self) -> String {
        self.search_history
            .iter()
            .map(|search| {
                let mut blocks = vec![format!("## Query: \"{}\"", search.query)];
                for result in &search.results {
                    blocks.push(
                        [
                            format!("### {} - {}", result.date, result.title),
                            result.url.clone(),
                            result.snippet.clone(),
                            "<summary>".into(),
                            result.summary.clone(),
                            "</summary>".into(),
                        ]
                        .join("\n\n"),
                    );
                }
                blocks.join("\n\n")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str, urls: &[&str]) -> SearchHistoryEntry {
        SearchHistoryEntry {
            query: query.into(),
            results: urls
                .iter()
                .map(|u| ResultSummary {
                    date: "2026-01-01".into(),
                    title: format!("Title for {u}"),
                    url: (*u).into(),
                    snippet: "snippet".into(),
                    summary: "summary".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn step_counter_is_monotonic() {
        let mut state = ResearchState::new(vec![]);
        assert_eq!(state.step(), 0);
        assert!(!state.should_stop(2));

        state.increment_step();
        state.increment_step();
        assert_eq!(state.step(), 2);
        assert!(state.should_stop(2));
    }

    #[test]
    fn search_history_preserves_submission_order() {
        let mut state = ResearchState::new(vec![]);
        state.report_search(entry("first", &["https://a.com"]));
        state.report_search(entry("second", &["https://b.com"]));

        let queries: Vec<_> = state
            .search_history()
            .iter()
            .map(|e| e.query.as_str())
            .collect();
        assert_eq!(queries, vec!["first", "second"]);
    }

    #[test]
    fn message_history_renders_tagged_blocks() {
        let state = ResearchState::new(vec![
            Message::user("What is the capital of France?"),
            Message::assistant("Let me check."),
        ]);
        let rendered = state.message_history();
        assert!(rendered.contains("<User>What is the capital of France?</User>"));
        assert!(rendered.contains("<Assistant>Let me check.</Assistant>"));
    }

    #[test]
    fn search_history_text_renders_query_and_summary() {
        let mut state = ResearchState::new(vec![]);
        state.report_search(entry("capital of France", &["https://a.com"]));

        let rendered = state.search_history_text();
        assert!(rendered.contains("## Query: \"capital of France\""));
        assert!(rendered.contains("https://a.com"));
        assert!(rendered.contains("<summary>"));
    }

    #[test]
    fn feedback_is_replaced_not_accumulated() {
        let mut state = ResearchState::new(vec![]);
        state.set_feedback(Some("missing dates".into()));
        state.set_feedback(Some("missing sources".into()));
        assert_eq!(state.last_feedback(), Some("missing sources"));
    }
}
