//! Query planner — turns the conversation plus research so far into the
//! next batch of search queries.
//!
//! A planner failure is fatal for the run: without queries there is no
//! research round, so errors propagate instead of degrading.

use deepfin_core::error::ModelError;
use deepfin_core::{LanguageModel, ObjectRequest, ResearchState};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Hard cap on queries per round regardless of what the model proposes.
const MAX_QUERIES: usize = 5;

const SYSTEM_PROMPT: &str = "\
You are a strategic research planner with expertise in breaking down complex \
questions into logical search steps. Your job is to create a detailed research \
plan before generating any search queries.

First, analyze the question thoroughly: break it down into core components, \
identify any implicit assumptions, and determine what foundational knowledge \
is needed. Then, develop a systematic research plan and, from that plan, \
generate a numbered list of 3-5 sequential search queries.

Your queries should be specific and focused (avoid broad queries), written in \
natural language without Boolean operators, and progress logically from \
foundational to specific information. If information gathered so far was \
flagged as insufficient, prioritize queries that fill exactly those gaps.";

/// The planner's output for one research round.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryPlan {
    /// The model's written research plan. Kept for telemetry only.
    pub plan: String,
    /// The queries to issue, in priority order.
    pub queries: Vec<String>,
}

/// Plans the next round of search queries.
pub struct QueryPlanner {
    model: Arc<dyn LanguageModel>,
    model_id: String,
}

impl QueryPlanner {
    pub fn new(model: Arc<dyn LanguageModel>, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
        }
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "plan": {
                    "type": "string",
                    "description": "A detailed research plan outlining the logical progression of information needed",
                },
                "queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "A numbered list of 3-5 sequential search queries",
                },
            },
            "required": ["plan", "queries"],
            "additionalProperties": false,
        })
    }

    fn build_prompt(state: &ResearchState) -> String {
        let mut sections = vec![
            format!("Current date: {}", chrono::Utc::now().format("%Y-%m-%d")),
            format!("Message history:\n\n{}", state.message_history()),
        ];

        let research = state.search_history_text();
        if !research.is_empty() {
            sections.push(format!("Information gathered so far:\n\n{research}"));
        }
        if let Some(feedback) = state.last_feedback() {
            sections.push(format!(
                "The previous round was judged insufficient for this reason:\n\n{feedback}"
            ));
        }

        sections.join("\n\n")
    }

    /// Produce the next query batch.
    pub async fn plan(
        &self,
        state: &ResearchState,
        trace_id: Option<&str>,
    ) -> Result<QueryPlan, ModelError> {
        let request = ObjectRequest {
            model: self.model_id.clone(),
            system: SYSTEM_PROMPT.into(),
            prompt: Self::build_prompt(state),
            schema: Self::schema(),
            trace_id: trace_id.map(String::from),
        };

        let value = self.model.generate_object(request).await?;
        let mut plan: QueryPlan = serde_json::from_value(value)
            .map_err(|e| ModelError::MalformedOutput(format!("query plan: {e}")))?;

        plan.queries.retain(|q| !q.trim().is_empty());
        if plan.queries.is_empty() {
            return Err(ModelError::MalformedOutput(
                "query plan contained no usable queries".into(),
            ));
        }
        plan.queries.truncate(MAX_QUERIES);

        debug!(step = state.step(), queries = ?plan.queries, "Planned research round");
        Ok(plan)
    }
}
