//! Action decider — judges after each research round whether the gathered
//! evidence is sufficient to answer.

use deepfin_core::error::ModelError;
use deepfin_core::{Action, LanguageModel, ObjectRequest, ResearchState};
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "\
You are a research-loop controller. Your job is to decide, after a round of \
research, whether enough information has been gathered to answer the user's \
question well, or whether another round of searching would meaningfully \
improve the answer.

Choose \"answer\" when the gathered summaries already cover the question, \
including dates and figures where the question needs them. Choose \
\"continue\" when something load-bearing is still missing, and say exactly \
what is missing in the feedback field so the next round can target it.

Always provide a short user-facing title for the chosen action (e.g. \
\"Checking recent match reports\") and your reasoning.";

/// Decides whether to keep researching or answer now.
pub struct ActionDecider {
    model: Arc<dyn LanguageModel>,
    model_id: String,
}

impl ActionDecider {
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
                "type": {
                    "type": "string",
                    "enum": ["continue", "answer"],
                    "description": "Whether to continue researching or answer now",
                },
                "title": {
                    "type": "string",
                    "description": "A short user-facing title for this action",
                },
                "reasoning": {
                    "type": "string",
                    "description": "Why this action was chosen",
                },
                "feedback": {
                    "type": "string",
                    "description": "Required when continuing: exactly what information is still missing",
                },
            },
            "required": ["type", "title", "reasoning"],
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
        } else {
            sections.push("No research has been performed yet.".into());
        }

        sections.join("\n\n")
    }

    /// Produce the verdict for the round that just completed.
    pub async fn decide(
        &self,
        state: &ResearchState,
        trace_id: Option<&str>,
    ) -> Result<Action, ModelError> {
        let request = ObjectRequest {
            model: self.model_id.clone(),
            system: SYSTEM_PROMPT.into(),
            prompt: Self::build_prompt(state),
            schema: Self::schema(),
            trace_id: trace_id.map(String::from),
        };

        let value = self.model.generate_object(request).await?;
        let action: Action = serde_json::from_value(value)
            .map_err(|e| ModelError::MalformedOutput(format!("action: {e}")))?;

        debug!(step = state.step(), action = action.title(), "Decided next action");
        Ok(action)
    }
}
