//! Answer synthesis — streams the final answer from the accumulated research.
//!
//! The pump task outlives the caller's token receiver: a disconnected client
//! never prevents the answer from completing, reaching live subscribers, or
//! being handed to the finish hook for persistence.

use crate::hub::AnswerEvent;
use deepfin_core::error::ModelError;
use deepfin_core::{Annotation, LanguageModel, Message, ResearchState, TextRequest};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

const TOKEN_CHANNEL_CAPACITY: usize = 64;

const SYSTEM_PROMPT: &str = "\
You are a research assistant answering a question from gathered web research. \
Write a clear, well-structured answer in markdown. Ground every claim in the \
research provided and cite sources inline as markdown links using the source \
URLs. Do not invent information that is not in the research.";

const FINAL_ATTEMPT_NOTE: &str = "\
The research budget is exhausted, so this answer may be incomplete. Answer \
with what has been gathered, state clearly what could not be verified, and do \
not speculate beyond the research.";

/// Called exactly once with the completed assistant message.
pub type FinishHook = Box<dyn FnOnce(Message) + Send + 'static>;

/// A consumer handle for one answer's token stream.
#[derive(Debug)]
pub struct AnswerStream {
    stream_id: String,
    tokens: mpsc::Receiver<String>,
}

impl AnswerStream {
    pub(crate) fn new(stream_id: String, tokens: mpsc::Receiver<String>) -> Self {
        Self { stream_id, tokens }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The next token delta, or `None` once the answer is complete.
    pub async fn next_token(&mut self) -> Option<String> {
        self.tokens.recv().await
    }

    /// Drain the stream into the full answer text.
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(token) = self.next_token().await {
            text.push_str(&token);
        }
        text
    }

    /// Adapt the remaining tokens into a `futures::Stream`.
    pub fn into_stream(self) -> tokio_stream::wrappers::ReceiverStream<String> {
        tokio_stream::wrappers::ReceiverStream::new(self.tokens)
    }
}

/// Streams the final answer and drives completion side effects.
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    model_id: String,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, model_id: impl Into<String>) -> Self {
        Self {
            model,
            model_id: model_id.into(),
        }
    }

    fn system_prompt(is_final: bool) -> String {
        if is_final {
            format!("{SYSTEM_PROMPT}\n\n{FINAL_ATTEMPT_NOTE}")
        } else {
            SYSTEM_PROMPT.into()
        }
    }

    fn build_prompt(state: &ResearchState) -> String {
        let mut sections = vec![
            format!("Current date: {}", chrono::Utc::now().format("%Y-%m-%d")),
            format!("Message history:\n\n{}", state.message_history()),
        ];
        let research = state.search_history_text();
        if !research.is_empty() {
            sections.push(format!("Research gathered:\n\n{research}"));
        }
        sections.join("\n\n")
    }

    /// Start streaming the answer.
    ///
    /// Tokens flow to the returned receiver and, when `live` is provided, to
    /// every broadcast subscriber. On completion the assembled assistant
    /// message (with `annotations` attached) goes to `live` as a `Done` event
    /// and then to `on_finish`.
    pub async fn answer(
        &self,
        state: &ResearchState,
        is_final: bool,
        trace_id: Option<&str>,
        annotations: Vec<Annotation>,
        live: Option<broadcast::Sender<AnswerEvent>>,
        on_finish: FinishHook,
    ) -> Result<mpsc::Receiver<String>, ModelError> {
        let request = TextRequest {
            model: self.model_id.clone(),
            system: Self::system_prompt(is_final),
            prompt: Self::build_prompt(state),
            trace_id: trace_id.map(String::from),
        };

        debug!(is_final, step = state.step(), "Streaming answer");

        let mut chunks = self.model.stream_text(request).await?;
        let (tx, rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut full = String::new();
            let mut client_gone = false;

            while let Some(chunk) = chunks.recv().await {
                match chunk {
                    Ok(chunk) => {
                        if let Some(content) = chunk.content {
                            full.push_str(&content);
                            if let Some(live) = &live {
                                let _ = live.send(AnswerEvent::Token(content.clone()));
                            }
                            if !client_gone && tx.send(content).await.is_err() {
                                // Keep pumping for subscribers and persistence.
                                client_gone = true;
                            }
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Answer stream interrupted, finishing with partial text");
                        break;
                    }
                }
            }

            let message = Message::assistant(full).with_annotations(annotations);
            if let Some(live) = &live {
                let _ = live.send(AnswerEvent::Done(message.clone()));
            }
            on_finish(message);
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedModel;
    use deepfin_core::{Action, Message as CoreMessage};
    use tokio::sync::oneshot;

    fn state() -> ResearchState {
        ResearchState::new(vec![CoreMessage::user("What is the capital of France?")])
    }

    fn annotations() -> Vec<Annotation> {
        vec![Annotation::NewAction {
            action: Action::Answer {
                title: "Answering".into(),
                reasoning: "Enough evidence".into(),
            },
        }]
    }

    #[tokio::test]
    async fn tokens_flow_and_finish_carries_the_full_message() {
        let model = ScriptedModel::new();
        model.push_text("Paris is the capital of France.");

        let synthesizer = AnswerSynthesizer::new(Arc::new(model), "test-model");
        let (done_tx, done_rx) = oneshot::channel();
        let hook: FinishHook = Box::new(move |message| {
            let _ = done_tx.send(message);
        });

        let tokens = synthesizer
            .answer(&state(), false, None, annotations(), None, hook)
            .await
            .unwrap();

        let text = AnswerStream::new("s".into(), tokens).collect_text().await;
        assert_eq!(text, "Paris is the capital of France.");

        let message = done_rx.await.unwrap();
        assert_eq!(message.content, "Paris is the capital of France.");
        assert_eq!(message.annotations.len(), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_prevent_completion() {
        let model = ScriptedModel::new();
        model.push_text("Paris.");

        let synthesizer = AnswerSynthesizer::new(Arc::new(model), "test-model");
        let (done_tx, done_rx) = oneshot::channel();
        let hook: FinishHook = Box::new(move |message| {
            let _ = done_tx.send(message);
        });

        let tokens = synthesizer
            .answer(&state(), false, None, Vec::new(), None, hook)
            .await
            .unwrap();
        drop(tokens);

        let message = done_rx.await.unwrap();
        assert_eq!(message.content, "Paris.");
    }

    #[tokio::test]
    async fn stream_adapter_yields_every_token() {
        use futures::StreamExt;

        let model = ScriptedModel::new();
        model.push_text("Paris.");

        let synthesizer = AnswerSynthesizer::new(Arc::new(model), "test-model");
        let tokens = synthesizer
            .answer(&state(), false, None, Vec::new(), None, Box::new(|_| {}))
            .await
            .unwrap();

        let collected: Vec<String> = AnswerStream::new("s".into(), tokens)
            .into_stream()
            .collect()
            .await;
        assert_eq!(collected.concat(), "Paris.");
    }

    #[tokio::test]
    async fn final_attempt_hedges_the_system_prompt() {
        let model = ScriptedModel::new();
        model.push_text("Partial answer.");

        let synthesizer = AnswerSynthesizer::new(Arc::new(model.clone()), "test-model");
        let tokens = synthesizer
            .answer(&state(), true, None, Vec::new(), None, Box::new(|_| {}))
            .await
            .unwrap();
        AnswerStream::new("s".into(), tokens).collect_text().await;

        let requests = model.text_requests();
        assert!(requests[0].system.contains("may be incomplete"));
    }
}
