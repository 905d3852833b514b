//! LanguageModel trait — the abstraction over model backends.
//!
//! The loop makes three kinds of model calls: schema-constrained object
//! generation (planner, decider), plain text generation (summarizer), and
//! token streaming (answer synthesizer). Every backend implements this trait;
//! tests use scripted doubles.

use crate::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A schema-constrained generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRequest {
    /// The model to use (e.g., "moonshotai/kimi-k2")
    pub model: String,

    /// System instructions
    pub system: String,

    /// The user-visible prompt
    pub prompt: String,

    /// JSON Schema the output must conform to
    pub schema: serde_json::Value,

    /// Optional tracing/telemetry correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// A plain or streaming text generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

/// The core language-model trait.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name for this backend (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Generate a JSON value conforming to the request's schema.
    ///
    /// Implementations must return `ModelError::MalformedOutput` when the
    /// model's output is not valid JSON; schema-level violations surface when
    /// the caller deserializes the value into its typed form.
    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> std::result::Result<serde_json::Value, ModelError>;

    /// Generate a complete text response.
    async fn generate_text(&self, request: TextRequest)
        -> std::result::Result<String, ModelError>;

    /// Generate a stream of token chunks.
    ///
    /// Default implementation calls `generate_text()` and wraps the result
    /// as a single chunk followed by a terminator.
    async fn stream_text(
        &self,
        request: TextRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<TokenChunk, ModelError>>,
        ModelError,
    > {
        let text = self.generate_text(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let _ = tx
            .send(Ok(TokenChunk {
                content: Some(text),
                done: false,
            }))
            .await;
        let _ = tx
            .send(Ok(TokenChunk {
                content: None,
                done: true,
            }))
            .await;
        Ok(rx)
    }
}
