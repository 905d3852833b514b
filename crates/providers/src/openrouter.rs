//! OpenRouter-compatible language-model adapter.
//!
//! Works with OpenRouter, OpenAI, and any endpoint exposing an
//! OpenAI-compatible `/chat/completions` route. Supports:
//! - Schema-constrained object generation via `response_format`
//! - Plain text completions
//! - Token streaming via SSE

use async_trait::async_trait;
use deepfin_core::error::ModelError;
use deepfin_core::model::{LanguageModel, ObjectRequest, TextRequest, TokenChunk};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// An OpenAI-compatible model backend.
pub struct OpenRouterModel {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterModel {
    /// Create a new OpenRouter provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "openrouter".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_builder(&self, body: &serde_json::Value, trace_id: Option<&str>) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(trace_id) = trace_id {
            builder = builder.header("x-trace-id", trace_id);
        }
        builder
    }

    fn messages_body(system: &str, prompt: &str) -> serde_json::Value {
        serde_json::json!([
            { "role": "system", "content": system },
            { "role": "user", "content": prompt },
        ])
    }

    async fn complete(
        &self,
        body: serde_json::Value,
        trace_id: Option<&str>,
    ) -> Result<String, ModelError> {
        let response = self
            .request_builder(&body, trace_id)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ModelError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model provider returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ModelError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl LanguageModel for OpenRouterModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_object(
        &self,
        request: ObjectRequest,
    ) -> Result<serde_json::Value, ModelError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": Self::messages_body(&request.system, &request.prompt),
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "response",
                    "strict": true,
                    "schema": request.schema,
                },
            },
            "stream": false,
        });

        debug!(provider = %self.name, model = %request.model, "Sending object request");

        let content = self.complete(body, request.trace_id.as_deref()).await?;
        serde_json::from_str(&content)
            .map_err(|e| ModelError::MalformedOutput(format!("{e}: {content}")))
    }

    async fn generate_text(&self, request: TextRequest) -> Result<String, ModelError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": Self::messages_body(&request.system, &request.prompt),
            "stream": false,
        });

        debug!(provider = %self.name, model = %request.model, "Sending text request");

        self.complete(body, request.trace_id.as_deref()).await
    }

    async fn stream_text(
        &self,
        request: TextRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<TokenChunk, ModelError>>,
        ModelError,
    > {
        let body = serde_json::json!({
            "model": request.model,
            "messages": Self::messages_body(&request.system, &request.prompt),
            "stream": true,
        });

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .request_builder(&body, request.trace_id.as_deref())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(ModelError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model provider streaming error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ModelError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx
                            .send(Ok(TokenChunk {
                                content: None,
                                done: true,
                            }))
                            .await;
                        return;
                    }

                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable SSE line");
                            continue;
                        }
                    };

                    if let Some(content) = event["choices"][0]["delta"]["content"].as_str() {
                        if !content.is_empty() {
                            let chunk = TokenChunk {
                                content: Some(content.to_string()),
                                done: false,
                            };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE] — still terminate the receiver.
            let _ = tx
                .send(Ok(TokenChunk {
                    content: None,
                    done: true,
                }))
                .await;
        });

        Ok(rx)
    }
}

// --- API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}
