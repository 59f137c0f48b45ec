//! Anthropic backend implementation over the Messages API.
//!
//! Anthropic takes the system instruction as a separate request field, so
//! the leading system turn is lifted out of the message list. Replies are
//! always flattened to a single string of concatenated text blocks.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::sse::{LineMode, payload_lines};
use crate::config::Settings;
use crate::error::{LlmError, Result};
use crate::llm::message::{ChatMessage, Role};
use crate::llm::provider::{ChatClient, TokenStream};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4_096;

/// Anthropic Messages API chat backend.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl AnthropicClient {
    /// Creates a new backend from the configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the API key or model name is missing.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.credential("ANTHROPIC_API_KEY")?;
        let model = settings.required("anthropic_model_name")?.to_string();
        let max_tokens = settings
            .get("anthropic_max_tokens")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            max_tokens,
        })
    }

    /// Builds the request body, lifting the leading system turn into the
    /// dedicated `system` field.
    fn build_body(&self, messages: &[ChatMessage], temperature: f32, stream: bool) -> serde_json::Value {
        let system = messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone());

        let thread: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": [{"type": "text", "text": m.content}],
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": temperature,
            "messages": thread,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiRequest {
                message: detail,
                status: Some(status.as_u16()),
            });
        }
        Ok(response)
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatClient for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<String, LlmError> {
        let body = self.build_body(messages, temperature, false);
        let response = self.send(&body).await?;

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            LlmError::UnexpectedResponse {
                message: e.to_string(),
            }
        })?;

        // Flatten content blocks to one string of concatenated text parts
        Ok(parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect())
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<TokenStream, LlmError> {
        let body = self.build_body(messages, temperature, true);
        let response = self.send(&body).await?;

        let tokens = payload_lines(response, LineMode::SseData).filter_map(|payload| async move {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            let event: StreamEvent = match serde_json::from_str(&payload) {
                Ok(e) => e,
                // Unknown event shapes are skipped, not fatal
                Err(_) => return None,
            };
            match event.kind.as_str() {
                "content_block_delta" => event
                    .delta
                    .and_then(|d| d.text)
                    .filter(|t| !t.is_empty())
                    .map(Ok),
                "error" => Some(Err(LlmError::Stream {
                    message: event
                        .error
                        .map_or_else(|| "unknown stream error".to_string(), |e| e.message),
                })),
                _ => None,
            }
        });

        Ok(Box::pin(tokens))
    }
}
