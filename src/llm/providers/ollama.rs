//! Ollama backend implementation over the local `/api/chat` endpoint.
//!
//! Ollama accepts the neutral role names directly and streams
//! newline-delimited JSON objects rather than SSE frames.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::sse::{LineMode, payload_lines};
use crate::config::Settings;
use crate::error::LlmError;
use crate::llm::message::{ChatMessage, Role};
use crate::llm::provider::{ChatClient, TokenStream};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama chat backend.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    /// Creates a new backend from the configuration snapshot.
    ///
    /// Ollama needs no credential; the model name defaults to `llama3`.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings
                .get_or("ollama_base_url", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: settings.get_or("ollama_model_name", "llama3").to_string(),
        }
    }

    fn build_body(&self, messages: &[ChatMessage], temperature: f32, stream: bool) -> serde_json::Value {
        let thread: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": thread,
            "stream": stream,
            "options": {"temperature": temperature},
        })
    }

    async fn send(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self.http.post(&url).json(body).send().await?;

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

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<String, LlmError> {
        let body = self.build_body(messages, temperature, false);
        let response = self.send(&body).await?;

        let parsed: ChatChunk = response.json().await.map_err(|e| {
            LlmError::UnexpectedResponse {
                message: e.to_string(),
            }
        })?;
        if let Some(error) = parsed.error {
            return Err(LlmError::ApiRequest {
                message: error,
                status: None,
            });
        }
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<TokenStream, LlmError> {
        let body = self.build_body(messages, temperature, true);
        let response = self.send(&body).await?;

        let tokens = payload_lines(response, LineMode::Json).filter_map(|payload| async move {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            let chunk: ChatChunk = match serde_json::from_str(&payload) {
                Ok(c) => c,
                Err(_) => return None,
            };
            if let Some(error) = chunk.error {
                return Some(Err(LlmError::Stream { message: error }));
            }
            chunk
                .message
                .map(|m| m.content)
                .filter(|c| !c.is_empty())
                .map(Ok)
        });

        Ok(Box::pin(tokens))
    }
}
