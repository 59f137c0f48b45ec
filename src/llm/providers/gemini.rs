//! Gemini backend implementation over the `generateContent` API.
//!
//! Gemini models the conversation as user/model contents with a separate
//! system instruction, so the leading system turn is lifted out of the
//! message list and assistant turns map to the `model` role.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::sse::{LineMode, payload_lines};
use crate::config::Settings;
use crate::error::{LlmError, Result};
use crate::llm::message::{ChatMessage, Role};
use crate::llm::provider::{ChatClient, TokenStream};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini chat backend.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    /// Creates a new backend from the configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the API key or model name is missing.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.credential("GOOGLE_API_KEY")?;
        let model = settings.required("gemini_model_name")?.to_string();

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        })
    }

    /// Builds the request body, remodeling history as user/model contents.
    fn build_body(messages: &[ChatMessage], temperature: f32) -> serde_json::Value {
        let system = messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.clone());

        let contents: Vec<serde_json::Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    },
                    "parts": [{"text": m.content}],
                })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {"temperature": temperature},
        });
        if let Some(system) = system {
            body["system_instruction"] = json!({"parts": [{"text": system}]});
        }
        body
    }

    async fn send(
        &self,
        method: &str,
        query: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, LlmError> {
        let url = format!(
            "{API_BASE}/{model}:{method}?key={key}{query}",
            model = self.model,
            key = self.api_key,
        );
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

fn extract_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default()
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<String, LlmError> {
        let body = Self::build_body(messages, temperature);
        let response = self.send("generateContent", "", &body).await?;

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            LlmError::UnexpectedResponse {
                message: e.to_string(),
            }
        })?;
        Ok(extract_text(&parsed))
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<TokenStream, LlmError> {
        let body = Self::build_body(messages, temperature);
        let response = self
            .send("streamGenerateContent", "&alt=sse", &body)
            .await?;

        let tokens = payload_lines(response, LineMode::SseData).filter_map(|payload| async move {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => return Some(Err(e)),
            };
            let chunk: GenerateResponse = match serde_json::from_str(&payload) {
                Ok(c) => c,
                Err(_) => return None,
            };
            let text = extract_text(&chunk);
            if text.is_empty() { None } else { Some(Ok(text)) }
        });

        Ok(Box::pin(tokens))
    }
}
