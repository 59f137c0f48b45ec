//! `OpenAI` backend implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, local proxies) via the
//! optional base URL override.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest,
};
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::Settings;
use crate::error::{LlmError, Result};
use crate::llm::message::{ChatMessage, Role};
use crate::llm::provider::{ChatClient, TokenStream};

/// `OpenAI`-compatible chat backend.
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    /// Creates a new backend from the configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the API key or model name is missing.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.credential("OPENAI_API_KEY")?;
        let model = settings.required("openai_model_name")?.to_string();

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = settings.get("openai_base_url") {
            config = config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(config),
            model,
        })
    }
}

/// Converts the neutral message model to the `OpenAI` SDK type.
pub(super) fn convert_messages(messages: &[ChatMessage]) -> Vec<ChatCompletionRequestMessage> {
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    msg.content.clone(),
                ),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(
                        async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        ),
                    ),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        })
        .collect()
}

/// Builds a chat completion request for the given model.
pub(super) fn build_request(
    model: &str,
    messages: &[ChatMessage],
    temperature: f32,
    stream: bool,
) -> CreateChatCompletionRequest {
    CreateChatCompletionRequest {
        model: model.to_string(),
        messages: convert_messages(messages),
        temperature: Some(temperature),
        stream: if stream { Some(true) } else { None },
        ..Default::default()
    }
}

/// Runs a non-streaming completion against an `OpenAI`-compatible client.
pub(super) async fn chat_openai<C: async_openai::config::Config + Send + Sync>(
    client: &Client<C>,
    request: CreateChatCompletionRequest,
) -> std::result::Result<String, LlmError> {
    let response = client
        .chat()
        .create(request)
        .await
        .map_err(|e| LlmError::ApiRequest {
            message: e.to_string(),
            status: None,
        })?;

    Ok(response
        .choices
        .first()
        .and_then(|c| c.message.content.as_ref())
        .cloned()
        .unwrap_or_default())
}

/// Runs a streaming completion against an `OpenAI`-compatible client.
pub(super) async fn chat_stream_openai<C: async_openai::config::Config + Send + Sync>(
    client: &Client<C>,
    request: CreateChatCompletionRequest,
) -> std::result::Result<TokenStream, LlmError> {
    let stream = client
        .chat()
        .create_stream(request)
        .await
        .map_err(|e| LlmError::ApiRequest {
            message: e.to_string(),
            status: None,
        })?;

    let mapped = stream.filter_map(|result| async move {
        match result {
            Ok(response) => {
                let text = response
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_ref())
                    .cloned()
                    .unwrap_or_default();
                if text.is_empty() { None } else { Some(Ok(text)) }
            }
            Err(e) => Some(Err(LlmError::Stream {
                message: e.to_string(),
            })),
        }
    });

    Ok(Box::pin(mapped))
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<String, LlmError> {
        let request = build_request(&self.model, messages, temperature, false);
        chat_openai(&self.client, request).await
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<TokenStream, LlmError> {
        let request = build_request(&self.model, messages, temperature, true);
        chat_stream_openai(&self.client, request).await
    }
}
