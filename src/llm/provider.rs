//! Pluggable chat backend trait and factory.
//!
//! Implementations translate the provider-agnostic message list into
//! provider-specific SDK or wire calls. This keeps all pipeline logic
//! decoupled from any particular LLM vendor. Backend selection happens
//! once at engine construction from the `use_*` option flags.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;

use super::message::ChatMessage;
use crate::config::Settings;
use crate::error::{ConfigError, LlmError, Result};

/// A lazily-driven, single-use stream of assistant text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = std::result::Result<String, LlmError>> + Send>>;

/// Trait for chat backends.
///
/// Implementations handle the transport layer for a specific provider
/// while presenting a uniform interface to the gateway. No retries happen
/// at this layer.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Backend name (e.g., `"openai"`, `"anthropic"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion over the full message list.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on API failures, timeouts, or parse errors.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<String, LlmError>;

    /// Executes a streaming chat completion.
    ///
    /// Returns a stream of text fragments whose concatenation equals what
    /// [`ChatClient::chat`] would have returned for the same input.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on connection or streaming failures.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<TokenStream, LlmError>;
}

/// Creates a [`ChatClient`] from the configured backend flags.
///
/// The first enabled flag wins, in order: `use_openai`, `use_gemini`,
/// `use_azure`, `use_anthropic`, `use_ollama`.
///
/// # Errors
///
/// Returns [`ConfigError::NoBackend`] when no flag is set, or a
/// credential/option error from the selected backend's constructor.
pub fn create_client(settings: &Settings) -> Result<Arc<dyn ChatClient>> {
    use super::providers::{
        AnthropicClient, AzureOpenAiClient, GeminiClient, OllamaClient, OpenAiClient,
    };

    if settings.flag("use_openai") {
        tracing::info!("initializing OpenAI backend");
        return Ok(Arc::new(OpenAiClient::new(settings)?));
    }
    if settings.flag("use_gemini") {
        tracing::info!("initializing Gemini backend");
        return Ok(Arc::new(GeminiClient::new(settings)?));
    }
    if settings.flag("use_azure") {
        tracing::info!("initializing Azure OpenAI backend");
        return Ok(Arc::new(AzureOpenAiClient::new(settings)?));
    }
    if settings.flag("use_anthropic") {
        tracing::info!("initializing Anthropic backend");
        return Ok(Arc::new(AnthropicClient::new(settings)?));
    }
    if settings.flag("use_ollama") {
        tracing::info!("initializing Ollama backend");
        return Ok(Arc::new(OllamaClient::new(settings)));
    }

    Err(ConfigError::NoBackend.into())
}
