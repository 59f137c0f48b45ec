//! Azure `OpenAI` backend implementation.
//!
//! Reuses the `OpenAI` request construction; the deployment name stands in
//! for the model identifier.

use async_openai::Client;
use async_openai::config::AzureConfig;
use async_trait::async_trait;

use super::openai::{build_request, chat_openai, chat_stream_openai};
use crate::config::Settings;
use crate::error::{LlmError, Result};
use crate::llm::message::ChatMessage;
use crate::llm::provider::{ChatClient, TokenStream};

/// Azure `OpenAI` chat backend.
pub struct AzureOpenAiClient {
    client: Client<AzureConfig>,
    deployment: String,
}

impl AzureOpenAiClient {
    /// Creates a new backend from the configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the API key, endpoint, deployment name, or
    /// API version is missing.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.credential("AZURE_OPENAI_API_KEY")?;
        let endpoint = settings.credential("AZURE_OPENAI_ENDPOINT")?;
        let deployment = settings
            .credential("AZURE_OPENAI_CHAT_DEPLOYMENT_NAME")?;
        let api_version = settings.credential("AZURE_OPENAI_API_VERSION")?;

        let config = AzureConfig::new()
            .with_api_base(endpoint)
            .with_api_key(api_key)
            .with_api_version(api_version)
            .with_deployment_id(deployment.clone());

        Ok(Self {
            client: Client::with_config(config),
            deployment,
        })
    }
}

impl std::fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatClient for AzureOpenAiClient {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<String, LlmError> {
        let request = build_request(&self.deployment, messages, temperature, false);
        chat_openai(&self.client, request).await
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<TokenStream, LlmError> {
        let request = build_request(&self.deployment, messages, temperature, true);
        chat_stream_openai(&self.client, request).await
    }
}
