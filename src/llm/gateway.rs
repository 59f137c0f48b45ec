//! Unified chat gateway over the selected backend.
//!
//! The gateway owns message-list construction: it places or replaces the
//! system turn according to the history invariant (at most one system
//! message, always at index 0), appends the user prompt, and hands the
//! thread to the backend. Callers receive the effective thread back so they
//! can append the assistant reply themselves.

use std::sync::Arc;

use super::message::{ChatMessage, Role, system_message, user_message};
use super::provider::{ChatClient, TokenStream, create_client};
use crate::config::Settings;
use crate::error::{LlmError, Result};

/// Gateway over a single configured chat backend.
///
/// Temperature is a single value applied uniformly to every call. No
/// retries happen at this layer.
#[derive(Clone)]
pub struct LlmGateway {
    client: Arc<dyn ChatClient>,
    temperature: f32,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("backend", &self.client.name())
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl LlmGateway {
    /// Creates a gateway for the backend selected in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no backend is selected or its
    /// credentials are missing.
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings)?,
            temperature: settings.temperature(),
        })
    }

    /// Creates a gateway over an explicit client. Used by tests and
    /// anywhere a scripted backend stands in for a real provider.
    #[must_use]
    pub fn with_client(client: Arc<dyn ChatClient>, temperature: f32) -> Self {
        Self {
            client,
            temperature,
        }
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.client.name()
    }

    /// Builds the message list for a call.
    ///
    /// When a system prompt is given: an existing index-0 system turn is
    /// overwritten for this call only, otherwise one is inserted at index
    /// 0. The user prompt is appended last.
    fn build_thread(
        system_prompt: Option<&str>,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let mut thread = history.to_vec();
        if let Some(system) = system_prompt {
            if thread.first().is_some_and(|m| m.role == Role::System) {
                thread[0].content = system.to_string();
            } else {
                thread.insert(0, system_message(system));
            }
        }
        thread.push(user_message(prompt));
        thread
    }

    /// Generates a full reply.
    ///
    /// Returns the assistant text together with the effective thread sent
    /// (without the assistant reply appended).
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on backend failure.
    pub async fn respond(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        history: &[ChatMessage],
    ) -> std::result::Result<(String, Vec<ChatMessage>), LlmError> {
        let thread = Self::build_thread(system_prompt, prompt, history);
        tracing::debug!(backend = self.client.name(), turns = thread.len(), "llm call");
        let reply = self.client.chat(&thread, self.temperature).await?;
        tracing::debug!(reply_len = reply.len(), "llm reply");
        Ok((reply, thread))
    }

    /// Generates a streaming reply.
    ///
    /// Returns a single-use stream of text fragments whose concatenation
    /// equals what [`LlmGateway::respond`] would have returned, together
    /// with the effective thread sent.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on backend failure.
    pub async fn respond_stream(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        history: &[ChatMessage],
    ) -> std::result::Result<(TokenStream, Vec<ChatMessage>), LlmError> {
        let thread = Self::build_thread(system_prompt, prompt, history);
        tracing::debug!(
            backend = self.client.name(),
            turns = thread.len(),
            "llm streaming call"
        );
        let stream = self.client.chat_stream(&thread, self.temperature).await?;
        Ok((stream, thread))
    }

    /// Strips a fenced code-block wrapper from a reply when and only when
    /// both fences sit on their own lines.
    #[must_use]
    pub fn clean_reply(reply: &str) -> String {
        let lines: Vec<&str> = reply.lines().collect();
        if lines.len() >= 2
            && lines[0].trim_start().starts_with("```")
            && lines[lines.len() - 1].trim() == "```"
        {
            return lines[1..lines.len() - 1].join("\n");
        }
        reply.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::assistant_message;
    use async_trait::async_trait;

    /// Echo backend used to inspect the thread the gateway builds.
    struct EchoClient;

    #[async_trait]
    impl ChatClient for EchoClient {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _temperature: f32,
        ) -> std::result::Result<String, LlmError> {
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }

        async fn chat_stream(
            &self,
            messages: &[ChatMessage],
            _temperature: f32,
        ) -> std::result::Result<TokenStream, LlmError> {
            let text = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(text)])))
        }
    }

    fn gateway() -> LlmGateway {
        LlmGateway::with_client(Arc::new(EchoClient), 0.0)
    }

    #[test]
    fn test_thread_inserts_system_at_front() {
        let history = vec![user_message("earlier"), assistant_message("reply")];
        let thread = LlmGateway::build_thread(Some("sys"), "now", &history);
        assert_eq!(thread.len(), 4);
        assert_eq!(thread[0].role, Role::System);
        assert_eq!(thread[0].content, "sys");
        assert_eq!(thread[3].content, "now");
    }

    #[test]
    fn test_thread_overwrites_existing_system() {
        let history = vec![system_message("old"), user_message("earlier")];
        let thread = LlmGateway::build_thread(Some("new"), "now", &history);
        assert_eq!(thread.len(), 3);
        assert_eq!(thread[0].content, "new");
        // Only ever one system turn, at index 0
        let system_count = thread.iter().filter(|m| m.role == Role::System).count();
        assert_eq!(system_count, 1);
    }

    #[test]
    fn test_thread_without_system() {
        let thread = LlmGateway::build_thread(None, "hello", &[]);
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_respond_returns_thread_without_reply() {
        let (reply, thread) = gateway().respond(None, "question", &[]).await.unwrap();
        assert_eq!(reply, "question");
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_respond_stream_concatenates_to_reply() {
        use futures_util::StreamExt;
        let (mut stream, thread) = gateway()
            .respond_stream(Some("sys"), "question", &[])
            .await
            .unwrap();
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap());
        }
        assert_eq!(collected, "question");
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_clean_reply_strips_fences() {
        let reply = "```json\n{\"a\": 1}\n```";
        assert_eq!(LlmGateway::clean_reply(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_clean_reply_requires_both_fences() {
        assert_eq!(LlmGateway::clean_reply("```\nunclosed"), "```\nunclosed");
        assert_eq!(LlmGateway::clean_reply("plain text"), "plain text");
    }

    #[test]
    fn test_clean_reply_inline_fences_untouched() {
        let reply = "uses ```code``` inline";
        assert_eq!(LlmGateway::clean_reply(reply), reply);
    }
}
