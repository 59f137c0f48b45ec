//! Concrete chat backends.
//!
//! One implementation per provider, each mapping the neutral message model
//! to its native form. `OpenAI` and Azure ride the `async-openai` SDK; the
//! rest speak their wire protocols directly over `reqwest`.

mod anthropic;
mod azure;
mod gemini;
mod ollama;
mod openai;
mod sse;

pub use anthropic::AnthropicClient;
pub use azure::AzureOpenAiClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
