//! LLM gateway and chat backends.
//!
//! The [`gateway::LlmGateway`] presents two operations (`respond`,
//! `respond_stream`) over a [`provider::ChatClient`] capability selected
//! once at engine construction. Backends translate the neutral
//! {system, user, assistant} message model into their native forms.

pub mod gateway;
pub mod message;
pub mod provider;
pub mod providers;

pub use gateway::LlmGateway;
pub use message::{ChatMessage, Role, assistant_message, system_message, user_message};
pub use provider::{ChatClient, TokenStream, create_client};
