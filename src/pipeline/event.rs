//! Typed pipeline events for the streaming protocol.
//!
//! The orchestrator pushes these onto an in-process channel; the HTTP
//! layer drains them onto the wire as server-sent events. Ordering
//! guarantees: all `step` events for stages up to retrieval precede
//! `documents`; `documents` precedes the first `token`; `done` (or
//! `error`) is the final event and the concatenation of `token` payloads
//! equals `done.reply`.

use serde::Serialize;
use serde_json::json;

use crate::core::RetrievedDocument;
use crate::llm::ChatMessage;

/// Final payload of a chat interaction.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    /// Full assistant reply.
    pub reply: String,
    /// Conversation history including the new assistant turn.
    pub history: Vec<ChatMessage>,
    /// Documents backing the reply: freshly retrieved ones (with
    /// provenance merged when computed), or the request's documents
    /// echoed back when no retrieval happened.
    pub documents: Vec<RetrievedDocument>,
    /// Rewritten query, when the rewrite loop fired.
    pub rewritten: Option<String>,
    /// The original question as asked.
    pub question: String,
    /// Whether this request fetched new documents.
    pub fetched_new_documents: bool,
}

/// One event on a request's stream.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Human-readable stage label.
    Step(String),
    /// The retrieval result, sent once before the first token when new
    /// documents were fetched.
    Documents(Vec<RetrievedDocument>),
    /// A fragment of assistant text.
    Token(String),
    /// Terminal success payload.
    Done(Box<ChatOutcome>),
    /// Terminal failure payload, sent instead of `done`.
    Error(String),
}

impl PipelineEvent {
    /// SSE event name for this event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Step(_) => "step",
            Self::Documents(_) => "documents",
            Self::Token(_) => "token",
            Self::Done(_) => "done",
            Self::Error(_) => "error",
        }
    }

    /// JSON payload carried on the `data:` line.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::Step(step) => json!({ "step": step }),
            Self::Documents(documents) => json!({ "documents": documents }),
            Self::Token(token) => json!({ "token": token }),
            Self::Done(outcome) => serde_json::to_value(outcome)
                .unwrap_or_else(|e| json!({ "error": e.to_string() })),
            Self::Error(message) => json!({ "error": message }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(PipelineEvent::Step("x".to_string()).kind(), "step");
        assert_eq!(PipelineEvent::Documents(Vec::new()).kind(), "documents");
        assert_eq!(PipelineEvent::Token("t".to_string()).kind(), "token");
        assert_eq!(PipelineEvent::Error("e".to_string()).kind(), "error");
    }

    #[test]
    fn test_step_payload() {
        let event = PipelineEvent::Step("Retrieving relevant documents...".to_string());
        assert_eq!(
            event.payload(),
            serde_json::json!({"step": "Retrieving relevant documents..."})
        );
    }

    #[test]
    fn test_done_payload_shape() {
        let outcome = ChatOutcome {
            reply: "answer".to_string(),
            history: vec![],
            documents: vec![],
            rewritten: None,
            question: "q".to_string(),
            fetched_new_documents: true,
        };
        let event = PipelineEvent::Done(Box::new(outcome));
        assert_eq!(event.kind(), "done");
        let payload = event.payload();
        assert_eq!(payload["reply"], "answer");
        assert_eq!(payload["fetched_new_documents"], true);
        assert!(payload["rewritten"].is_null());
    }
}
