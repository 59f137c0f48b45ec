//! Core domain types for ragserve.

pub mod document;

pub use document::{DocumentChunk, RetrievedDocument, content_id};
