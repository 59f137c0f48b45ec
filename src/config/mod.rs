//! Configuration snapshot for the service.
//!
//! Options live in a line-oriented `KEY=VALUE` file (see [`EnvFile`]) and are
//! materialized into an immutable [`Settings`] snapshot at engine
//! construction. A snapshot is never re-read mid-request; a config reload
//! builds a fresh snapshot that only affects requests started afterwards.
//!
//! Resolution order for credentials: config file → process environment.
//! Numeric and boolean options fall back to compiled-in defaults when unset
//! or unparseable, mirroring the lenient environment handling used elsewhere
//! in this codebase.

mod envfile;

pub use envfile::EnvFile;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Default top-k for hybrid retrieval.
const DEFAULT_VECTOR_STORE_K: usize = 10;
/// Default top-k kept after reranking.
const DEFAULT_RERANK_K: usize = 5;
/// Default token threshold before history summarization kicks in.
const DEFAULT_SUMMARIZATION_THRESHOLD: usize = 3_000;
/// Default connection pool size for the store.
const DEFAULT_DB_POOL_SIZE: u32 = 10;
/// Default chunk size for the recursive splitter.
const DEFAULT_RECURSIVE_CHUNK_SIZE: usize = 1_024;
/// Default overlap for the recursive splitter.
const DEFAULT_RECURSIVE_OVERLAP: usize = 256;
/// Default breakpoint percentile for the semantic splitter.
const DEFAULT_SEMANTIC_PERCENTILE: f64 = 95.0;
/// Default maximum chunk size for the paragraph splitter.
const DEFAULT_PARAGRAPH_MAX_SIZE: usize = 2_048;

/// Default prompt templates. Placeholders use `{name}` substitution.
mod defaults {
    pub const RAG_INSTRUCTION: &str = "You are an assistant that answers questions using only the \
         provided context. If the context does not contain the answer, say so.\n\nContext:\n{context}";
    pub const RAG_QUESTION_INITIAL: &str = "{question}";
    pub const RAG_QUESTION_FOLLOWUP: &str = "{question}";
    pub const RAG_FETCH_NEW_QUESTION: &str = "Given the conversation so far, do you need to fetch new \
         documents to answer the question below? Answer only yes or no.\n\nQuestion: {question}";
    pub const HYDE_QUERY: &str = "Write a short passage that could plausibly answer the question \
         below. Respond with the passage only.\n\nQuestion: {question}";
    pub const REWRITE_QUERY_INSTRUCTION: &str = "You judge whether a set of retrieved documents can \
         answer a question. The documents:\n\n{context}";
    pub const REWRITE_QUERY_QUESTION: &str = "Do the documents above contain the answer to this \
         question? Answer only yes or no, and if no, state briefly what is missing.\n\nQuestion: {question}";
    pub const REWRITE_QUERY_PROMPT: &str = "Rewrite the question below so that a document search is \
         more likely to find the answer. Respond with the rewritten question only.\n\nQuestion: \
         {question}\nMotivation: {motivation}";
    pub const RE2_PROMPT: &str = "Read the question again:";
    pub const SUMMARIZATION_QUERY: &str = "Summarize the conversation below, keeping every fact \
         needed to continue it.\n\n{history}";
}

/// Per-document attribution strategy for generated answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvenanceMethod {
    /// Attribution disabled.
    #[default]
    None,
    /// Score (answer, document) pairs with the cross-encoder reranker.
    Rerank,
    /// Ask the LLM for a 0-1 contribution score per document.
    Llm,
    /// Cosine attribution of the answer against each document embedding.
    Similarity,
}

impl ProvenanceMethod {
    /// Parses an option value; unknown values disable attribution.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("rerank") => Self::Rerank,
            Some("llm") => Self::Llm,
            Some("similarity") => Self::Similarity,
            _ => Self::None,
        }
    }

    /// Whether attribution is enabled at all.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }

    /// The option value naming this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rerank => "rerank",
            Self::Llm => "llm",
            Self::Similarity => "similarity",
        }
    }
}

/// Immutable configuration snapshot.
///
/// Cheap to clone around request tasks via `Arc`; all accessors are
/// read-only lookups over the underlying option map.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Builds a snapshot from an option map.
    #[must_use]
    pub const fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Loads a snapshot from a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Ok(Self::from_map(EnvFile::load(path)?.values()))
    }

    /// Returns the raw option map.
    #[must_use]
    pub const fn raw(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Looks up a single option.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Looks up an option with a default.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Interprets an option as a boolean flag (`True`/`true`).
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Returns a required option, erroring when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingOption`] when the key is not set.
    pub fn required(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            ConfigError::MissingOption {
                key: key.to_string(),
            }
            .into()
        })
    }

    /// Returns a credential, falling back to the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when neither source has it.
    pub fn credential(&self, key: &str) -> Result<String> {
        if let Some(value) = self.get(key) {
            return Ok(value.to_string());
        }
        std::env::var(key).map_err(|_| {
            ConfigError::MissingCredential {
                key: key.to_string(),
            }
            .into()
        })
    }

    fn usize_or(&self, key: &str, default: usize) -> usize {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    // ==================== Service ====================

    /// Logging level for the tracing subscriber.
    #[must_use]
    pub fn logging_level(&self) -> &str {
        self.get_or("logging_level", "INFO")
    }

    /// Root directory holding ingestable documents.
    #[must_use]
    pub fn data_directory(&self) -> PathBuf {
        PathBuf::from(self.get_or("data_directory", "data"))
    }

    /// Allow-listed file extensions for ingestion.
    #[must_use]
    pub fn file_types(&self) -> Vec<String> {
        self.get_or("file_types", "txt,md,xml,json,csv")
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Selector expression applied to JSON documents before chunking.
    #[must_use]
    pub fn json_schema(&self) -> &str {
        self.get_or("json_schema", ".")
    }

    /// Field separator for tabular files.
    #[must_use]
    pub fn csv_separator(&self) -> u8 {
        self.get("csv_separator")
            .and_then(|s| s.bytes().next())
            .unwrap_or(b',')
    }

    // ==================== Store ====================

    /// Path of the vector store database file.
    #[must_use]
    pub fn vector_store_path(&self) -> PathBuf {
        PathBuf::from(self.get_or("vector_store_path", "ragserve.db"))
    }

    /// Top-k for hybrid retrieval.
    #[must_use]
    pub fn vector_store_k(&self) -> usize {
        self.usize_or("vector_store_k", DEFAULT_VECTOR_STORE_K)
    }

    /// Bounded connection pool size.
    #[must_use]
    pub fn db_pool_size(&self) -> u32 {
        self.get("db_pool_size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DB_POOL_SIZE)
    }

    // ==================== Embeddings & reranking ====================

    /// Embedding model name.
    #[must_use]
    pub fn embedding_model(&self) -> &str {
        self.get_or("embedding_model", "all-MiniLM-L6-v2")
    }

    /// Whether to force CPU inference for the embedding model.
    /// Defaults to CPU when unset.
    #[must_use]
    pub fn embedding_cpu(&self) -> bool {
        self.get("embedding_cpu")
            .is_none_or(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Whether candidate reranking is enabled.
    #[must_use]
    pub fn rerank(&self) -> bool {
        self.flag("rerank")
    }

    /// Top-k kept after reranking.
    #[must_use]
    pub fn rerank_k(&self) -> usize {
        self.usize_or("rerank_k", DEFAULT_RERANK_K)
    }

    // ==================== Splitter ====================

    /// Configured splitter strategy name.
    #[must_use]
    pub fn splitter(&self) -> &str {
        self.get_or("splitter", "RecursiveCharacterTextSplitter")
    }

    /// Chunk size for the recursive splitter.
    #[must_use]
    pub fn recursive_splitter_chunk_size(&self) -> usize {
        self.usize_or("recursive_splitter_chunk_size", DEFAULT_RECURSIVE_CHUNK_SIZE)
    }

    /// Overlap for the recursive splitter.
    #[must_use]
    pub fn recursive_splitter_chunk_overlap(&self) -> usize {
        self.usize_or("recursive_splitter_chunk_overlap", DEFAULT_RECURSIVE_OVERLAP)
    }

    /// Breakpoint percentile for the semantic splitter.
    #[must_use]
    pub fn semantic_chunker_breakpoint_percentile(&self) -> f64 {
        self.f64_or("semantic_chunker_breakpoint_percentile", DEFAULT_SEMANTIC_PERCENTILE)
    }

    /// Maximum chunk size for the paragraph splitter.
    #[must_use]
    pub fn paragraph_chunker_max_chunk_size(&self) -> usize {
        self.usize_or("paragraph_chunker_max_chunk_size", DEFAULT_PARAGRAPH_MAX_SIZE)
    }

    /// Paragraph separator for the paragraph splitter.
    #[must_use]
    pub fn paragraph_chunker_paragraph_separator(&self) -> &str {
        self.get_or("paragraph_chunker_paragraph_separator", "\n\n")
    }

    // ==================== Pipeline features ====================

    /// Sampling temperature applied uniformly to all backends.
    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.get("temperature")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0)
    }

    /// Hypothetical-document expansion toggle.
    #[must_use]
    pub fn use_hyde(&self) -> bool {
        self.flag("use_hyde")
    }

    /// One-shot query rewrite loop toggle.
    #[must_use]
    pub fn use_rewrite_loop(&self) -> bool {
        self.flag("use_rewrite_loop")
    }

    /// Whether the rewrite retrieval re-embeds the rewritten query
    /// instead of reusing the original prompt's embedding.
    #[must_use]
    pub fn rewrite_reembed(&self) -> bool {
        self.flag("rewrite_reembed")
    }

    /// Re-reading prompt enhancement toggle.
    #[must_use]
    pub fn use_re2(&self) -> bool {
        self.flag("use_re2")
    }

    /// History summarization toggle.
    #[must_use]
    pub fn use_summarization(&self) -> bool {
        self.flag("use_summarization")
    }

    /// Token threshold above which history is summarized.
    #[must_use]
    pub fn summarization_threshold(&self) -> usize {
        self.usize_or("summarization_threshold", DEFAULT_SUMMARIZATION_THRESHOLD)
    }

    /// Tokenizer model used to count history tokens.
    #[must_use]
    pub fn summarization_encoder(&self) -> &str {
        self.get_or("summarization_encoder", "gpt-4")
    }

    /// Configured provenance method.
    #[must_use]
    pub fn provenance_method(&self) -> ProvenanceMethod {
        ProvenanceMethod::parse(self.get("provenance_method"))
    }

    // ==================== Prompt templates ====================

    /// System instruction carrying the retrieval context.
    #[must_use]
    pub fn rag_instruction(&self) -> &str {
        self.get_or("rag_instruction", defaults::RAG_INSTRUCTION)
    }

    /// User prompt template for the first turn of a conversation.
    #[must_use]
    pub fn rag_question_initial(&self) -> &str {
        self.get_or("rag_question_initial", defaults::RAG_QUESTION_INITIAL)
    }

    /// User prompt template for follow-up turns.
    #[must_use]
    pub fn rag_question_followup(&self) -> &str {
        self.get_or("rag_question_followup", defaults::RAG_QUESTION_FOLLOWUP)
    }

    /// Yes/no question deciding whether to refetch documents.
    #[must_use]
    pub fn rag_fetch_new_question(&self) -> &str {
        self.get_or("rag_fetch_new_question", defaults::RAG_FETCH_NEW_QUESTION)
    }

    /// HyDE generation prompt.
    #[must_use]
    pub fn hyde_query(&self) -> &str {
        self.get_or("hyde_query", defaults::HYDE_QUERY)
    }

    /// System instruction for the rewrite-loop coverage check.
    #[must_use]
    pub fn rewrite_query_instruction(&self) -> &str {
        self.get_or("rewrite_query_instruction", defaults::REWRITE_QUERY_INSTRUCTION)
    }

    /// User question for the rewrite-loop coverage check.
    #[must_use]
    pub fn rewrite_query_question(&self) -> &str {
        self.get_or("rewrite_query_question", defaults::REWRITE_QUERY_QUESTION)
    }

    /// Prompt asking the LLM to rewrite the query.
    #[must_use]
    pub fn rewrite_query_prompt(&self) -> &str {
        self.get_or("rewrite_query_prompt", defaults::REWRITE_QUERY_PROMPT)
    }

    /// Suffix inserted between the two copies of the question under RE2.
    #[must_use]
    pub fn re2_prompt(&self) -> &str {
        self.get_or("re2_prompt", defaults::RE2_PROMPT)
    }

    /// History summarization prompt.
    #[must_use]
    pub fn summarization_query(&self) -> &str {
        self.get_or("summarization_query", defaults::SUMMARIZATION_QUERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        Settings::from_map(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_flag_parsing() {
        let s = settings(&[
            ("use_hyde", "True"),
            ("use_re2", "true"),
            ("use_summarization", "False"),
            ("rerank", "nope"),
        ]);
        assert!(s.use_hyde());
        assert!(s.use_re2());
        assert!(!s.use_summarization());
        assert!(!s.rerank());
        assert!(!s.use_rewrite_loop());
    }

    #[test]
    fn test_numeric_defaults_and_lenient_parse() {
        let s = settings(&[("rerank_k", "7"), ("vector_store_k", "not-a-number")]);
        assert_eq!(s.rerank_k(), 7);
        assert_eq!(s.vector_store_k(), DEFAULT_VECTOR_STORE_K);
        assert_eq!(s.summarization_threshold(), DEFAULT_SUMMARIZATION_THRESHOLD);
    }

    #[test]
    fn test_temperature() {
        let s = settings(&[("temperature", "0.5")]);
        assert!((s.temperature() - 0.5).abs() < f32::EPSILON);
        assert!(settings(&[]).temperature().abs() < f32::EPSILON);
    }

    #[test]
    fn test_file_types() {
        let s = settings(&[("file_types", "txt, MD,json,")]);
        assert_eq!(s.file_types(), vec!["txt", "md", "json"]);
    }

    #[test_case::test_case(Some("rerank"), ProvenanceMethod::Rerank; "rerank")]
    #[test_case::test_case(Some("llm"), ProvenanceMethod::Llm; "llm")]
    #[test_case::test_case(Some("similarity"), ProvenanceMethod::Similarity; "similarity")]
    #[test_case::test_case(Some("none"), ProvenanceMethod::None; "none")]
    #[test_case::test_case(Some("unknown"), ProvenanceMethod::None; "unknown falls back")]
    #[test_case::test_case(None, ProvenanceMethod::None; "unset")]
    fn test_provenance_method(value: Option<&str>, expected: ProvenanceMethod) {
        assert_eq!(ProvenanceMethod::parse(value), expected);
    }

    #[test]
    fn test_provenance_method_enabled() {
        assert!(ProvenanceMethod::Rerank.is_enabled());
        assert!(!ProvenanceMethod::None.is_enabled());
    }

    #[test]
    fn test_required_and_credential() {
        let s = settings(&[("openai_model_name", "gpt-4o-mini")]);
        assert!(s.required("openai_model_name").is_ok());
        assert!(s.required("missing_key").is_err());
        assert!(s.credential("RAGSERVE_TEST_ABSENT_CREDENTIAL").is_err());
    }

    #[test]
    fn test_prompt_defaults_have_placeholders() {
        let s = settings(&[]);
        assert!(s.rag_instruction().contains("{context}"));
        assert!(s.rag_fetch_new_question().contains("{question}"));
        assert!(s.rewrite_query_prompt().contains("{motivation}"));
        assert!(s.summarization_query().contains("{history}"));
    }

    #[test]
    fn test_csv_separator() {
        assert_eq!(settings(&[("csv_separator", ";")]).csv_separator(), b';');
        assert_eq!(settings(&[]).csv_separator(), b',');
    }
}
