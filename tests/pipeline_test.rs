//! Integration tests for ragserve.
//!
//! Exercises the library surface end to end: ingestion into a scratch
//! store, the chat pipeline over a scripted backend, and streaming
//! equivalence. Everything runs with the deterministic fallback embedder
//! and temperature 0.

#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ragserve::chunking::RecursiveCharacterSplitter;
use ragserve::embedding::{DEFAULT_DIMENSIONS, FallbackEmbedder};
use ragserve::llm::provider::TokenStream;
use ragserve::pipeline::{ChatParams, Engine, Pipeline, PipelineEvent};
use ragserve::rerank::FallbackReranker;
use ragserve::{
    ChatClient, ChatMessage, Ingestor, LlmGateway, Role, Settings, VectorStore, content_id,
};
use tempfile::TempDir;

/// Scripted backend that pops one canned reply per call.
struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedClient {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(ToString::to_string).collect()),
        })
    }

    fn pop(&self) -> String {
        self.replies
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| "stub reply".to_string())
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<String, ragserve::error::LlmError> {
        Ok(self.pop())
    }

    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<TokenStream, ragserve::error::LlmError> {
        let reply = self.pop();
        let chunks: Vec<Result<String, ragserve::error::LlmError>> = reply
            .split_inclusive(' ')
            .map(|piece| Ok(piece.to_string()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

fn open_store(dir: &TempDir) -> VectorStore {
    let store = VectorStore::open(dir.path().join("store.db"), 4).expect("open store");
    store.setup(DEFAULT_DIMENSIONS).expect("setup store");
    store
}

fn settings(data_dir: &std::path::Path, extra: &[(&str, &str)]) -> Settings {
    let mut map: std::collections::BTreeMap<String, String> = extra
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    map.insert(
        "data_directory".to_string(),
        data_dir.display().to_string(),
    );
    Settings::from_map(map)
}

fn engine(settings: Settings, client: Arc<ScriptedClient>) -> Arc<Engine> {
    Arc::new(
        Engine::new(
            settings,
            LlmGateway::with_client(client, 0.0),
            Arc::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)),
            Arc::new(RecursiveCharacterSplitter::new(1024, 0).expect("splitter")),
            Some(Arc::new(FallbackReranker::new())),
        )
        .expect("engine"),
    )
}

fn ingestor(engine: &Arc<Engine>, store: &VectorStore) -> Ingestor {
    Ingestor::new(
        &engine.settings,
        store.clone(),
        Arc::clone(&engine.embedder),
        Arc::clone(&engine.splitter),
    )
}

#[test]
fn test_cold_ingest_deduplicates_identical_content() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).expect("mkdir");
    std::fs::write(data.join("a.txt"), "hello world").expect("write a");
    std::fs::write(data.join("b.txt"), "hello world").expect("write b");

    let store = open_store(&dir);
    let engine = engine(settings(&data, &[]), ScriptedClient::new(&[]));
    let written = ingestor(&engine, &store)
        .load_directory()
        .expect("ingest");

    // Two identical files collapse to one chunk row keyed by the content
    // hash of "hello world"
    assert_eq!(written, 1);
    assert_eq!(store.chunk_count().expect("count"), 1);

    let expected_id = content_id("hello world");
    assert_eq!(expected_id, "5eb63bbbe01eeed093cb22bb8f5acdc3");

    let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
    use ragserve::Embedder as _;
    let results = store
        .get_relevant(
            "hello world",
            &embedder.embed("hello world").expect("embed"),
            &[],
            10,
        )
        .expect("retrieve");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, expected_id);
}

#[tokio::test]
async fn test_chat_without_history_returns_grounded_answer() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).expect("mkdir");
    std::fs::write(data.join("x.txt"), "X is a well documented concept").expect("write");

    let store = open_store(&dir);
    let client = ScriptedClient::new(&["X is a concept."]);
    let engine = engine(settings(&data, &[]), client);
    ingestor(&engine, &store).load_directory().expect("ingest");

    let pipeline = Pipeline::new(engine, store);
    let outcome = pipeline
        .run(ChatParams {
            prompt: "What is X?".to_string(),
            ..Default::default()
        })
        .await
        .expect("chat");

    assert_eq!(outcome.reply, "X is a concept.");
    assert!(outcome.fetched_new_documents);
    assert!(outcome.rewritten.is_none());
    assert!(!outcome.documents.is_empty());
    assert_eq!(outcome.history.len(), 3);
    assert_eq!(outcome.history[0].role, Role::System);
    assert_eq!(outcome.history[1].role, Role::User);
    assert_eq!(outcome.history[2].role, Role::Assistant);
}

#[tokio::test]
async fn test_refetch_suppression_echoes_request_documents() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).expect("mkdir");

    let store = open_store(&dir);
    let client = ScriptedClient::new(&["No new documents needed.", "Continuing from context."]);
    let engine = engine(settings(&data, &[]), client);

    let prior = ragserve::RetrievedDocument {
        id: "prior".to_string(),
        content: "previous context".to_string(),
        metadata: serde_json::Map::new(),
        score: Some(0.5),
        provenance: None,
    };

    let pipeline = Pipeline::new(engine, store);
    let outcome = pipeline
        .run(ChatParams {
            prompt: "And after that?".to_string(),
            history: vec![
                ragserve::llm::user_message("First question"),
                ragserve::llm::assistant_message("First answer"),
            ],
            docs: vec![prior.clone()],
            datasets: Vec::new(),
        })
        .await
        .expect("chat");

    assert!(!outcome.fetched_new_documents);
    assert_eq!(outcome.documents, vec![prior]);
    assert_eq!(outcome.reply, "Continuing from context.");
}

#[tokio::test]
async fn test_rewrite_loop_triggers_second_retrieval() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).expect("mkdir");
    std::fs::write(data.join("y.txt"), "only facts about Y live here").expect("write");

    let store = open_store(&dir);
    let client = ScriptedClient::new(&[
        "no, the documents are missing X",
        "facts about X",
        "Here is what I found.",
    ]);
    let engine = engine(settings(&data, &[("use_rewrite_loop", "True")]), client);
    ingestor(&engine, &store).load_directory().expect("ingest");

    let pipeline = Pipeline::new(engine, store);
    let outcome = pipeline
        .run(ChatParams {
            prompt: "What is X?".to_string(),
            ..Default::default()
        })
        .await
        .expect("chat");

    assert_eq!(outcome.rewritten.as_deref(), Some("facts about X"));
    assert_eq!(outcome.reply, "Here is what I found.");
}

#[tokio::test]
async fn test_streaming_parity_with_blocking_chat() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).expect("mkdir");
    std::fs::write(data.join("x.txt"), "X is a well documented concept").expect("write");

    let store = open_store(&dir);
    let reply = "X is a concept with several words.";

    let blocking_engine = engine(settings(&data, &[]), ScriptedClient::new(&[reply]));
    ingestor(&blocking_engine, &store)
        .load_directory()
        .expect("ingest");
    let blocking = Pipeline::new(blocking_engine, store.clone())
        .run(ChatParams {
            prompt: "What is X?".to_string(),
            ..Default::default()
        })
        .await
        .expect("chat");

    let streaming_engine = engine(settings(&data, &[]), ScriptedClient::new(&[reply]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    Pipeline::new(streaming_engine, store)
        .run_stream(
            ChatParams {
                prompt: "What is X?".to_string(),
                ..Default::default()
            },
            tx,
        )
        .await;

    let mut steps = 0;
    let mut documents_index = None;
    let mut first_token_index = None;
    let mut tokens = String::new();
    let mut done = None;
    let mut index = 0;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Step(_) => steps += 1,
            PipelineEvent::Documents(docs) => {
                documents_index = Some(index);
                assert_eq!(docs.len(), blocking.documents.len());
            }
            PipelineEvent::Token(t) => {
                if first_token_index.is_none() {
                    first_token_index = Some(index);
                }
                tokens.push_str(&t);
            }
            PipelineEvent::Done(outcome) => done = Some(outcome),
            PipelineEvent::Error(e) => unreachable!("unexpected error event: {e}"),
        }
        index += 1;
    }

    let done = done.expect("done event");
    assert!(steps >= 1);
    assert!(documents_index.expect("documents event") < first_token_index.expect("token event"));
    assert_eq!(tokens, done.reply);
    assert_eq!(done.reply, blocking.reply);
    assert_eq!(done.fetched_new_documents, blocking.fetched_new_documents);
    assert_eq!(done.history.len(), blocking.history.len());
}

#[test]
fn test_chunk_identity_upsert() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir);
    let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
    use ragserve::Embedder as _;

    let chunk = ragserve::DocumentChunk::new(
        "identical text".to_string(),
        "a.txt",
        "ds",
        embedder.embed("identical text").expect("embed"),
    );
    store.add(std::slice::from_ref(&chunk)).expect("first add");
    store.add(std::slice::from_ref(&chunk)).expect("second add");

    assert_eq!(store.chunk_count().expect("count"), 1);
}

#[tokio::test]
async fn test_delete_by_source_after_ingest() {
    let dir = TempDir::new().expect("tempdir");
    let data = dir.path().join("data");
    let reports = data.join("reports");
    std::fs::create_dir_all(&reports).expect("mkdir");
    std::fs::write(reports.join("q1.txt"), "first quarter numbers").expect("write");
    std::fs::write(reports.join("q2.txt"), "second quarter numbers").expect("write");

    let store = open_store(&dir);
    let engine = engine(settings(&data, &[]), ScriptedClient::new(&[]));
    ingestor(&engine, &store).load_directory().expect("ingest");

    let names = store.get_all_document_names().expect("names");
    assert_eq!(names.len(), 2);

    let q1 = names
        .iter()
        .find(|n| n.ends_with("q1.txt"))
        .expect("q1 ingested")
        .clone();
    let removed = store.delete(&[q1]).expect("delete");
    assert_eq!(removed, 1);

    let names = store.get_all_document_names().expect("names");
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("q2.txt"));
}
