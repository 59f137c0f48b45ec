//! Request handlers for the HTTP surface.
//!
//! Named request/response records everywhere; the only free-form payload
//! is the config map. Errors map to JSON `{ "error": ... }` bodies with the
//! status code of their kind; in a streaming response an `error` event
//! replaces `done` instead.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::AppState;
use crate::config::EnvFile;
use crate::core::RetrievedDocument;
use crate::error::{Error, IngestError, StorageError};
use crate::llm::ChatMessage;
use crate::pipeline::{ChatParams, Pipeline, PipelineEvent, render};

/// Error wrapper mapping domain errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::BadRequest { .. } | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::Llm(_) => StatusCode::BAD_GATEWAY,
            Error::Storage(_) | Error::Chunking(_) | Error::Ingest(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn bad_request(message: &str) -> ApiError {
    ApiError(Error::BadRequest {
        message: message.to_string(),
    })
}

fn not_found(resource: &str) -> ApiError {
    ApiError(Error::NotFound {
        resource: resource.to_string(),
    })
}

fn join_err(e: tokio::task::JoinError) -> ApiError {
    ApiError(StorageError::Database(format!("blocking task failed: {e}")).into())
}

// ==================== Title ====================

/// Request body of `POST /create_title`.
#[derive(Debug, Deserialize)]
pub struct CreateTitleRequest {
    /// The question to summarize into a title.
    pub question: Option<String>,
}

/// Response body of `POST /create_title`.
#[derive(Debug, Serialize)]
pub struct CreateTitleResponse {
    /// The generated chat title.
    pub title: String,
}

const TITLE_PROMPT: &str = "Write a succinct title (a few words) for a chat that starts with the \
     question below. Respond with the title only, in the language of the question.\n\nQuestion: {question}";

/// Generates a short title for a conversation.
pub async fn create_title(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTitleRequest>,
) -> ApiResult<Json<CreateTitleResponse>> {
    let question = request.question.ok_or_else(|| bad_request("missing question"))?;
    let engine = state.engine();

    let prompt = render(TITLE_PROMPT, &[("question", &question)]);
    let (title, _) = engine.gateway.respond(None, &prompt, &[]).await?;
    tracing::info!(%question, %title, "generated chat title");

    Ok(Json(CreateTitleResponse { title }))
}

// ==================== Chat ====================

/// Request body of `POST /chat` and `POST /chat_stream`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's question.
    pub prompt: Option<String>,
    /// Prior conversation turns.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Documents from a previous turn, echoed back when no retrieval
    /// happens.
    #[serde(default)]
    pub docs: Vec<RetrievedDocument>,
    /// Dataset filter; empty means all datasets.
    #[serde(default)]
    pub datasets: Vec<String>,
}

impl ChatRequest {
    fn into_params(self) -> ApiResult<ChatParams> {
        let prompt = self.prompt.ok_or_else(|| bad_request("missing prompt"))?;
        Ok(ChatParams {
            prompt,
            history: self.history,
            docs: self.docs,
            datasets: self.datasets,
        })
    }
}

/// Runs the full pipeline and returns the outcome in one response.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    let params = request.into_params()?;
    let pipeline = Pipeline::new(state.engine(), state.store.clone());
    let outcome = pipeline.run(params).await?;
    Ok(Json(outcome).into_response())
}

/// Runs the pipeline, streaming typed events as SSE.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Response> {
    let params = request.into_params()?;
    let pipeline = Pipeline::new(state.engine(), state.store.clone());

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        pipeline.run_stream(params, tx).await;
    });

    let events = UnboundedReceiverStream::new(rx)
        .map(|event| Ok::<Event, Infallible>(to_sse_event(&event)));

    let sse = Sse::new(events);
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response())
}

fn to_sse_event(event: &PipelineEvent) -> Event {
    Event::default()
        .event(event.kind())
        .data(event.payload().to_string())
}

// ==================== Documents ====================

/// Lists the distinct source paths across the store.
pub async fn get_documents(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<String>>> {
    let store = state.store.clone();
    let names = tokio::task::spawn_blocking(move || store.get_all_document_names())
        .await
        .map_err(join_err)??;
    Ok(Json(names))
}

/// Lists the distinct dataset names across the store.
pub async fn get_datasets(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<String>>> {
    let store = state.store.clone();
    let datasets = tokio::task::spawn_blocking(move || store.get_datasets())
        .await
        .map_err(join_err)??;
    Ok(Json(datasets))
}

/// Request body of `POST /get_document` and `POST /delete`.
#[derive(Debug, Deserialize)]
pub struct FileRequest {
    /// Path of the file relative to the data directory.
    pub filename: Option<String>,
}

/// Response body of `POST /delete`.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Number of chunks removed from the store.
    pub count: usize,
}

/// Resolves `filename` inside the data directory, rejecting traversal
/// and missing files.
fn resolve_in_data_dir(data_dir: &Path, filename: &str) -> ApiResult<PathBuf> {
    let candidate = data_dir.join(filename);
    let canonical_dir = data_dir
        .canonicalize()
        .map_err(|_| not_found(filename))?;
    let canonical = candidate
        .canonicalize()
        .map_err(|_| not_found(filename))?;
    if !canonical.starts_with(&canonical_dir) {
        return Err(ApiError(
            IngestError::PathTraversal {
                path: filename.to_string(),
            }
            .into(),
        ));
    }
    Ok(candidate)
}

/// Downloads a document from the data directory.
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FileRequest>,
) -> ApiResult<Response> {
    let filename = request.filename.ok_or_else(|| bad_request("missing filename"))?;
    let data_dir = state.engine().settings.data_directory();
    let path = resolve_in_data_dir(&data_dir, &filename)?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| not_found(&filename))?;

    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Deletes a document from the filesystem and the store.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FileRequest>,
) -> ApiResult<Json<DeleteResponse>> {
    let filename = request.filename.ok_or_else(|| bad_request("missing filename"))?;
    let data_dir = state.engine().settings.data_directory();
    let path = resolve_in_data_dir(&data_dir, &filename)?;

    tokio::fs::remove_file(&path)
        .await
        .map_err(|_| not_found(&filename))?;

    let store = state.store.clone();
    let source = path.display().to_string();
    let count = tokio::task::spawn_blocking(move || store.delete(&[source]))
        .await
        .map_err(join_err)??;

    tracing::info!(%filename, count, "deleted document");
    Ok(Json(DeleteResponse { count }))
}

/// Response body of `POST /add_document`.
#[derive(Debug, Serialize)]
pub struct AddDocumentResponse {
    /// Path the uploaded file was saved to.
    pub file: String,
    /// Dataset it was ingested under.
    pub dataset: String,
}

/// Accepts a multipart upload (`file`, `dataset`), saves it under the
/// data directory, and ingests it.
pub async fn add_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<AddDocumentResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut dataset: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&e.to_string()))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("file") => {
                let name = field
                    .file_name()
                    .map(ToString::to_string)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| bad_request("no file selected"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&e.to_string()))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("dataset") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(&e.to_string()))?;
                dataset = Some(value);
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| bad_request("no file part in the request"))?;
    let dataset = dataset
        .filter(|d| !d.is_empty())
        .ok_or_else(|| bad_request("no dataset in the request"))?;
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(bad_request("invalid filename"));
    }

    let data_dir = state.engine().settings.data_directory();
    let dataset_dir = data_dir.join(&dataset);
    tokio::fs::create_dir_all(&dataset_dir)
        .await
        .map_err(|e| {
            ApiError(
                IngestError::WriteFailed {
                    path: dataset_dir.display().to_string(),
                    reason: e.to_string(),
                }
                .into(),
            )
        })?;

    let path = dataset_dir.join(&filename);
    tokio::fs::write(&path, &bytes).await.map_err(|e| {
        ApiError(
            IngestError::WriteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into(),
        )
    })?;

    let ingestor = state.ingestor();
    let ingest_path = path.clone();
    let ingest_dataset = dataset.clone();
    tokio::task::spawn_blocking(move || ingestor.add_document(&ingest_path, &ingest_dataset))
        .await
        .map_err(join_err)??;

    Ok(Json(AddDocumentResponse {
        file: path.display().to_string(),
        dataset,
    }))
}

// ==================== Configuration ====================

/// Request body of `PUT /config`.
#[derive(Debug, Deserialize)]
pub struct ConfigUpdateRequest {
    /// Options to write.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    /// Whether to reload heavy components for the new snapshot.
    #[serde(default)]
    pub reinitialize: bool,
}

/// Response body of `PUT /config`.
#[derive(Debug, Serialize)]
pub struct ConfigUpdateResponse {
    /// Always `"ok"` on success.
    pub status: String,
    /// Keys that were written.
    pub updated: Vec<String>,
}

/// Returns all options from the config file.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<BTreeMap<String, String>>> {
    let env = EnvFile::load(&state.env_path)?;
    Ok(Json(env.values()))
}

/// Writes options to the config file (preserving order and comments) and
/// swaps in a fresh engine snapshot.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfigUpdateRequest>,
) -> ApiResult<Json<ConfigUpdateResponse>> {
    if request.config.is_empty() {
        return Err(bad_request("no config values provided"));
    }

    let mut env = EnvFile::load(&state.env_path)?;
    let updated = env.update(&request.config);
    env.save()?;

    let settings = crate::config::Settings::from_map(env.values());
    let reinitialize = request.reinitialize;
    let engine = if reinitialize {
        // Heavy component reload off the async runtime
        let state = Arc::clone(&state);
        tokio::task::spawn_blocking(move || state.rebuild_engine(settings, true))
            .await
            .map_err(join_err)??
    } else {
        state.rebuild_engine(settings, false)?
    };
    state.replace_engine(engine);
    tracing::info!(keys = updated.len(), reinitialize, "configuration updated");

    Ok(Json(ConfigUpdateResponse {
        status: "ok".to_string(),
        updated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::RecursiveCharacterSplitter;
    use crate::embedding::{DEFAULT_DIMENSIONS, FallbackEmbedder};
    use crate::llm::provider::{ChatClient, TokenStream};
    use crate::llm::{LlmGateway, Role};
    use crate::pipeline::Engine;
    use crate::store::VectorStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Canned(&'static str);

    #[async_trait]
    impl ChatClient for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
        ) -> std::result::Result<String, crate::error::LlmError> {
            Ok(self.0.to_string())
        }
        async fn chat_stream(
            &self,
            _messages: &[ChatMessage],
            _temperature: f32,
        ) -> std::result::Result<TokenStream, crate::error::LlmError> {
            let text = self.0.to_string();
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(text)])))
        }
    }

    fn state_with(reply: &'static str, options: &[(&str, &str)]) -> (Arc<AppState>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::open(dir.path().join("test.db"), 2).unwrap();
        store.setup(DEFAULT_DIMENSIONS).unwrap();

        let mut map: BTreeMap<String, String> = options
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        map.entry("data_directory".to_string())
            .or_insert_with(|| dir.path().join("data").display().to_string());
        let settings = crate::config::Settings::from_map(map);

        let engine = Engine::new(
            settings,
            LlmGateway::with_client(Arc::new(Canned(reply)), 0.0),
            Arc::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)),
            Arc::new(RecursiveCharacterSplitter::new(1024, 0).unwrap()),
            None,
        )
        .unwrap();

        let env_path = dir.path().join(".env");
        (
            Arc::new(AppState::new(store, Arc::new(engine), env_path)),
            dir,
        )
    }

    #[tokio::test]
    async fn test_create_title() {
        let (state, _dir) = state_with("A Good Title", &[]);
        let response = create_title(
            State(state),
            Json(CreateTitleRequest {
                question: Some("What is X?".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.title, "A Good Title");
    }

    #[tokio::test]
    async fn test_create_title_missing_question() {
        let (state, _dir) = state_with("x", &[]);
        let result = create_title(State(state), Json(CreateTitleRequest { question: None })).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_chat_missing_prompt_is_bad_request() {
        let (state, _dir) = state_with("x", &[]);
        let request = ChatRequest {
            prompt: None,
            history: Vec::new(),
            docs: Vec::new(),
            datasets: Vec::new(),
        };
        let result = chat(State(state), Json(request)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_documents_empty_store() {
        let (state, _dir) = state_with("x", &[]);
        let response = get_documents(State(state)).await.unwrap();
        assert!(response.0.is_empty());
    }

    #[tokio::test]
    async fn test_get_document_missing_is_not_found() {
        let (state, dir) = state_with("x", &[]);
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let result = get_document(
            State(state),
            Json(FileRequest {
                filename: Some("absent.txt".to_string()),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_document_rejects_traversal() {
        let (state, dir) = state_with("x", &[]);
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "secret").unwrap();
        let result = get_document(
            State(state),
            Json(FileRequest {
                filename: Some("../secret.txt".to_string()),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_config_roundtrip_preserves_comments() {
        let (state, _dir) = state_with("x", &[]);
        std::fs::write(
            &state.env_path,
            "# pipeline options\ntemperature=0.0\nuse_ollama=True\n",
        )
        .unwrap();

        let mut config = BTreeMap::new();
        config.insert("temperature".to_string(), "0.5".to_string());
        let response = update_config(
            State(Arc::clone(&state)),
            Json(ConfigUpdateRequest {
                config,
                reinitialize: false,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.status, "ok");
        assert_eq!(response.0.updated, vec!["temperature"]);

        let content = std::fs::read_to_string(&state.env_path).unwrap();
        assert!(content.starts_with("# pipeline options\n"));
        assert!(content.contains("temperature=0.5"));
        // Untouched options remain
        assert!(content.contains("use_ollama=True"));

        // The new snapshot carries the new temperature
        let engine = state.engine();
        assert!((engine.settings.temperature() - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_update_config_empty_is_bad_request() {
        let (state, _dir) = state_with("x", &[]);
        let result = update_config(
            State(state),
            Json(ConfigUpdateRequest {
                config: BTreeMap::new(),
                reinitialize: false,
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_chat_outcome_shape() {
        let (state, _dir) = state_with("the reply", &[]);
        let request = ChatRequest {
            prompt: Some("question?".to_string()),
            history: Vec::new(),
            docs: Vec::new(),
            datasets: Vec::new(),
        };
        // Direct pipeline run mirrors what the handler serializes
        let params = request.into_params().unwrap();
        let pipeline = Pipeline::new(state.engine(), state.store.clone());
        let outcome = pipeline.run(params).await.unwrap();
        assert_eq!(outcome.reply, "the reply");
        assert_eq!(outcome.question, "question?");
        assert!(outcome.fetched_new_documents);
        assert_eq!(outcome.history.last().unwrap().role, Role::Assistant);
    }
}
