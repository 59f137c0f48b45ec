//! Staged query orchestration.
//!
//! Drives a single request through the pipeline: summarize → refetch
//! decision → HyDE → retrieve → rerank → rewrite loop → RE2 → answer →
//! provenance. The non-streaming and streaming variants share every stage;
//! the streaming variant additionally pushes typed events onto a channel
//! and stops as soon as the consumer goes away.
//!
//! Within a request everything is strictly sequential; blocking work
//! (store scans, local inference) is pushed onto the blocking thread pool.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;

use super::event::{ChatOutcome, PipelineEvent};
use super::{Engine, render};
use crate::config::ProvenanceMethod;
use crate::core::RetrievedDocument;
use crate::error::{Result, StorageError};
use crate::llm::{ChatMessage, Role, assistant_message};
use crate::provenance;
use crate::rerank::rerank_documents;
use crate::store::VectorStore;

/// Inputs of one chat interaction.
#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    /// The user's question.
    pub prompt: String,
    /// Prior conversation turns.
    pub history: Vec<ChatMessage>,
    /// Documents from a previous turn, echoed back when no retrieval
    /// happens this turn.
    pub docs: Vec<RetrievedDocument>,
    /// Dataset filter; empty means all datasets.
    pub datasets: Vec<String>,
}

/// The per-request pipeline over an engine snapshot and the store.
#[derive(Debug, Clone)]
pub struct Pipeline {
    engine: Arc<Engine>,
    store: VectorStore,
}

/// Matches yes/no LLM answers: a lowercase-trimmed `no` prefix means no,
/// anything else means yes.
fn is_no(reply: &str) -> bool {
    reply.trim().to_lowercase().starts_with("no")
}

/// Formats documents into the context block injected into the system
/// instruction.
#[must_use]
pub fn format_documents(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|doc| {
            let metadata_string = doc
                .metadata
                .iter()
                .map(|(key, value)| {
                    let shown = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!("{key}: {shown}")
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "[Document] *Filename* `{filename}`\n*Content*: {content}\n*Metadata* {metadata_string} [/Document]",
                filename = doc.source().unwrap_or_default(),
                content = doc.content,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn join_err(e: tokio::task::JoinError) -> crate::Error {
    StorageError::Database(format!("blocking task failed: {e}")).into()
}

impl Pipeline {
    /// Creates a pipeline over an engine snapshot and the shared store.
    #[must_use]
    pub const fn new(engine: Arc<Engine>, store: VectorStore) -> Self {
        Self { engine, store }
    }

    // ==================== Stage helpers ====================

    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.engine.embedder);
        tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(join_err)?
    }

    async fn retrieve(
        &self,
        query: String,
        query_vec: Vec<f32>,
        datasets: Vec<String>,
    ) -> Result<Vec<RetrievedDocument>> {
        let store = self.store.clone();
        let k = self.engine.settings.vector_store_k();
        tokio::task::spawn_blocking(move || store.get_relevant(&query, &query_vec, &datasets, k))
            .await
            .map_err(join_err)?
    }

    async fn rerank(
        &self,
        query: String,
        docs: Vec<RetrievedDocument>,
    ) -> Result<Vec<RetrievedDocument>> {
        let reranker = self
            .engine
            .reranker
            .clone()
            .ok_or_else(|| StorageError::Rerank("reranker not initialized".to_string()))?;
        let k = self.engine.settings.rerank_k();
        tokio::task::spawn_blocking(move || {
            let mut ranked = rerank_documents(reranker.as_ref(), &query, docs)?;
            ranked.truncate(k);
            Ok(ranked)
        })
        .await
        .map_err(join_err)?
    }

    /// Retrieval plus optional reranking. Without reranking, each
    /// document's score becomes its dense distance.
    async fn handle_documents(
        &self,
        query: &str,
        query_vec: &[f32],
        datasets: &[String],
    ) -> Result<Vec<RetrievedDocument>> {
        let docs = self
            .retrieve(query.to_string(), query_vec.to_vec(), datasets.to_vec())
            .await?;

        if self.engine.settings.rerank() {
            tracing::info!(candidates = docs.len(), "reranking documents");
            self.rerank(query.to_string(), docs).await
        } else {
            Ok(docs
                .into_iter()
                .map(|mut doc| {
                    doc.score = doc.distance();
                    doc
                })
                .collect())
        }
    }

    /// Collapses an oversized history to `[system?, assistant(summary)]`.
    async fn maybe_summarize(&self, history: Vec<ChatMessage>) -> Result<(Vec<ChatMessage>, bool)> {
        let settings = &self.engine.settings;
        let history_string = history
            .iter()
            .map(|m| format!("{}: {}", role_label(m.role), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let size = self.engine.count_tokens(&history_string);
        if size <= settings.summarization_threshold() {
            return Ok((history, false));
        }

        tracing::info!(tokens = size, "summarizing conversation history");
        let query = render(settings.summarization_query(), &[("history", &history_string)]);
        let (summary, _) = self.engine.gateway.respond(None, &query, &[]).await?;

        let mut collapsed: Vec<ChatMessage> = history
            .into_iter()
            .take(1)
            .filter(|m| m.role == Role::System)
            .collect();
        collapsed.push(assistant_message(&summary));
        Ok((collapsed, true))
    }

    async fn attribute(
        &self,
        question: &str,
        answer: &str,
        docs: &[RetrievedDocument],
    ) -> Result<Vec<f64>> {
        match self.engine.settings.provenance_method() {
            ProvenanceMethod::Rerank => {
                let reranker = self
                    .engine
                    .reranker
                    .clone()
                    .ok_or_else(|| StorageError::Rerank("reranker not initialized".to_string()))?;
                let answer = answer.to_string();
                let docs = docs.to_vec();
                tokio::task::spawn_blocking(move || {
                    provenance::compute_rerank_provenance(reranker.as_ref(), &answer, &docs)
                })
                .await
                .map_err(join_err)?
            }
            ProvenanceMethod::Llm => {
                provenance::compute_llm_provenance(&self.engine.gateway, question, answer, docs)
                    .await
            }
            ProvenanceMethod::Similarity => {
                let embedder = Arc::clone(&self.engine.embedder);
                let answer = answer.to_string();
                let docs = docs.to_vec();
                tokio::task::spawn_blocking(move || {
                    provenance::compute_similarity_provenance(embedder.as_ref(), &answer, &docs)
                })
                .await
                .map_err(join_err)?
            }
            ProvenanceMethod::None => Ok(Vec::new()),
        }
    }

    /// Runs the pre-answer stages shared by both variants: summarization,
    /// refetch decision, HyDE, retrieval, rewrite loop, RE2.
    ///
    /// Returns `(prompt, history, documents, rewritten, fetched_new)`.
    #[allow(clippy::type_complexity, clippy::too_many_lines)]
    async fn prepare(
        &self,
        params: &ChatParams,
        emit: &mut (dyn FnMut(PipelineEvent) -> bool + Send),
    ) -> Result<Option<(String, Vec<ChatMessage>, Option<Vec<RetrievedDocument>>, Option<String>, bool)>>
    {
        let settings = &self.engine.settings;
        let question = params.prompt.clone();
        let mut prompt = params.prompt.clone();
        let mut history = params.history.clone();
        let mut rewritten = None;
        let mut fetched_new = true;

        if !history.is_empty() {
            if settings.use_summarization() {
                if !emit(PipelineEvent::Step(
                    "Checking if history needs summarization...".to_string(),
                )) {
                    return Ok(None);
                }
                let (collapsed, fired) = self.maybe_summarize(history).await?;
                history = collapsed;
                if fired
                    && !emit(PipelineEvent::Step(
                        "Summarizing conversation history...".to_string(),
                    ))
                {
                    return Ok(None);
                }
            }

            if !emit(PipelineEvent::Step(
                "Checking if new documents are needed...".to_string(),
            )) {
                return Ok(None);
            }
            tracing::info!("history present, checking whether new documents are needed");
            let query = render(settings.rag_fetch_new_question(), &[("question", &question)]);
            let (reply, _) = self.engine.gateway.respond(None, &query, &history).await?;
            if is_no(&reply) {
                fetched_new = false;
                if !emit(PipelineEvent::Step(
                    "Using existing context (no new retrieval needed).".to_string(),
                )) {
                    return Ok(None);
                }
            }
        }

        let mut documents = None;
        if fetched_new {
            if settings.use_hyde() {
                if !emit(PipelineEvent::Step(
                    "Generating hypothetical document (HyDE)...".to_string(),
                )) {
                    return Ok(None);
                }
                let query = render(settings.hyde_query(), &[("question", &prompt)]);
                let (reply, _) = self.engine.gateway.respond(None, &query, &[]).await?;
                prompt = reply;
            }

            if !emit(PipelineEvent::Step(
                "Retrieving relevant documents...".to_string(),
            )) {
                return Ok(None);
            }
            tracing::info!("fetching new documents");
            let prompt_embedding = self.embed(prompt.clone()).await?;
            let mut docs = self
                .handle_documents(&prompt, &prompt_embedding, &params.datasets)
                .await?;

            if settings.use_rewrite_loop() && !settings.use_hyde() {
                if !emit(PipelineEvent::Step(
                    "Checking if documents contain the answer...".to_string(),
                )) {
                    return Ok(None);
                }
                let instruction = render(
                    settings.rewrite_query_instruction(),
                    &[("context", &format_documents(&docs))],
                );
                let query = render(settings.rewrite_query_question(), &[("question", &prompt)]);
                let (coverage, _) = self
                    .engine
                    .gateway
                    .respond(Some(&instruction), &query, &[])
                    .await?;

                if is_no(&coverage) {
                    if !emit(PipelineEvent::Step(
                        "Rewriting query for better results...".to_string(),
                    )) {
                        return Ok(None);
                    }
                    let motivation =
                        format!("Can I find the answer in the documents: {coverage}");
                    let rewrite_query = render(
                        settings.rewrite_query_prompt(),
                        &[("question", &prompt), ("motivation", &motivation)],
                    );
                    let (new_prompt, _) =
                        self.engine.gateway.respond(None, &rewrite_query, &[]).await?;
                    tracing::info!(original = %prompt, rewritten = %new_prompt, "query rewritten");

                    if !emit(PipelineEvent::Step(
                        "Re-retrieving documents with improved query...".to_string(),
                    )) {
                        return Ok(None);
                    }
                    // The original prompt's embedding is reused unless
                    // rewrite_reembed is set
                    let query_vec = if settings.rewrite_reembed() {
                        self.embed(new_prompt.clone()).await?
                    } else {
                        prompt_embedding
                    };
                    docs = self
                        .handle_documents(&new_prompt, &query_vec, &params.datasets)
                        .await?;
                    rewritten = Some(new_prompt);
                } else if !emit(PipelineEvent::Step(
                    "Documents look relevant, proceeding...".to_string(),
                )) {
                    return Ok(None);
                }
            }
            documents = Some(docs);
        }

        if settings.use_re2() && !settings.use_hyde() {
            if !emit(PipelineEvent::Step(
                "Applying re-reading prompt enhancement...".to_string(),
            )) {
                return Ok(None);
            }
            prompt = format!("{prompt}\n{re2}\n{prompt}", re2 = settings.re2_prompt());
        }

        Ok(Some((prompt, history, documents, rewritten, fetched_new)))
    }

    /// Builds the answer call inputs for the three history/fetch cases.
    fn answer_inputs(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        documents: Option<&[RetrievedDocument]>,
        fetched_new: bool,
    ) -> (Option<String>, String, Vec<ChatMessage>) {
        let settings = &self.engine.settings;
        let context = format_documents(documents.unwrap_or_default());

        if history.is_empty() {
            (
                Some(render(settings.rag_instruction(), &[("context", &context)])),
                render(settings.rag_question_initial(), &[("question", prompt)]),
                Vec::new(),
            )
        } else if fetched_new {
            // Fresh context replaces any previous system turn
            let stripped: Vec<ChatMessage> = history
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned()
                .collect();
            (
                Some(render(settings.rag_instruction(), &[("context", &context)])),
                render(settings.rag_question_followup(), &[("question", prompt)]),
                stripped,
            )
        } else {
            (
                None,
                render(settings.rag_question_followup(), &[("question", prompt)]),
                history.to_vec(),
            )
        }
    }

    // ==================== Entry points ====================

    /// Runs the full pipeline and returns the final outcome.
    ///
    /// # Errors
    ///
    /// Returns an error on retrieval or LLM failure; no internal retries.
    pub async fn run(&self, params: ChatParams) -> Result<ChatOutcome> {
        let mut sink = |_event: PipelineEvent| true;
        let Some((prompt, history, mut documents, rewritten, fetched_new)) =
            self.prepare(&params, &mut sink).await?
        else {
            unreachable!("sink never cancels");
        };

        let (system, user, thread_history) =
            self.answer_inputs(&prompt, &history, documents.as_deref(), fetched_new);
        let (reply, thread) = self
            .engine
            .gateway
            .respond(system.as_deref(), &user, &thread_history)
            .await?;

        self.merge_provenance(&prompt, &reply, fetched_new, documents.as_mut())
            .await?;

        Ok(Self::finish(
            params, reply, thread, documents, rewritten, fetched_new,
        ))
    }

    /// Runs the full pipeline, pushing events onto `tx`.
    ///
    /// A failed send means the consumer is gone: the pipeline stops and
    /// the upstream LLM stream is dropped. Errors terminate the stream
    /// with an `error` event instead of `done`.
    pub async fn run_stream(&self, params: ChatParams, tx: UnboundedSender<PipelineEvent>) {
        if let Err(e) = self.drive_stream(params, &tx).await {
            tracing::error!(error = %e, "streaming pipeline failed");
            let _ = tx.send(PipelineEvent::Error(e.to_string()));
        }
    }

    async fn drive_stream(
        &self,
        params: ChatParams,
        tx: &UnboundedSender<PipelineEvent>,
    ) -> Result<()> {
        let mut emit = |event: PipelineEvent| tx.send(event).is_ok();
        let Some((prompt, history, mut documents, rewritten, fetched_new)) =
            self.prepare(&params, &mut emit).await?
        else {
            return Ok(());
        };

        // Documents reach the client before any token
        if let Some(docs) = documents.as_ref()
            && !docs.is_empty()
            && tx.send(PipelineEvent::Documents(docs.clone())).is_err()
        {
            return Ok(());
        }

        if tx
            .send(PipelineEvent::Step("Generating answer...".to_string()))
            .is_err()
        {
            return Ok(());
        }

        let (system, user, thread_history) =
            self.answer_inputs(&prompt, &history, documents.as_deref(), fetched_new);
        let (mut stream, thread) = self
            .engine
            .gateway
            .respond_stream(system.as_deref(), &user, &thread_history)
            .await?;

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            reply.push_str(&chunk);
            if tx.send(PipelineEvent::Token(chunk)).is_err() {
                return Ok(());
            }
        }
        drop(stream);

        if fetched_new
            && documents.as_ref().is_some_and(|docs| !docs.is_empty())
            && self.engine.settings.provenance_method().is_enabled()
        {
            let method = self.engine.settings.provenance_method();
            if tx
                .send(PipelineEvent::Step(format!(
                    "Computing provenance scores ({})...",
                    method.as_str()
                )))
                .is_err()
            {
                return Ok(());
            }
        }
        self.merge_provenance(&prompt, &reply, fetched_new, documents.as_mut())
            .await?;

        let outcome = Self::finish(params, reply, thread, documents, rewritten, fetched_new);
        let _ = tx.send(PipelineEvent::Done(Box::new(outcome)));
        Ok(())
    }

    /// Attaches attribution scores in place when the stage is active.
    async fn merge_provenance(
        &self,
        prompt: &str,
        reply: &str,
        fetched_new: bool,
        documents: Option<&mut Vec<RetrievedDocument>>,
    ) -> Result<()> {
        let method = self.engine.settings.provenance_method();
        let Some(docs) = documents else {
            return Ok(());
        };
        if !fetched_new || docs.is_empty() || !method.is_enabled() {
            return Ok(());
        }

        tracing::info!(method = method.as_str(), documents = docs.len(), "computing provenance");
        let scores = self.attribute(prompt, reply, docs).await?;
        for (doc, score) in docs.iter_mut().zip(scores) {
            doc.provenance = Some(score);
        }
        Ok(())
    }

    /// Appends the assistant turn and assembles the outcome, echoing the
    /// request's documents when no retrieval happened.
    fn finish(
        params: ChatParams,
        reply: String,
        mut thread: Vec<ChatMessage>,
        documents: Option<Vec<RetrievedDocument>>,
        rewritten: Option<String>,
        fetched_new: bool,
    ) -> ChatOutcome {
        thread.push(assistant_message(&reply));
        ChatOutcome {
            reply,
            history: thread,
            documents: documents.unwrap_or(params.docs),
            rewritten,
            question: params.prompt,
            fetched_new_documents: fetched_new,
        }
    }
}
