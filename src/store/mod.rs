//! Hybrid vector store over `SQLite`.
//!
//! Persists document chunks (text, dense embedding, metadata JSON) and
//! answers top-k queries that fuse a brute-force dense similarity scan with
//! FTS5 BM25 lexical search via Reciprocal Rank Fusion. All access goes
//! through a bounded `r2d2` connection pool shared by request handlers.

pub mod rrf;
pub mod schema;

pub use rrf::{RrfConfig, reciprocal_rank_fusion};

use std::collections::HashMap;
use std::path::Path;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value};

use crate::core::{DocumentChunk, RetrievedDocument, document::META_DISTANCE};
use crate::embedding::cosine_similarity;
use crate::error::{Result, StorageError};
use schema::{
    CURRENT_SCHEMA_VERSION, GET_INFO_SQL, INFO_EMBEDDING_DIM, INFO_VERSION, SCHEMA_SQL,
    SET_INFO_SQL,
};

/// A candidate row loaded during the dense scan.
struct Candidate {
    content: String,
    metadata: Map<String, Value>,
    similarity: f32,
}

/// SQLite-backed hybrid retriever.
///
/// Cloning is cheap: clones share the underlying connection pool.
#[derive(Clone)]
pub struct VectorStore {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}

impl VectorStore {
    /// Opens or creates the store at the given path with a bounded pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the pool
    /// cannot be built.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            // WAL for better concurrent access
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        });

        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(StorageError::from)?;

        Ok(Self { pool })
    }

    /// Idempotently provisions the schema for vectors of dimension `dim`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DimensionMismatch`] if the store was
    /// previously provisioned with a different dimension, or a database
    /// error on storage failure.
    pub fn setup(&self, dim: usize) -> Result<()> {
        let conn = self.pool.get().map_err(StorageError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(StorageError::from)?;

        let existing: Option<String> = conn
            .query_row(GET_INFO_SQL, params![INFO_EMBEDDING_DIM], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;

        match existing.and_then(|v| v.parse::<usize>().ok()) {
            Some(stored) if stored != dim => {
                return Err(StorageError::DimensionMismatch {
                    stored,
                    requested: dim,
                }
                .into());
            }
            Some(_) => {}
            None => {
                conn.execute(SET_INFO_SQL, params![INFO_EMBEDDING_DIM, dim.to_string()])
                    .map_err(StorageError::from)?;
            }
        }

        conn.execute(
            SET_INFO_SQL,
            params![INFO_VERSION, CURRENT_SCHEMA_VERSION.to_string()],
        )
        .map_err(StorageError::from)?;

        Ok(())
    }

    /// Returns true iff any chunk exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_data(&self) -> Result<bool> {
        let conn = self.pool.get().map_err(StorageError::from)?;
        let exists: i64 = conn
            .query_row("SELECT EXISTS(SELECT 1 FROM chunks)", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(exists != 0)
    }

    /// Upserts chunks by identifier in a single transaction.
    ///
    /// Rows whose id already exists are no-ops; the batch is all-or-nothing
    /// on storage failure.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert or the commit fails.
    pub fn add(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let mut conn = self.pool.get().map_err(StorageError::from)?;
        let tx = conn.transaction().map_err(StorageError::from)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO chunks (id, content, embedding, metadata)
                     VALUES (?, ?, ?, ?)",
                )
                .map_err(StorageError::from)?;

            for chunk in chunks {
                let bytes: Vec<u8> = chunk
                    .embedding
                    .iter()
                    .flat_map(|f| f.to_le_bytes())
                    .collect();
                let metadata =
                    serde_json::to_string(&chunk.metadata).map_err(StorageError::from)?;

                stmt.execute(params![chunk.id, chunk.content, bytes, metadata])
                    .map_err(StorageError::from)?;
            }
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Returns up to `k` chunks most relevant to the query, fusing dense
    /// similarity and BM25 lexical ranks, filtered by dataset.
    ///
    /// An empty `datasets` slice means all datasets. Each returned document
    /// carries the fused score in `score` and the dense distance in
    /// `metadata.distance`. Returns an empty sequence, not an error, when
    /// nothing matches.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub fn get_relevant(
        &self,
        query_text: &str,
        query_vec: &[f32],
        datasets: &[String],
        k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let conn = self.pool.get().map_err(StorageError::from)?;

        let candidates = Self::load_candidates(&conn, query_vec, datasets)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Dense ranking: similarity descending, id ascending on ties
        let mut dense_ranked: Vec<&String> = candidates.keys().collect();
        dense_ranked.sort_by(|a, b| {
            let sim_a = candidates[*a].similarity;
            let sim_b = candidates[*b].similarity;
            sim_b
                .partial_cmp(&sim_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        let dense_list: Vec<String> = dense_ranked
            .into_iter()
            .take(k * 2)
            .cloned()
            .collect();

        let lexical_list = Self::search_lexical(&conn, query_text, datasets, k * 2)?;

        let fused = reciprocal_rank_fusion(
            &[dense_list.as_slice(), lexical_list.as_slice()],
            &RrfConfig::default(),
        );

        let mut results = Vec::new();
        for (id, fused_score) in fused.into_iter().take(k) {
            if let Some(candidate) = candidates.get(&id) {
                let mut metadata = candidate.metadata.clone();
                metadata.insert(
                    META_DISTANCE.to_string(),
                    Value::from(f64::from(1.0 - candidate.similarity)),
                );
                results.push(RetrievedDocument {
                    id,
                    content: candidate.content.clone(),
                    metadata,
                    score: Some(fused_score),
                    provenance: None,
                });
            }
        }

        Ok(results)
    }

    /// Loads all dataset-filtered rows with their dense similarity.
    fn load_candidates(
        conn: &rusqlite::Connection,
        query_vec: &[f32],
        datasets: &[String],
    ) -> Result<HashMap<String, Candidate>> {
        let mut sql =
            String::from("SELECT id, content, embedding, metadata FROM chunks");
        if !datasets.is_empty() {
            sql.push_str(&format!(
                " WHERE json_extract(metadata, '$.dataset') IN ({})",
                placeholders(datasets.len())
            ));
        }

        let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params_from_iter(datasets.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(StorageError::from)?;

        let mut candidates = HashMap::new();
        for row in rows {
            let (id, content, bytes, metadata_json) = row.map_err(StorageError::from)?;
            let embedding: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let metadata: Map<String, Value> =
                serde_json::from_str(&metadata_json).map_err(StorageError::from)?;
            let similarity = cosine_similarity(query_vec, &embedding);
            candidates.insert(
                id,
                Candidate {
                    content,
                    metadata,
                    similarity,
                },
            );
        }
        Ok(candidates)
    }

    /// BM25 lexical ranking over the FTS5 index, best match first.
    fn search_lexical(
        conn: &rusqlite::Connection,
        query_text: &str,
        datasets: &[String],
        limit: usize,
    ) -> Result<Vec<String>> {
        // Quote each term so FTS5 operators in user text are treated as
        // literals, and OR them for forgiving matching
        let fts_query = query_text
            .split_whitespace()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT c.id FROM chunks_fts
             JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?",
        );
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(fts_query)];
        if !datasets.is_empty() {
            sql.push_str(&format!(
                " AND json_extract(c.metadata, '$.dataset') IN ({})",
                placeholders(datasets.len())
            ));
            values.extend(datasets.iter().map(|d| SqlValue::Text(d.clone())));
        }
        // bm25() is smaller-is-better; id ascending keeps ties deterministic
        sql.push_str(" ORDER BY bm25(chunks_fts) ASC, c.id ASC LIMIT ?");
        values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
        let ids = stmt
            .query_map(params_from_iter(values), |row| row.get::<_, String>(0))
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(ids)
    }

    /// Returns the distinct source paths across all chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_all_document_names(&self) -> Result<Vec<String>> {
        self.distinct_metadata("source")
    }

    /// Returns the distinct dataset values across all chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_datasets(&self) -> Result<Vec<String>> {
        self.distinct_metadata("dataset")
    }

    fn distinct_metadata(&self, field: &str) -> Result<Vec<String>> {
        let conn = self.pool.get().map_err(StorageError::from)?;
        let sql = format!(
            "SELECT DISTINCT json_extract(metadata, '$.{field}') FROM chunks
             WHERE json_extract(metadata, '$.{field}') IS NOT NULL ORDER BY 1"
        );
        let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(values)
    }

    /// Removes all chunks whose `metadata.source` is in `sources`.
    ///
    /// Returns the deletion count.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, sources: &[String]) -> Result<usize> {
        if sources.is_empty() {
            return Ok(0);
        }
        let conn = self.pool.get().map_err(StorageError::from)?;
        let sql = format!(
            "DELETE FROM chunks WHERE json_extract(metadata, '$.source') IN ({})",
            placeholders(sources.len())
        );
        let count = conn
            .execute(&sql, params_from_iter(sources.iter()))
            .map_err(StorageError::from)?;
        Ok(count)
    }

    /// Total number of stored chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn chunk_count(&self) -> Result<usize> {
        let conn = self.pool.get().map_err(StorageError::from)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Builds a `?, ?, ...` placeholder list of length `n`.
fn placeholders(n: usize) -> String {
    let mut s = String::from("?");
    for _ in 1..n {
        s.push_str(", ?");
    }
    s
}
