//! Database schema definitions.
//!
//! Contains SQL schema and provisioning constants for the vector store.
//! The lexical index is an FTS5 external-content table kept in sync with
//! the chunks table by triggers, so a row write and its index entry are
//! never observable separately.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial store setup.
pub const SCHEMA_SQL: &str = r"
-- Store metadata (schema version, embedding dimension)
CREATE TABLE IF NOT EXISTS store_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Retrievable chunks; id is the md5 of the chunk content
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,  -- f32 array serialized as little-endian bytes
    metadata TEXT NOT NULL    -- JSON; carries at least source and dataset
);

-- Metadata indexes for source/dataset projections and filters
CREATE INDEX IF NOT EXISTS idx_chunks_source
    ON chunks(json_extract(metadata, '$.source'));
CREATE INDEX IF NOT EXISTS idx_chunks_dataset
    ON chunks(json_extract(metadata, '$.dataset'));

-- FTS5 virtual table for BM25 full-text search
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    content='chunks',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

-- Triggers to keep the FTS5 index in sync with the chunks table
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES('delete', old.rowid, old.content);
    INSERT INTO chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;
";

/// SQL to read a `store_info` entry.
pub const GET_INFO_SQL: &str = r"
SELECT value FROM store_info WHERE key = ?;
";

/// SQL to write a `store_info` entry.
pub const SET_INFO_SQL: &str = r"
INSERT OR REPLACE INTO store_info (key, value) VALUES (?, ?);
";

/// `store_info` key holding the schema version.
pub const INFO_VERSION: &str = "version";

/// `store_info` key holding the embedding dimension fixed at setup.
pub const INFO_EMBEDDING_DIM: &str = "embedding_dim";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version() {
        const _: () = assert!(CURRENT_SCHEMA_VERSION >= 1);
    }

    #[test]
    fn test_schema_sql_not_empty() {
        assert!(!SCHEMA_SQL.is_empty());
        assert!(SCHEMA_SQL.contains("CREATE TABLE"));
        assert!(SCHEMA_SQL.contains("fts5"));
    }
}
