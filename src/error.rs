//! Error types for ragserve operations.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! all service operations including storage, chunking, ingestion, LLM calls,
//! and configuration.

use thiserror::Error;

/// Result type alias for ragserve operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for ragserve operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (database operations, retrieval).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Chunking-related errors (text splitting).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// LLM gateway errors (backend calls, streaming).
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Ingestion errors (file conversion, batch loading).
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Requested resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// Malformed or incomplete request.
    #[error("bad request: {message}")]
    BadRequest {
        /// Description of the problem with the request.
        message: String,
    },
}

/// Storage-specific errors for database and retrieval operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Connection pool exhausted or unavailable.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Store was provisioned for a different embedding dimension.
    #[error("embedding dimension mismatch: store has {stored}, requested {requested}")]
    DimensionMismatch {
        /// Dimension recorded at store creation.
        stored: usize,
        /// Dimension requested by the caller.
        requested: usize,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Embedding generation error.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Reranker scoring error.
    #[error("rerank error: {0}")]
    Rerank(String),
}

/// Chunking-specific errors for text splitting.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Invalid splitter configuration.
    #[error("invalid splitter configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap exceeds chunk size.
    #[error("overlap {overlap} must be less than chunk size {size}")]
    OverlapTooLarge {
        /// Overlap size.
        overlap: usize,
        /// Chunk size.
        size: usize,
    },

    /// Unknown splitter strategy name.
    #[error("unknown splitter strategy: {name}")]
    UnknownStrategy {
        /// Name of the unknown strategy.
        name: String,
    },
}

/// LLM gateway errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Backend API request failed.
    #[error("api request failed: {message}")]
    ApiRequest {
        /// Error detail from the backend or transport.
        message: String,
        /// HTTP status code, when the backend returned one.
        status: Option<u16>,
    },

    /// Streaming response failed mid-flight.
    #[error("stream error: {message}")]
    Stream {
        /// Error detail.
        message: String,
    },

    /// Backend returned a response the gateway could not interpret.
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of the malformed response.
        message: String,
    },
}

/// Ingestion errors for file loading and conversion.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Failed to read a source file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to convert a file to plain text.
    #[error("failed to convert file: {path}: {reason}")]
    ConvertFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write an uploaded file to the data directory.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Path escapes the configured data directory.
    #[error("path traversal denied: {path}")]
    PathTraversal {
        /// Path that was denied.
        path: String,
    },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No LLM backend flag was enabled.
    #[error(
        "no LLM backend selected: set one of use_openai, use_gemini, use_azure, use_anthropic, use_ollama"
    )]
    NoBackend,

    /// A required credential or endpoint is missing.
    #[error("missing credential: {key}")]
    MissingCredential {
        /// Name of the missing option.
        key: String,
    },

    /// A required option is absent.
    #[error("missing required option: {key}")]
    MissingOption {
        /// Name of the missing option.
        key: String,
    },

    /// An option holds a value that cannot be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Option name.
        key: String,
        /// The offending value.
        value: String,
    },

    /// Config file could not be read or written.
    #[error("config file error: {path}: {reason}")]
    File {
        /// Path to the config file.
        path: String,
        /// Reason for failure.
        reason: String,
    },
}

// Implement From traits for standard library and dependency errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Ingest(IngestError::ReadFailed {
            path: String::new(),
            reason: err.to_string(),
        })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        Self::Pool(err.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Self::Storage(StorageError::Pool(err.to_string()))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err.to_string()))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        Self::ApiRequest {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BadRequest {
            message: "missing prompt".to_string(),
        };
        assert_eq!(err.to_string(), "bad request: missing prompt");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Database("connection failed".to_string());
        assert!(err.to_string().contains("connection failed"));

        let err = StorageError::DimensionMismatch {
            stored: 384,
            requested: 768,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("768"));
    }

    #[test]
    fn test_chunking_error_display() {
        let err = ChunkingError::OverlapTooLarge {
            overlap: 100,
            size: 50,
        };
        assert_eq!(
            err.to_string(),
            "overlap 100 must be less than chunk size 50"
        );

        let err = ChunkingError::UnknownStrategy {
            name: "foobar".to_string(),
        };
        assert!(err.to_string().contains("foobar"));
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::ApiRequest {
            message: "rate limited".to_string(),
            status: Some(429),
        };
        assert!(err.to_string().contains("rate limited"));

        let err = LlmError::Stream {
            message: "connection reset".to_string(),
        };
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NoBackend;
        assert!(err.to_string().contains("use_openai"));

        let err = ConfigError::MissingCredential {
            key: "OPENAI_API_KEY".to_string(),
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_ingest_error_display() {
        let err = IngestError::PathTraversal {
            path: "../etc/passwd".to_string(),
        };
        assert!(err.to_string().contains("traversal"));
    }

    #[test]
    fn test_error_from_storage() {
        let storage_err = StorageError::Database("oops".to_string());
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_error_from_chunking() {
        let chunk_err = ChunkingError::UnknownStrategy {
            name: "x".to_string(),
        };
        let err: Error = chunk_err.into();
        assert!(matches!(err, Error::Chunking(_)));
    }

    #[test]
    fn test_error_from_llm() {
        let llm_err = LlmError::Stream {
            message: "eof".to_string(),
        };
        let err: Error = llm_err.into();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Ingest(_)));
    }
}
