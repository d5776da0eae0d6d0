//! Error types for the vector cache.

use std::path::PathBuf;

use docvec_corpus::CorpusError;
use docvec_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for vector cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur in the vector cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The persisted store could not be parsed or has an unknown version.
    #[error("corrupt store {}: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    /// A vector does not match the store dimension.
    #[error("dimension mismatch: store has {expected}, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A record was offered with no vector.
    #[error("empty vector for {0}")]
    EmptyVector(String),

    /// Writing the store to disk failed. The in-memory store is unchanged.
    #[error("failed to persist store to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Corpus error.
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
