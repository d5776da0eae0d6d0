//! Error types for the document manager.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval layer.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Corpus error.
    #[error("corpus error: {0}")]
    Corpus(#[from] docvec_corpus::CorpusError),

    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] docvec_embeddings::EmbeddingError),

    /// Vector cache error.
    #[error("cache error: {0}")]
    Cache(#[from] docvec_vector_cache::CacheError),

    /// Configuration error. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A different file already exists where a document would be copied.
    #[error("a different document already exists at {}", .0.display())]
    DocumentExists(PathBuf),

    /// No document with this id is cached.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Chat completion error.
    #[error("chat error: {0}")]
    Chat(String),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
