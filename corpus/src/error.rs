//! Error types for corpus access.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors that can occur while discovering or reading documents.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// A document could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The corpus root does not exist or is not a directory.
    #[error("corpus root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// A path that was expected inside the corpus root is not.
    #[error("{} is outside the corpus root {}", .path.display(), .root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Invalid exclude pattern.
    #[error("invalid exclude pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Extraction produced no usable text.
    #[error("unsupported document {}: {reason}", .path.display())]
    Unsupported { path: PathBuf, reason: String },

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
