//! Reconciliation outcomes.

use std::fmt;

use docvec_corpus::{CorpusError, DocumentId};
use docvec_embeddings::EmbeddingError;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// State of a document's cached embedding relative to the file on disk.
///
/// Records whose document left the corpus are not classified one by one;
/// a full-corpus pass lists them in [`ReconcileReport::orphans_removed`] or
/// [`ReconcileReport::orphans_retained`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// No record exists.
    Missing,
    /// A record exists but was computed from different content or a different model.
    Stale,
    /// The persisted vector had the wrong length.
    Corrupt,
    /// The record matches the current content.
    Fresh,
}

impl DocumentState {
    /// Whether a document in this state must be re-embedded.
    pub fn needs_recompute(self) -> bool {
        matches!(self, Self::Missing | Self::Stale | Self::Corrupt)
    }
}

/// Why a document could not be brought up to date.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The file could not be read for fingerprinting.
    Unreadable(String),
    /// No text could be extracted.
    Extraction(String),
    /// The provider kept rate limiting after every retry.
    RateLimited,
    /// The provider stayed unreachable after every retry.
    ProviderUnavailable(String),
    /// The provider rejected the text.
    InvalidInput(String),
    /// The provider returned a vector of the wrong length.
    DimensionMismatch { expected: usize, actual: usize },
    /// Any other provider failure.
    Provider(String),
    /// The store refused the record.
    Store(String),
}

impl From<&EmbeddingError> for FailureReason {
    fn from(err: &EmbeddingError) -> Self {
        match err {
            EmbeddingError::RateLimited { .. } => Self::RateLimited,
            EmbeddingError::ProviderUnavailable(msg) => Self::ProviderUnavailable(msg.clone()),
            EmbeddingError::InvalidInput(msg) => Self::InvalidInput(msg.clone()),
            EmbeddingError::DimensionMismatch { expected, actual } => Self::DimensionMismatch {
                expected: *expected,
                actual: *actual,
            },
            other => Self::Provider(other.to_string()),
        }
    }
}

impl From<&CorpusError> for FailureReason {
    fn from(err: &CorpusError) -> Self {
        match err {
            CorpusError::Read { .. } | CorpusError::Io(_) => Self::Unreadable(err.to_string()),
            other => Self::Extraction(other.to_string()),
        }
    }
}

impl From<&CacheError> for FailureReason {
    fn from(err: &CacheError) -> Self {
        match err {
            CacheError::DimensionMismatch { expected, actual } => Self::DimensionMismatch {
                expected: *expected,
                actual: *actual,
            },
            CacheError::Embedding(e) => e.into(),
            CacheError::Corpus(e) => e.into(),
            other => Self::Store(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(msg) => write!(f, "unreadable: {msg}"),
            Self::Extraction(msg) => write!(f, "extraction failed: {msg}"),
            Self::RateLimited => f.write_str("rate limited"),
            Self::ProviderUnavailable(msg) => write!(f, "provider unavailable: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            Self::Provider(msg) => write!(f, "provider error: {msg}"),
            Self::Store(msg) => write!(f, "store error: {msg}"),
        }
    }
}

/// A document that failed during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailedDocument {
    pub doc_id: DocumentId,
    pub reason: FailureReason,
}

/// Summary of one reconciliation pass.
///
/// `fresh + recomputed + failed.len() == total` for every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Documents considered.
    pub total: usize,

    /// Documents whose record was already up to date.
    pub fresh: usize,

    /// Documents embedded during this pass.
    pub recomputed: usize,

    /// Documents that could not be brought up to date.
    pub failed: Vec<FailedDocument>,

    /// Orphaned records dropped from the store.
    pub orphans_removed: Vec<DocumentId>,

    /// Orphaned records kept because pruning is disabled.
    pub orphans_retained: Vec<DocumentId>,

    /// Wall-clock duration of the pass.
    pub duration_ms: u64,

    /// Set when the updated store could not be written to disk.
    pub persist_error: Option<String>,
}

impl ReconcileReport {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Documents that are fresh after the pass.
    pub fn succeeded(&self) -> usize {
        self.fresh + self.recomputed
    }

    /// Whether every document is fresh and the store reached disk.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.persist_error.is_none()
    }

    /// Look up the failure for `doc_id`, if any.
    pub fn failure(&self, doc_id: &str) -> Option<&FailureReason> {
        self.failed
            .iter()
            .find(|f| f.doc_id.as_str() == doc_id)
            .map(|f| &f.reason)
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents: {} fresh, {} recomputed, {} failed, {} orphans removed",
            self.total,
            self.fresh,
            self.recomputed,
            self.failed.len(),
            self.orphans_removed.len()
        )?;
        if !self.orphans_retained.is_empty() {
            write!(f, ", {} orphans retained", self.orphans_retained.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_needs_recompute() {
        assert!(DocumentState::Missing.needs_recompute());
        assert!(DocumentState::Stale.needs_recompute());
        assert!(DocumentState::Corrupt.needs_recompute());
        assert!(!DocumentState::Fresh.needs_recompute());
    }

    #[test]
    fn test_failure_reason_from_embedding_error() {
        let reason = FailureReason::from(&EmbeddingError::RateLimited {
            retry_after_secs: Some(3),
        });
        assert_eq!(reason, FailureReason::RateLimited);

        let reason = FailureReason::from(&EmbeddingError::DimensionMismatch {
            expected: 4,
            actual: 2,
        });
        assert_eq!(
            reason,
            FailureReason::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_report_summary() {
        let mut report = ReconcileReport::new(3);
        report.fresh = 1;
        report.recomputed = 1;
        report.failed.push(FailedDocument {
            doc_id: DocumentId::new("c.txt"),
            reason: FailureReason::RateLimited,
        });

        assert_eq!(report.succeeded(), 2);
        assert!(!report.is_complete());
        assert_eq!(report.failure("c.txt"), Some(&FailureReason::RateLimited));
        assert_eq!(
            report.to_string(),
            "3 documents: 1 fresh, 1 recomputed, 1 failed, 0 orphans removed"
        );
    }

    #[test]
    fn test_failure_reason_serializes_tagged() {
        let json = serde_json::to_value(FailureReason::Unreadable("gone".to_string())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "unreadable", "detail": "gone" })
        );
    }
}
