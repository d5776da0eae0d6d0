//! # Vector Cache
//!
//! Persistent store of document embeddings and the reconciliation logic that
//! keeps it in step with the corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CacheManager                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Documents ──► fingerprint ──► classify ──► RetryingEmbedder    │
//! │                                   │                │            │
//! │                                   ▼                ▼            │
//! │                 KeyedLocks    VectorStore ◄── put record        │
//! │                                   │                             │
//! │                                   ▼                             │
//! │                  store.json (atomic)   SimilarityIndex          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A document is **fresh** when its stored fingerprint equals the current
//! one, **stale** when content or model changed, **missing** when it has
//! no record, **corrupt** when its persisted vector had the wrong length,
//! and **orphaned** when a record outlives its file.

pub mod error;
pub mod locks;
pub mod manager;
pub mod report;
pub mod store;

pub use error::{CacheError, Result};
pub use locks::KeyedLocks;
pub use manager::{
    CacheConfig, CacheManager, CacheStatus, OrphanPolicy, ReconcileScope, default_store_path,
};
pub use report::{DocumentState, FailedDocument, FailureReason, ReconcileReport};
pub use store::{EmbeddingRecord, STORE_VERSION, VectorStore};
