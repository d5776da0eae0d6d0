//! # Retrieval
//!
//! Document management, similarity search and retrieval-augmented chat on
//! top of the docvec vector cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       DocumentManager                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  add / refresh / rebuild ──► CacheManager ──► store.json        │
//! │                                   │                             │
//! │  search / search_text ──► SimilarityIndex ◄─┘                   │
//! │          │                                                      │
//! │          ▼                                                      │
//! │     ChatSession ──► ChatResponder (chat completions)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docvec_retrieval::{DocumentManager, RetrievalConfig};
//!
//! let manager = DocumentManager::from_config(RetrievalConfig::new("~/notes")).await?;
//! let report = manager.refresh().await?;
//! let results = manager.search("notes/today.md", Some(0.7)).await?;
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod manager;

pub use chat::{
    ChatAnswer, ChatResponder, ChatSession, ChatTurn, ContextDocument, OpenAIChatResponder,
};
pub use config::{
    CacheSettings, ChatConfig, EmbeddingConfig, EmbeddingProviderType, RetrievalConfig,
    SearchConfig,
};
pub use error::{Result, RetrievalError};
pub use manager::{DocumentManager, DocumentSummary, StoreStatus, build_provider};

// Re-export from dependencies for convenience
pub use docvec_embeddings::{EmbeddingProvider, SimilarityResult};
pub use docvec_vector_cache::{FailureReason, OrphanPolicy, ReconcileReport};
