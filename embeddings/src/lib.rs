//! # Embeddings
//!
//! This crate provides embedding generation and similarity search for
//! docvec.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through a provider
//! - **Retry Policy**: Bounded exponential backoff for rate limits and outages
//! - **Similarity Search**: Rank stored vectors by cosine similarity
//! - **Query Caching**: Reuse embeddings of repeated free-text queries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► RetryingEmbedder ──► Embedding           │
//! │       │                                        │                │
//! │       ▼                                        ▼                │
//! │  OpenAI/Hashing      QueryEmbeddingCache   SimilarityIndex      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod provider;
pub mod retry;
pub mod similarity;

pub use cache::{QueryCacheStats, QueryEmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use index::SimilarityIndex;
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider, OpenAIProvider,
};
pub use retry::{RetryPolicy, RetryingEmbedder};
pub use similarity::{SimilarityResult, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of embeddings (varies by model).
pub const DEFAULT_DIMENSION: usize = 1536; // OpenAI text-embedding-3-small
