//! In-memory cache for free-text query embeddings.
//!
//! Document vectors live in the persistent vector store; this cache only
//! saves provider calls when the same search text is asked twice within one
//! process.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Embedding,
    model: String,
    /// Insertion sequence, used to evict the oldest entry.
    sequence: u64,
}

/// Bounded cache keyed by `(text, model)`.
pub struct QueryEmbeddingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryEmbeddingCache {
    /// Create a cache holding at most `max_entries` embeddings.
    ///
    /// A capacity of zero disables caching.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            sequence: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a cached embedding.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let key = Self::key(text, model);
        let found = self
            .entries
            .read()
            .await
            .get(&key)
            .map(|e| e.embedding.clone());
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store an embedding, evicting the oldest entry when full.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        if self.max_entries == 0 {
            return;
        }

        let key = Self::key(text, model);
        let entry = CacheEntry {
            embedding,
            model: model.to_string(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.write().await;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.sequence)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, entry);
        debug!("Cached query embedding (model: {model})");
    }

    /// Check if an embedding is cached.
    pub async fn contains(&self, text: &str, model: &str) -> bool {
        let key = Self::key(text, model);
        self.entries.read().await.contains_key(&key)
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        info!("Cleared query embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> QueryCacheStats {
        let entries = self.entries.read().await;
        let mut models: Vec<String> = entries
            .values()
            .map(|e| e.model.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        models.sort();
        QueryCacheStats {
            entries: entries.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            models,
        }
    }
}

/// Statistics about the query cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that missed.
    pub misses: u64,

    /// Models with cached embeddings.
    pub models: Vec<String>,
}
