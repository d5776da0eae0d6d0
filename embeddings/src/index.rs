//! Similarity index over a snapshot of stored embeddings.

use std::collections::HashMap;

use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{SimilarityResult, dot_product, normalize, validate_threshold};

/// An entry in the similarity index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Document identifier.
    pub doc_id: String,

    /// The embedding vector, normalized to unit length.
    pub embedding: Embedding,
}

/// A similarity index for cosine search.
///
/// The index owns normalized copies of the vectors it was built from, so it
/// stays valid independently of the store it was taken from. Search is a
/// full scan over all entries.
#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    /// Stored entries.
    entries: HashMap<String, IndexEntry>,

    /// Dimension of every entry; `None` until the first entry is added.
    dimension: Option<usize>,
}

impl SimilarityIndex {
    /// Create an empty index with a fixed dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimension: Some(dimension),
        }
    }

    /// Build an index from `(doc_id, embedding)` pairs.
    pub fn from_entries<I>(dimension: Option<usize>, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Embedding)>,
    {
        let mut index = Self {
            entries: HashMap::new(),
            dimension,
        };
        for (doc_id, embedding) in entries {
            index.add(doc_id, embedding)?;
        }
        debug!("Built similarity index with {} entries", index.len());
        Ok(index)
    }

    /// Add an embedding to the index, replacing any entry with the same id.
    pub fn add(&mut self, doc_id: impl Into<String>, mut embedding: Embedding) -> Result<()> {
        let doc_id = doc_id.into();
        let expected = *self.dimension.get_or_insert(embedding.len());

        if embedding.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        normalize(&mut embedding);
        self.entries
            .insert(doc_id.clone(), IndexEntry { doc_id, embedding });
        Ok(())
    }

    /// Remove an embedding from the index.
    pub fn remove(&mut self, doc_id: &str) -> Option<IndexEntry> {
        self.entries.remove(doc_id)
    }

    /// Get an entry by ID.
    pub fn get(&self, doc_id: &str) -> Option<&IndexEntry> {
        self.entries.get(doc_id)
    }

    /// Check if an ID exists in the index.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.entries.contains_key(doc_id)
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimension shared by every entry.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Rank every entry against `query`.
    ///
    /// Results with `score >= threshold` are returned, ordered by score
    /// descending and then by id ascending. `exclude` drops one id from the
    /// results, typically the document the query vector came from.
    pub fn search(
        &self,
        query: &[f32],
        threshold: f32,
        exclude: Option<&str>,
    ) -> Result<Vec<SimilarityResult>> {
        let threshold = validate_threshold(threshold)?;

        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut results = Vec::new();
        for entry in self.entries.values() {
            if exclude == Some(entry.doc_id.as_str()) {
                continue;
            }
            let score = dot_product(&query, &entry.embedding)?.clamp(-1.0, 1.0);
            if score >= threshold {
                results.push(SimilarityResult::new(entry.doc_id.clone(), score));
            }
        }

        results.sort_by(SimilarityResult::ranking);
        Ok(results)
    }

    /// Like [`search`](Self::search), keeping only the best `k` results.
    pub fn search_top_k(
        &self,
        query: &[f32],
        threshold: f32,
        exclude: Option<&str>,
        k: usize,
    ) -> Result<Vec<SimilarityResult>> {
        let mut results = self.search(query, threshold, exclude)?;
        results.truncate(k);
        Ok(results)
    }
}
