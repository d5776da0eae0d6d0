//! Document manager: the entry point for adding, listing and searching
//! documents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docvec_corpus::{
    CorpusError, CorpusScanner, Document, Fingerprint, PlainTextExtractor, file_type,
    truncate_chars,
};
use docvec_embeddings::similarity::validate_threshold;
use docvec_embeddings::{
    EmbeddingError, EmbeddingProvider, HashingProvider, OpenAIProvider, QueryEmbeddingCache,
    RetryingEmbedder, SimilarityResult,
};
use docvec_vector_cache::store::write_atomic;
use docvec_vector_cache::{CacheManager, ReconcileReport, ReconcileScope};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{EmbeddingProviderType, RetrievalConfig};
use crate::error::{Result, RetrievalError};

/// A cached document as shown by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub source_path: String,
    pub file_type: String,
    pub added: DateTime<Utc>,
    pub dimension: usize,
}

/// Store status as shown by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub count: usize,
    pub dimension: Option<usize>,
    pub last_build_time: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub provider: String,
    pub store_path: PathBuf,
    pub quarantined: usize,
}

/// Build the provider selected by `config`.
///
/// A missing `OPENAI_API_KEY` for the OpenAI provider is a configuration
/// error.
pub fn build_provider(config: &RetrievalConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    match embedding.provider {
        EmbeddingProviderType::OpenAI => {
            let mut provider = OpenAIProvider::from_env().map_err(|_| {
                RetrievalError::Config(format!(
                    "{} is not set; export it or add it to a .env file",
                    docvec_embeddings::provider::OPENAI_API_KEY_ENV
                ))
            })?;
            if let Some(base_url) = &embedding.base_url {
                provider = provider.with_base_url(base_url);
            }
            if let Some(model) = &embedding.model {
                provider = provider.with_model(model);
            }
            Ok(Arc::new(provider))
        }
        EmbeddingProviderType::Hashing => Ok(Arc::new(
            embedding
                .dimensions
                .map(HashingProvider::new)
                .unwrap_or_default(),
        )),
    }
}

/// Manages a corpus of documents and their cached embeddings.
pub struct DocumentManager {
    config: RetrievalConfig,
    scanner: CorpusScanner,
    cache: CacheManager,
    query_cache: QueryEmbeddingCache,
}

impl DocumentManager {
    /// Open the corpus described by `config` with the configured provider.
    pub async fn from_config(config: RetrievalConfig) -> Result<Self> {
        let provider = build_provider(&config)?;
        Self::with_provider(config, provider).await
    }

    /// Open the corpus with an explicit provider.
    pub async fn with_provider(
        config: RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let scanner = CorpusScanner::new(config.corpus.clone())?;

        let mut embedder = RetryingEmbedder::new(provider, config.embedding.retry);
        if let Some(model) = &config.embedding.model {
            embedder = embedder.with_model(model);
        }
        if let Some(dimensions) = config.embedding.dimensions {
            embedder = embedder.with_dimensions(dimensions);
        }

        let mut extractor = PlainTextExtractor::new();
        if let Some(max_chars) = config.embedding.max_input_chars {
            extractor = extractor.with_max_chars(max_chars);
        }

        let cache = CacheManager::open(
            config.store_path(),
            Arc::new(embedder),
            Arc::new(extractor),
            config.cache_config(),
        )
        .await;

        info!(
            "Opened corpus at {} with provider {}",
            scanner.root().display(),
            cache.embedder().provider().name()
        );
        Ok(Self {
            query_cache: QueryEmbeddingCache::new(config.embedding.query_cache_entries),
            config,
            scanner,
            cache,
        })
    }

    /// The configuration in effect.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Canonical corpus root.
    pub fn root(&self) -> &Path {
        self.scanner.root()
    }

    /// The underlying cache manager.
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Add one document and embed it.
    ///
    /// A file inside the corpus root is used in place. A file outside it is
    /// copied into the root first; if a different file already has that
    /// name the call fails with [`RetrievalError::DocumentExists`]. Files
    /// that a refresh would not index (excluded, wrong type, too large or
    /// too deep) are rejected before any provider call.
    pub async fn add(&self, path: impl AsRef<Path>) -> Result<ReconcileReport> {
        let path = path.as_ref();
        let source = tokio::fs::canonicalize(path)
            .await
            .map_err(|source| CorpusError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let metadata = tokio::fs::metadata(&source).await?;
        if !metadata.is_file() {
            return Err(CorpusError::Unsupported {
                path: source,
                reason: "not a regular file".to_string(),
            }
            .into());
        }

        let document = if source.starts_with(self.root()) {
            self.scanner.admits(&source, metadata.len())?;
            self.scanner.document_for(&source)?
        } else {
            let target = self.import_target(&source)?;
            self.scanner.admits(&target, metadata.len())?;
            self.import(&source, &target).await?
        };

        info!("Adding document {}", document.id);
        let report = self
            .cache
            .reconcile(std::slice::from_ref(&document), ReconcileScope::Documents)
            .await;
        Ok(report)
    }

    fn import_target(&self, source: &Path) -> Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| CorpusError::Unsupported {
            path: source.to_path_buf(),
            reason: "no file name".to_string(),
        })?;
        Ok(self.root().join(file_name))
    }

    async fn import(&self, source: &Path, target: &Path) -> Result<Document> {
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| CorpusError::Read {
                path: source.to_path_buf(),
                source: e,
            })?;

        match tokio::fs::read(target).await {
            Ok(existing) => {
                if Fingerprint::of_bytes(&existing) != Fingerprint::of_bytes(&bytes) {
                    return Err(RetrievalError::DocumentExists(target.to_path_buf()));
                }
                debug!("{} is already in the corpus", target.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_atomic(target, bytes).await?;
                info!("Copied {} into {}", source.display(), target.display());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(self.scanner.document_for(target)?)
    }

    /// Every cached document, ordered by id.
    pub async fn list(&self) -> Vec<DocumentSummary> {
        self.cache
            .records()
            .await
            .into_iter()
            .map(|record| DocumentSummary {
                file_type: file_type(Path::new(&record.source_path))
                    .unwrap_or_else(|| "unknown".to_string()),
                doc_id: record.doc_id.to_string(),
                source_path: record.source_path,
                added: record.created_at,
                dimension: record.vector.len(),
            })
            .collect()
    }

    /// Search by document id if `query` names a cached document, otherwise
    /// by free text.
    pub async fn search(
        &self,
        query: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<SimilarityResult>> {
        if self.cache.record(query).await.is_some() {
            self.search_document(query, threshold).await
        } else {
            self.search_text(query, threshold).await
        }
    }

    /// Documents similar to the cached document `doc_id`, excluding itself.
    pub async fn search_document(
        &self,
        doc_id: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<SimilarityResult>> {
        let threshold = validate_threshold(self.threshold(threshold))?;
        let record = self
            .cache
            .record(doc_id)
            .await
            .ok_or_else(|| RetrievalError::NotFound(doc_id.to_string()))?;

        let index = self.cache.similarity_index().await?;
        let results = index.search(&record.vector, threshold, Some(doc_id))?;
        debug!("{} documents similar to {doc_id}", results.len());
        Ok(self.limit(results))
    }

    /// Documents similar to a free-text query.
    pub async fn search_text(
        &self,
        text: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<SimilarityResult>> {
        let threshold = validate_threshold(self.threshold(threshold))?;
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty query".to_string()).into());
        }

        let text = match self.config.embedding.max_input_chars {
            Some(max) => truncate_chars(text, max),
            None => text,
        };

        let index = self.cache.similarity_index().await?;
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = self.cache.embedder();
        let model = embedder.model();
        let query = match self.query_cache.get(text, model).await {
            Some(query) => query,
            None => {
                let response = embedder.embed(text, index.dimension()).await?;
                self.query_cache
                    .put(text, model, response.embedding.clone())
                    .await;
                response.embedding
            }
        };

        let results = index.search(&query, threshold, None)?;
        Ok(self.limit(results))
    }

    fn threshold(&self, threshold: Option<f32>) -> f32 {
        threshold.unwrap_or(self.config.search.default_threshold)
    }

    fn limit(&self, mut results: Vec<SimilarityResult>) -> Vec<SimilarityResult> {
        if let Some(max) = self.config.search.max_results {
            results.truncate(max);
        }
        results
    }

    fn scan(&self) -> Result<Vec<Document>> {
        Ok(self.scanner.scan()?.documents)
    }

    /// Bring the store up to date with the whole corpus.
    pub async fn refresh(&self) -> Result<ReconcileReport> {
        let documents = self.scan()?;
        Ok(self
            .cache
            .reconcile(&documents, ReconcileScope::Corpus)
            .await)
    }

    /// Drop every cached embedding and embed the whole corpus again.
    pub async fn rebuild(&self) -> Result<ReconcileReport> {
        let documents = self.scan()?;
        self.cache.clear().await;
        self.query_cache.clear().await;
        info!("Rebuilding embeddings for {} documents", documents.len());
        Ok(self
            .cache
            .reconcile(&documents, ReconcileScope::Corpus)
            .await)
    }

    /// Drop the cached embedding of `doc_id`.
    pub async fn invalidate(&self, doc_id: &str) -> Result<bool> {
        Ok(self.cache.invalidate(doc_id).await?)
    }

    /// Current store status.
    pub async fn status(&self) -> StoreStatus {
        let status = self.cache.status().await;
        StoreStatus {
            count: status.count,
            dimension: status.dimension,
            last_build_time: status.last_build,
            model: status.model,
            provider: self.cache.embedder().provider().name().to_string(),
            store_path: status.store_path,
            quarantined: status.quarantined,
        }
    }

    /// Extracted text of a document in the corpus.
    pub async fn document_text(&self, doc_id: &str) -> Result<String> {
        let document = self.scanner.document_for(&self.root().join(doc_id))?;
        Ok(self.cache.extractor().extract(&document).await?)
    }
}
