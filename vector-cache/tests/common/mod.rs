//! Shared helpers for vector cache integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docvec_corpus::{CorpusConfig, CorpusScanner, Document, PlainTextExtractor};
use docvec_embeddings::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use docvec_embeddings::{EmbeddingError, HashingProvider, RetryPolicy, RetryingEmbedder};
use docvec_vector_cache::{CacheConfig, CacheManager};
use tempfile::TempDir;

/// Text marker that makes [`MockProvider`] answer `RateLimited`.
pub const RATE_LIMIT_MARKER: &str = "RATE-LIMIT-ME";

/// Deterministic provider that counts calls.
pub struct MockProvider {
    inner: HashingProvider,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    delay: Duration,
}

impl MockProvider {
    pub fn new(dimension: usize) -> Arc<Self> {
        Self::with_delay(dimension, Duration::ZERO)
    }

    pub fn with_delay(dimension: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingProvider::new(dimension),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    fn default_dimension(&self) -> usize {
        self.inner.default_dimension()
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> docvec_embeddings::Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(request.text.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if request.text.contains(RATE_LIMIT_MARKER) {
            return Err(EmbeddingError::RateLimited {
                retry_after_secs: None,
            });
        }
        self.inner.embed(request).await
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// A scratch corpus in a temporary directory.
pub struct TestCorpus {
    pub dir: TempDir,
}

impl TestCorpus {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn store_path(&self) -> PathBuf {
        docvec_vector_cache::default_store_path(self.root())
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.root().join(relative)).unwrap();
    }

    pub fn documents(&self) -> Vec<Document> {
        CorpusScanner::new(CorpusConfig::new(self.root()))
            .unwrap()
            .scan()
            .unwrap()
            .documents
    }
}

/// Retry policy without sleeping.
pub fn instant_retry() -> RetryPolicy {
    RetryPolicy::default().with_backoff(Duration::ZERO, Duration::ZERO)
}

pub async fn open_manager(
    store_path: impl Into<PathBuf>,
    provider: Arc<MockProvider>,
    config: CacheConfig,
) -> CacheManager {
    open_with_embedder(store_path, RetryingEmbedder::new(provider, instant_retry()), config).await
}

/// Like [`open_manager`], but embedding under an explicit model name.
pub async fn open_manager_with_model(
    store_path: impl Into<PathBuf>,
    provider: Arc<MockProvider>,
    model: &str,
    config: CacheConfig,
) -> CacheManager {
    let embedder = RetryingEmbedder::new(provider, instant_retry()).with_model(model);
    open_with_embedder(store_path, embedder, config).await
}

async fn open_with_embedder(
    store_path: impl Into<PathBuf>,
    embedder: RetryingEmbedder,
    config: CacheConfig,
) -> CacheManager {
    let embedder = Arc::new(embedder);
    CacheManager::open(
        store_path,
        embedder,
        Arc::new(PlainTextExtractor::new()),
        config,
    )
    .await
}
