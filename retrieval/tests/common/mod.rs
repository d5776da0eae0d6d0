//! Shared helpers for retrieval integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docvec_embeddings::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use docvec_embeddings::{HashingProvider, RetryPolicy};
use docvec_retrieval::chat::{ChatResponder, ChatTurn, ContextDocument};
use docvec_retrieval::{DocumentManager, EmbeddingProviderType, RetrievalConfig};
use tempfile::TempDir;

/// Hashing provider that counts calls and can be slowed down.
pub struct CountingProvider {
    inner: HashingProvider,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    delay: Duration,
}

impl CountingProvider {
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

    /// Texts sent to the provider, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
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
        self.inner.embed(request).await
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Responder that records what it was given and echoes the context ids.
#[derive(Default)]
pub struct RecordingResponder {
    pub calls: Mutex<Vec<(String, Vec<ContextDocument>, Vec<ChatTurn>)>>,
}

impl RecordingResponder {
    pub fn last_context(&self) -> Vec<ContextDocument> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|(_, context, _)| context.clone())
            .unwrap_or_default()
    }

    pub fn last_history(&self) -> Vec<ChatTurn> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, history)| history.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatResponder for RecordingResponder {
    async fn respond(
        &self,
        question: &str,
        context: &[ContextDocument],
        history: &[ChatTurn],
    ) -> docvec_retrieval::Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), context.to_vec(), history.to_vec()));
        let ids: Vec<&str> = context.iter().map(|c| c.doc_id.as_str()).collect();
        Ok(format!("answer from [{}]", ids.join(", ")))
    }
}

/// A corpus directory plus a manager over it.
pub struct Fixture {
    pub dir: TempDir,
    pub provider: Arc<CountingProvider>,
    pub manager: Arc<DocumentManager>,
}

impl Fixture {
    pub async fn new(files: &[(&str, &str)]) -> Self {
        Self::with_config(files, |_| {}).await
    }

    pub async fn with_config(
        files: &[(&str, &str)],
        configure: impl FnOnce(&mut RetrievalConfig),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            write(dir.path(), name, content);
        }
        let provider = CountingProvider::new(4096);

        let mut config = RetrievalConfig::new(dir.path()).with_provider(EmbeddingProviderType::Hashing);
        config.embedding.retry = RetryPolicy::none();
        configure(&mut config);

        let manager = DocumentManager::with_provider(config, provider.clone())
            .await
            .unwrap();
        Self {
            dir,
            provider,
            manager: Arc::new(manager),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        write(self.root(), name, content)
    }
}

pub fn write(root: &Path, name: &str, content: &str) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}
