//! Reconciliation of the vector store against the corpus.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use docvec_corpus::{Document, DocumentId, Fingerprint, TextExtractor, fingerprint};
use docvec_embeddings::{RetryingEmbedder, SimilarityIndex};
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::locks::KeyedLocks;
use crate::report::{FailedDocument, FailureReason, ReconcileReport};
use crate::store::{EmbeddingRecord, VectorStore, write_atomic};

/// What happens to records whose document left the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Remove them during full-corpus passes.
    #[default]
    Prune,
    /// Keep them and list them in the report.
    Retain,
}

/// Which documents a reconciliation pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileScope {
    /// The input is the whole corpus; stored ids not in it are orphans.
    Corpus,
    /// The input is a subset; other records are left alone.
    Documents,
}

/// Cache manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Provider calls in flight at once.
    pub max_concurrency: usize,

    /// Orphan handling.
    pub orphan_policy: OrphanPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            orphan_policy: OrphanPolicy::Prune,
        }
    }
}

impl CacheConfig {
    /// Set the number of concurrent provider calls.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the orphan policy.
    pub fn with_orphan_policy(mut self, orphan_policy: OrphanPolicy) -> Self {
        self.orphan_policy = orphan_policy;
        self
    }
}

/// Snapshot of the store for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub count: usize,
    pub dimension: Option<usize>,
    pub model: Option<String>,
    pub last_build: Option<DateTime<Utc>>,
    pub store_path: PathBuf,
    pub quarantined: usize,
    pub dirty: bool,
}

enum Outcome {
    Fresh,
    Recomputed,
    Failed(FailureReason),
}

/// Keeps the vector store in step with the documents on disk.
///
/// Only documents that are missing, stale or corrupt reach the provider.
/// At most one recompute of a document runs at a time, and a document
/// brought up to date by a concurrent pass is not embedded again.
pub struct CacheManager {
    store: RwLock<VectorStore>,
    embedder: Arc<RetryingEmbedder>,
    extractor: Arc<dyn TextExtractor>,
    locks: KeyedLocks,
    persist_lock: Mutex<()>,
    index: Mutex<Option<(u64, Arc<SimilarityIndex>)>>,
    config: CacheConfig,
}

impl CacheManager {
    /// Open the store at `store_path`. An unreadable store starts empty.
    pub async fn open(
        store_path: impl Into<PathBuf>,
        embedder: Arc<RetryingEmbedder>,
        extractor: Arc<dyn TextExtractor>,
        config: CacheConfig,
    ) -> Self {
        let store = VectorStore::load_or_empty(store_path).await;
        Self::with_store(store, embedder, extractor, config)
    }

    /// Wrap an already loaded store.
    pub fn with_store(
        store: VectorStore,
        embedder: Arc<RetryingEmbedder>,
        extractor: Arc<dyn TextExtractor>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store: RwLock::new(store),
            embedder,
            extractor,
            locks: KeyedLocks::new(),
            persist_lock: Mutex::new(()),
            index: Mutex::new(None),
            config,
        }
    }

    /// The embedder used for recomputes.
    pub fn embedder(&self) -> &Arc<RetryingEmbedder> {
        &self.embedder
    }

    /// The extractor used for recomputes.
    pub fn extractor(&self) -> &Arc<dyn TextExtractor> {
        &self.extractor
    }

    /// Manager configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Bring the store up to date with `documents`.
    ///
    /// Per-document failures are collected in the report and never abort
    /// the pass. The store is persisted once at the end if it changed; a
    /// persist failure is reported in [`ReconcileReport::persist_error`].
    pub async fn reconcile(&self, documents: &[Document], scope: ReconcileScope) -> ReconcileReport {
        let started = Instant::now();
        let mut report = ReconcileReport::new(documents.len());
        let concurrency = self.config.max_concurrency.max(1);
        self.drop_foreign_model().await;

        let tasks: Vec<_> = documents
            .iter()
            .map(|document| async move { (document.id.clone(), self.process(document).await) })
            .collect();
        let outcomes: Vec<(DocumentId, Outcome)> = stream::iter(tasks)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (doc_id, outcome) in outcomes {
            match outcome {
                Outcome::Fresh => report.fresh += 1,
                Outcome::Recomputed => report.recomputed += 1,
                Outcome::Failed(reason) => {
                    warn!("Failed to embed {doc_id}: {reason}");
                    report.failed.push(FailedDocument { doc_id, reason });
                }
            }
        }
        report.failed.sort();

        if scope == ReconcileScope::Corpus {
            self.handle_orphans(documents, &mut report).await;
            let mut store = self.store.write().await;
            if store.is_dirty() || store.last_build().is_none() {
                store.set_last_build(Utc::now());
            }
        }

        if let Err(e) = self.persist().await {
            warn!("Embeddings are not durable: {e}");
            report.persist_error = Some(e.to_string());
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!("Reconciled {report} in {}ms", report.duration_ms);
        report
    }

    /// Drop every record when the store was built with another model.
    ///
    /// Vectors from different models are not comparable and may differ in
    /// length, so the new model re-establishes the dimension from scratch.
    async fn drop_foreign_model(&self) {
        let model = self.embedder.model();
        let mut store = self.store.write().await;
        let previous = store
            .model()
            .filter(|previous| *previous != model)
            .map(str::to_string);
        if let Some(previous) = previous {
            if !store.is_empty() {
                info!(
                    "Embedding model changed from {previous} to {model}, dropping {} cached embeddings",
                    store.len()
                );
                store.clear();
            }
        }
    }

    async fn process(&self, document: &Document) -> Outcome {
        let fingerprint = match fingerprint(&document.source_path).await {
            Ok(fingerprint) => fingerprint,
            Err(e) => return Outcome::Failed((&e).into()),
        };
        let model = self.embedder.model();

        let state = self
            .store
            .read()
            .await
            .classify(document.id.as_str(), &fingerprint, model);
        if !state.needs_recompute() {
            debug!("{} is fresh", document.id);
            return Outcome::Fresh;
        }

        let _guard = self.locks.lock(&document.id).await;
        let state = self
            .store
            .read()
            .await
            .classify(document.id.as_str(), &fingerprint, model);
        if !state.needs_recompute() {
            debug!("{} was refreshed by a concurrent pass", document.id);
            return Outcome::Fresh;
        }

        debug!(
            "{} is {state:?} (fingerprint {}), recomputing",
            document.id,
            fingerprint.short()
        );
        match self.recompute(document, fingerprint).await {
            Ok(()) => Outcome::Recomputed,
            Err(reason) => Outcome::Failed(reason),
        }
    }

    async fn recompute(
        &self,
        document: &Document,
        fingerprint: Fingerprint,
    ) -> std::result::Result<(), FailureReason> {
        let text = self
            .extractor
            .extract(document)
            .await
            .map_err(|e| FailureReason::from(&e))?;

        let expected = self.store.read().await.expected_dimension();
        let response = self
            .embedder
            .embed(&text, expected)
            .await
            .map_err(|e| FailureReason::from(&e))?;

        let record = EmbeddingRecord::new(
            document.id.clone(),
            document.id.as_str(),
            fingerprint,
            response.embedding,
            self.embedder.model(),
        );
        self.store
            .write()
            .await
            .put(record)
            .map_err(|e| FailureReason::from(&e))
    }

    async fn handle_orphans(&self, documents: &[Document], report: &mut ReconcileReport) {
        let present: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let mut store = self.store.write().await;
        let mut orphans: Vec<DocumentId> = store
            .known_ids()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        orphans.sort();
        orphans.dedup();

        match self.config.orphan_policy {
            OrphanPolicy::Prune => {
                for id in &orphans {
                    store.remove(id.as_str());
                    debug!("Pruned orphaned record {id}");
                }
                report.orphans_removed = orphans;
            }
            OrphanPolicy::Retain => report.orphans_retained = orphans,
        }
    }

    /// Write the store to disk if it has unsaved changes.
    ///
    /// Writes are serialized so snapshots reach disk in order.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let (bytes, generation, path) = {
            let store = self.store.read().await;
            if !store.is_dirty() {
                return Ok(());
            }
            (store.encode()?, store.generation(), store.path().to_path_buf())
        };

        write_atomic(&path, bytes).await?;
        self.store.write().await.mark_clean(generation);
        debug!("Persisted store to {}", path.display());
        Ok(())
    }

    /// Drop the record for `doc_id` so the next pass recomputes it.
    ///
    /// Returns whether anything was removed.
    pub async fn invalidate(&self, doc_id: &str) -> Result<bool> {
        let removed = {
            let _guard = self.locks.lock(&DocumentId::new(doc_id)).await;
            let mut store = self.store.write().await;
            let quarantined = store.is_quarantined(doc_id);
            store.remove(doc_id).is_some() || quarantined
        };
        if removed {
            info!("Invalidated embedding for {doc_id}");
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Drop every record. The change reaches disk with the next persist.
    pub async fn clear(&self) {
        self.store.write().await.clear();
        info!("Cleared embedding store");
    }

    /// Current store status.
    pub async fn status(&self) -> CacheStatus {
        let store = self.store.read().await;
        CacheStatus {
            count: store.len(),
            dimension: store.dimension(),
            model: store.model().map(str::to_string),
            last_build: store.last_build(),
            store_path: store.path().to_path_buf(),
            quarantined: store.quarantined().count(),
            dirty: store.is_dirty(),
        }
    }

    /// Snapshot of every record, ordered by id.
    pub async fn records(&self) -> Vec<EmbeddingRecord> {
        self.store.read().await.all()
    }

    /// Snapshot of one record.
    pub async fn record(&self, doc_id: &str) -> Option<EmbeddingRecord> {
        self.store.read().await.get(doc_id).cloned()
    }

    /// Path the store persists to.
    pub async fn store_path(&self) -> PathBuf {
        self.store.read().await.path().to_path_buf()
    }

    /// Similarity index over the current records.
    ///
    /// The index is rebuilt only when the store changed since the last call.
    pub async fn similarity_index(&self) -> Result<Arc<SimilarityIndex>> {
        let store = self.store.read().await;
        let generation = store.generation();

        let mut cached = self.index.lock().await;
        if let Some((built_at, index)) = cached.as_ref() {
            if *built_at == generation {
                return Ok(Arc::clone(index));
            }
        }

        let index = Arc::new(SimilarityIndex::from_entries(
            store.expected_dimension(),
            store
                .records()
                .map(|r| (r.doc_id.to_string(), r.vector.clone())),
        )?);
        debug!(
            "Rebuilt similarity index at generation {generation} ({} entries)",
            index.len()
        );
        *cached = Some((generation, Arc::clone(&index)));
        Ok(index)
    }
}

/// Default store location for a corpus root.
pub fn default_store_path(root: &Path) -> PathBuf {
    root.join(docvec_corpus::config::STATE_DIR)
        .join("store.json")
}
