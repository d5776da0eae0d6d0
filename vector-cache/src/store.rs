//! Persistent embedding store.
//!
//! The store is a map from [`DocumentId`] to [`EmbeddingRecord`] with one
//! dimension shared by every record. It is persisted as a single pretty
//! JSON file that is replaced atomically on every write.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docvec_corpus::{DocumentId, Fingerprint};
use docvec_embeddings::Embedding;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::report::DocumentState;

/// Schema version written to and accepted from disk.
pub const STORE_VERSION: u32 = 1;

/// A cached embedding of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Document the vector belongs to.
    pub doc_id: DocumentId,

    /// Path relative to the corpus root.
    pub source_path: String,

    /// Fingerprint of the content the vector was computed from.
    pub fingerprint: Fingerprint,

    /// The embedding.
    pub vector: Embedding,

    /// Model that produced the vector.
    pub model: String,

    /// When the vector was computed.
    pub created_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        doc_id: DocumentId,
        source_path: impl Into<String>,
        fingerprint: Fingerprint,
        vector: Embedding,
        model: impl Into<String>,
    ) -> Self {
        Self {
            doc_id,
            source_path: source_path.into(),
            fingerprint,
            vector,
            model: model.into(),
            created_at: Utc::now(),
        }
    }
}

/// On-disk form of a record; the id is the map key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    source_path: String,
    fingerprint: Fingerprint,
    vector: Embedding,
    model: String,
    created_at: DateTime<Utc>,
}

/// On-disk form of the store.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    last_build: Option<DateTime<Utc>>,
    #[serde(default)]
    records: BTreeMap<String, StoredRecord>,
}

/// In-memory embedding store backed by a JSON file.
#[derive(Debug)]
pub struct VectorStore {
    path: PathBuf,
    records: BTreeMap<DocumentId, EmbeddingRecord>,
    dimension: Option<usize>,
    model: Option<String>,
    last_build: Option<DateTime<Utc>>,
    /// Ids whose persisted vector had the wrong length.
    quarantined: BTreeSet<DocumentId>,
    generation: u64,
    dirty: bool,
}

impl VectorStore {
    /// Create an empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dimension: None,
            model: None,
            last_build: None,
            quarantined: BTreeSet::new(),
            generation: 0,
            dirty: false,
        }
    }

    /// Load the store at `path`.
    ///
    /// A missing file yields an empty store. A file that does not parse or
    /// carries an unknown version fails with [`CacheError::CorruptStore`].
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(CacheError::Io(e)),
        };

        let file: StoreFile =
            serde_json::from_slice(&content).map_err(|e| CacheError::CorruptStore {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if file.version != STORE_VERSION {
            return Err(CacheError::CorruptStore {
                path,
                reason: format!("unsupported version {}", file.version),
            });
        }

        let store = Self::from_file(path, file);
        info!(
            "Loaded {} embeddings from {} ({} quarantined)",
            store.records.len(),
            store.path.display(),
            store.quarantined.len()
        );
        Ok(store)
    }

    /// Load the store at `path`, starting empty if it cannot be read.
    ///
    /// A store recovered this way is marked dirty so the next persist
    /// replaces the unreadable file.
    pub async fn load_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(path.clone()).await {
            Ok(store) => store,
            Err(e) => {
                warn!("Discarding unreadable store, starting empty: {e}");
                let mut store = Self::empty(path);
                store.dirty = true;
                store
            }
        }
    }

    fn from_file(path: PathBuf, file: StoreFile) -> Self {
        let dimension = file.dimension.or_else(|| {
            file.records
                .values()
                .map(|r| r.vector.len())
                .find(|len| *len > 0)
        });

        let mut store = Self {
            dimension,
            model: file.model,
            last_build: file.last_build,
            ..Self::empty(path)
        };

        for (id, record) in file.records {
            let doc_id = DocumentId::new(id);
            if record.vector.is_empty() || Some(record.vector.len()) != dimension {
                warn!(
                    "Quarantining {doc_id}: vector has {} dimensions, store has {dimension:?}",
                    record.vector.len()
                );
                store.quarantined.insert(doc_id);
                continue;
            }
            store.records.insert(
                doc_id.clone(),
                EmbeddingRecord {
                    doc_id,
                    source_path: record.source_path,
                    fingerprint: record.fingerprint,
                    vector: record.vector,
                    model: record.model,
                    created_at: record.created_at,
                },
            );
        }
        store
    }

    /// Path the store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a record by id.
    pub fn get(&self, doc_id: &str) -> Option<&EmbeddingRecord> {
        self.records.get(doc_id)
    }

    /// Check if a record exists.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.records.contains_key(doc_id)
    }

    /// Insert or replace a record.
    ///
    /// The first record of an empty store establishes the dimension; every
    /// later record must match it.
    pub fn put(&mut self, record: EmbeddingRecord) -> Result<()> {
        let actual = record.vector.len();
        if actual == 0 {
            return Err(CacheError::EmptyVector(record.doc_id.to_string()));
        }
        match self.expected_dimension() {
            Some(expected) if expected != actual => {
                return Err(CacheError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => self.dimension = Some(actual),
        }

        self.quarantined.remove(&record.doc_id);
        self.model = Some(record.model.clone());
        self.records.insert(record.doc_id.clone(), record);
        self.touch();
        Ok(())
    }

    /// Remove a record (and any quarantine entry) by id.
    pub fn remove(&mut self, doc_id: &str) -> Option<EmbeddingRecord> {
        let was_quarantined = self.quarantined.remove(doc_id);
        let removed = self.records.remove(doc_id);
        if removed.is_some() || was_quarantined {
            self.touch();
        }
        removed
    }

    /// Drop every record, the dimension and the quarantine set.
    pub fn clear(&mut self) {
        self.records.clear();
        self.quarantined.clear();
        self.dimension = None;
        self.last_build = None;
        self.touch();
    }

    /// Iterate over records in id order.
    pub fn records(&self) -> impl Iterator<Item = &EmbeddingRecord> {
        self.records.values()
    }

    /// Snapshot of every record.
    pub fn all(&self) -> Vec<EmbeddingRecord> {
        self.records.values().cloned().collect()
    }

    /// Ids known to the store, including quarantined ones.
    pub fn known_ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.records.keys().chain(self.quarantined.iter())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Dimension of stored vectors, if established.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Dimension new records must have; `None` while the store is empty.
    pub fn expected_dimension(&self) -> Option<usize> {
        if self.records.is_empty() {
            None
        } else {
            self.dimension
        }
    }

    /// Model of the most recent record.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// When the corpus was last fully reconciled.
    pub fn last_build(&self) -> Option<DateTime<Utc>> {
        self.last_build
    }

    /// Record the completion of a full reconciliation.
    pub fn set_last_build(&mut self, at: DateTime<Utc>) {
        self.last_build = Some(at);
        self.touch();
    }

    /// Ids quarantined at load time and not yet recomputed.
    pub fn quarantined(&self) -> impl Iterator<Item = &DocumentId> {
        self.quarantined.iter()
    }

    /// Check if `doc_id` is quarantined.
    pub fn is_quarantined(&self, doc_id: &str) -> bool {
        self.quarantined.contains(doc_id)
    }

    /// Classify a document against its stored record.
    pub fn classify(&self, doc_id: &str, fingerprint: &Fingerprint, model: &str) -> DocumentState {
        if self.quarantined.contains(doc_id) {
            return DocumentState::Corrupt;
        }
        match self.records.get(doc_id) {
            None => DocumentState::Missing,
            Some(record) if Some(record.vector.len()) != self.dimension => {
                DocumentState::Corrupt
            }
            Some(record) if record.fingerprint != *fingerprint || record.model != model => {
                DocumentState::Stale
            }
            Some(_) => DocumentState::Fresh,
        }
    }

    /// Counter bumped by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the store has changes not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the store clean if nothing changed since `generation` was read.
    pub fn mark_clean(&mut self, generation: u64) {
        if self.generation == generation {
            self.dirty = false;
        }
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.dirty = true;
    }

    /// Serialize the store to its on-disk form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let file = StoreFile {
            version: STORE_VERSION,
            dimension: self.dimension,
            model: self.model.clone(),
            last_build: self.last_build,
            records: self
                .records
                .iter()
                .map(|(id, r)| {
                    (
                        id.to_string(),
                        StoredRecord {
                            source_path: r.source_path.clone(),
                            fingerprint: r.fingerprint.clone(),
                            vector: r.vector.clone(),
                            model: r.model.clone(),
                            created_at: r.created_at,
                        },
                    )
                })
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    /// Write the store to disk and mark it clean.
    #[cfg(test)]
    async fn persist(&mut self) -> Result<()> {
        let generation = self.generation;
        write_atomic(&self.path, self.encode()?).await?;
        self.mark_clean(generation);
        debug!(
            "Persisted {} embeddings to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Replace `path` with `bytes` so readers see either the old or the new file.
///
/// The bytes go to a uniquely named temporary file in the same directory,
/// which is synced and then renamed over `path`. The temporary file is
/// removed on every error path.
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let target = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || write_atomic_blocking(&target, &bytes))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()));

    result
        .and_then(|inner| inner)
        .map_err(|source| CacheError::Persist {
            path: path.to_path_buf(),
            source,
        })
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record(id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord::new(
            DocumentId::new(id),
            id,
            Fingerprint::of_bytes(id.as_bytes()),
            vector,
            "test-model",
        )
    }

    fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().is_some_and(|n| n != "store.json"))
            .collect()
    }

    #[test]
    fn test_first_put_establishes_dimension() {
        let mut store = VectorStore::empty("store.json");
        store.put(record("a", vec![1.0, 0.0, 0.0])).unwrap();
        assert_eq!(store.dimension(), Some(3));

        let err = store.put(record("b", vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(
            err,
            CacheError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(!store.contains("b"));
    }

    #[test]
    fn test_empty_vector_rejected() {
        let mut store = VectorStore::empty("store.json");
        assert!(matches!(
            store.put(record("a", Vec::new())),
            Err(CacheError::EmptyVector(_))
        ));
    }

    #[test]
    fn test_clear_resets_dimension() {
        let mut store = VectorStore::empty("store.json");
        store.put(record("a", vec![1.0, 0.0, 0.0])).unwrap();
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.dimension(), None);
        store.put(record("a", vec![1.0, 0.0])).unwrap();
        assert_eq!(store.dimension(), Some(2));
    }

    #[test]
    fn test_generation_tracks_mutations() {
        let mut store = VectorStore::empty("store.json");
        let start = store.generation();
        store.put(record("a", vec![1.0])).unwrap();
        assert!(store.generation() > start);

        let after_put = store.generation();
        assert!(store.remove("missing").is_none());
        assert_eq!(store.generation(), after_put);
        assert!(store.remove("a").is_some());
        assert!(store.generation() > after_put);
    }

    #[test]
    fn test_classify() {
        let mut store = VectorStore::empty("store.json");
        let a = record("a", vec![1.0, 0.0]);
        let fingerprint = a.fingerprint.clone();
        store.put(a).unwrap();

        assert_eq!(
            store.classify("a", &fingerprint, "test-model"),
            DocumentState::Fresh
        );
        assert_eq!(
            store.classify("a", &Fingerprint::of_bytes(b"changed"), "test-model"),
            DocumentState::Stale
        );
        assert_eq!(
            store.classify("a", &fingerprint, "other-model"),
            DocumentState::Stale
        );
        assert_eq!(
            store.classify("b", &fingerprint, "test-model"),
            DocumentState::Missing
        );
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut store = VectorStore::empty(&path);
        store.put(record("notes/a.txt", vec![0.5, 0.5])).unwrap();
        store.put(record("b.md", vec![1.0, 0.0])).unwrap();
        store.persist().await.unwrap();
        assert!(!store.is_dirty());

        let loaded = VectorStore::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimension(), Some(2));
        assert_eq!(loaded.model(), Some("test-model"));
        assert_eq!(loaded.get("notes/a.txt"), store.get("notes/a.txt"));
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::load(dir.path().join("store.json"))
            .await
            .unwrap();
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_garbage_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = VectorStore::load(&path).await.unwrap_err();
        assert!(matches!(err, CacheError::CorruptStore { .. }));

        let store = VectorStore::load_or_empty(&path).await;
        assert!(store.is_empty());
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_unknown_version_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, br#"{"version": 99, "records": {}}"#).unwrap();

        let err = VectorStore::load(&path).await.unwrap_err();
        assert!(matches!(err, CacheError::CorruptStore { .. }));
    }

    #[tokio::test]
    async fn test_wrong_length_record_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut store = VectorStore::empty(&path);
        store.put(record("a", vec![1.0, 0.0, 0.0])).unwrap();
        store.put(record("b", vec![0.0, 1.0, 0.0])).unwrap();
        store.persist().await.unwrap();

        let mut json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        json["records"]["b"]["vector"] = serde_json::json!([1.0, 2.0]);
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let loaded = VectorStore::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.is_quarantined("b"));
        let fingerprint = Fingerprint::of_bytes(b"b");
        assert_eq!(
            loaded.classify("b", &fingerprint, "test-model"),
            DocumentState::Corrupt
        );
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_memory_state() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let mut store = VectorStore::empty(blocker.join("store.json"));
        store.put(record("a", vec![1.0])).unwrap();

        let err = store.persist().await.unwrap_err();
        assert!(matches!(err, CacheError::Persist { .. }));
        assert!(store.is_dirty());
        assert!(store.contains("a"));
    }
}
