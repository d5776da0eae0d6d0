//! Per-document async locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use docvec_corpus::DocumentId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map of async mutexes keyed by document id.
///
/// Holding the guard for a document serializes every recompute of that
/// document; different documents never contend. Entries are dropped once
/// no task holds or awaits them.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<DocumentId, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty lock map.
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<DocumentId, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive access to `doc_id`.
    pub async fn lock(&self, doc_id: &DocumentId) -> KeyedLockGuard<'_> {
        let mutex = self.map().entry(doc_id.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyedLockGuard {
            owner: self,
            doc_id: doc_id.clone(),
            _guard: guard,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Exclusive access to one document, released on drop.
pub struct KeyedLockGuard<'a> {
    owner: &'a KeyedLocks,
    doc_id: DocumentId,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyedLockGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.owner.map();
        // The map and this guard hold the only references when nobody waits.
        if map
            .get(&self.doc_id)
            .is_some_and(|mutex| Arc::strong_count(mutex) <= 2)
        {
            map.remove(&self.doc_id);
        }
    }
}
