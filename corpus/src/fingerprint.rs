//! Content fingerprints used to detect stale embeddings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::{CorpusError, Result};

/// Digest of a document's bytes.
///
/// Modification times are not part of the fingerprint, so touching a file
/// without changing its bytes keeps its embedding fresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hex-encoded SHA-256 of the raw bytes.
    pub sha256: String,

    /// Size in bytes.
    pub size: u64,
}

impl Fingerprint {
    /// Fingerprint an in-memory buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            sha256: hex::encode(hasher.finalize()),
            size: bytes.len() as u64,
        }
    }

    /// Abbreviated digest for display.
    pub fn short(&self) -> &str {
        let end = self.sha256.len().min(12);
        &self.sha256[..end]
    }
}

/// Fingerprint the file at `path`.
pub async fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let bytes = fs::read(path).await.map_err(|source| CorpusError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Fingerprint::of_bytes(&bytes))
}
