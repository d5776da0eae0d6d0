//! Documents and their identities.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, Result};

/// Stable identity of a document within a corpus.
///
/// Derived from the document's path relative to the corpus root, with `/`
/// separators on every platform, so `notes/today.md` names the same
/// document everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create an id from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from a path relative to the corpus root.
    pub fn from_relative_path(relative: &Path) -> Self {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Self(parts.join("/"))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A document on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identity within the corpus.
    pub id: DocumentId,

    /// Full path to the file.
    pub source_path: PathBuf,

    /// Path relative to the corpus root.
    pub relative_path: PathBuf,
}

impl Document {
    /// Create a document for `path`, which must live under `root`.
    pub fn new(root: &Path, path: impl Into<PathBuf>) -> Result<Self> {
        let source_path = path.into();
        let relative_path = source_path
            .strip_prefix(root)
            .map_err(|_| CorpusError::OutsideRoot {
                path: source_path.clone(),
                root: root.to_path_buf(),
            })?
            .to_path_buf();

        Ok(Self {
            id: DocumentId::from_relative_path(&relative_path),
            source_path,
            relative_path,
        })
    }
}

/// Lowercased extension of `path`, used as the document's file type.
pub fn file_type(path: &Path) -> Option<String> {
    path.extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_lowercase)
}
