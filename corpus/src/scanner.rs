//! Corpus scanning.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::document::Document;
use crate::error::{CorpusError, Result};

/// Walks a corpus root and yields its documents.
pub struct CorpusScanner {
    /// Canonical root directory.
    root: PathBuf,

    /// Compiled exclude patterns.
    excludes: Vec<glob::Pattern>,

    /// Configuration.
    config: CorpusConfig,
}

impl CorpusScanner {
    /// Create a scanner, validating the root and exclude patterns.
    pub fn new(config: CorpusConfig) -> Result<Self> {
        let root = std::fs::canonicalize(&config.root)
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| CorpusError::RootNotFound(config.root.clone()))?;
        let excludes = config.compile_excludes()?;

        Ok(Self {
            root,
            excludes,
            config,
        })
    }

    /// Canonical corpus root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration this scanner was built from.
    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    /// Check if a path relative to the root should be excluded.
    pub fn should_exclude(&self, relative: &Path) -> bool {
        let relative = relative.to_string_lossy().replace('\\', "/");
        self.excludes.iter().any(|p| p.matches(&relative))
    }

    /// Check that a file of `size` bytes at `path` would be indexed.
    ///
    /// `path` must be canonical and inside the root; it need not exist yet.
    /// The rules are the ones [`scan`](Self::scan) applies.
    pub fn admits(&self, path: &Path, size: u64) -> Result<()> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| CorpusError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })?;
        match self.rejection(path, relative, || size) {
            None => Ok(()),
            Some(rejection) => Err(CorpusError::Unsupported {
                path: path.to_path_buf(),
                reason: rejection.to_string(),
            }),
        }
    }

    fn rejection(
        &self,
        path: &Path,
        relative: &Path,
        size: impl FnOnce() -> u64,
    ) -> Option<Rejection> {
        if self.should_exclude(relative) {
            return Some(Rejection::Excluded);
        }
        if !self.config.accepts_extension(path) {
            return Some(Rejection::FileType);
        }
        if let Some(max_depth) = self.config.max_depth {
            if relative.components().count() > max_depth {
                return Some(Rejection::TooDeep);
            }
        }
        if let Some(limit) = self.config.max_file_bytes {
            let size = size();
            if size > limit {
                return Some(Rejection::TooLarge { size, limit });
            }
        }
        None
    }

    /// Build the document for a file inside the corpus root.
    pub fn document_for(&self, path: &Path) -> Result<Document> {
        let canonical = std::fs::canonicalize(path).map_err(|source| CorpusError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Document::new(&self.root, canonical)
    }

    /// Walk the corpus and collect every document.
    pub fn scan(&self) -> Result<ScanResult> {
        let start = std::time::Instant::now();
        let mut documents = Vec::new();
        let mut skipped = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .max_depth(self.config.max_depth.unwrap_or(usize::MAX));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let size = || entry.metadata().map(|m| m.len()).unwrap_or(0);
            match self.rejection(path, relative, size) {
                None => {}
                Some(rejection @ Rejection::TooLarge { .. }) => {
                    debug!("Skipping {}: {rejection}", path.display());
                    skipped.push(SkippedFile {
                        path: path.to_path_buf(),
                        reason: rejection.to_string(),
                    });
                    continue;
                }
                Some(_) => continue,
            }

            documents.push(Document::new(&self.root, path)?);
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));

        let duration = start.elapsed();
        info!(
            "Scanned {} documents in {:?} ({} skipped)",
            documents.len(),
            duration,
            skipped.len()
        );

        Ok(ScanResult {
            documents,
            skipped,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

/// Why a file is not part of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Excluded,
    FileType,
    TooDeep,
    TooLarge { size: u64, limit: u64 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excluded => f.write_str("excluded by configuration"),
            Self::FileType => f.write_str("file type is not indexed"),
            Self::TooDeep => f.write_str("nested deeper than the configured depth"),
            Self::TooLarge { size, limit } => {
                write!(f, "file too large: {size} bytes > {limit}")
            }
        }
    }
}

/// A file the scanner passed over.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    /// Path to the file.
    pub path: PathBuf,

    /// Why it was skipped.
    pub reason: String,
}

/// Result of a corpus scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Documents found, sorted by id.
    pub documents: Vec<Document>,

    /// Files skipped because they were unreadable or too large.
    pub skipped: Vec<SkippedFile>,

    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentId;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn ids(result: &ScanResult) -> Vec<DocumentId> {
        result.documents.iter().map(|d| d.id.clone()).collect()
    }

    #[test]
    fn test_scan_finds_documents() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("notes")).unwrap();
        fs::write(temp_dir.path().join("b.txt"), "b").unwrap();
        fs::write(temp_dir.path().join("notes/a.md"), "a").unwrap();
        fs::write(temp_dir.path().join("image.png"), "png").unwrap();

        let scanner = CorpusScanner::new(CorpusConfig::new(temp_dir.path())).unwrap();
        let result = scanner.scan().unwrap();

        assert_eq!(
            ids(&result),
            vec![DocumentId::from("b.txt"), DocumentId::from("notes/a.md")]
        );
    }

    #[test]
    fn test_scan_skips_state_dir_and_excludes() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join(".docvec")).unwrap();
        fs::create_dir_all(temp_dir.path().join("drafts")).unwrap();
        fs::write(temp_dir.path().join(".docvec/store.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("drafts/wip.txt"), "wip").unwrap();
        fs::write(temp_dir.path().join("keep.txt"), "keep").unwrap();

        let config = CorpusConfig::new(temp_dir.path()).exclude("drafts/**");
        let scanner = CorpusScanner::new(config).unwrap();
        let result = scanner.scan().unwrap();

        assert_eq!(ids(&result), vec![DocumentId::from("keep.txt")]);
    }

    #[test]
    fn test_scan_skips_large_files() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("big.txt"), "x".repeat(64)).unwrap();
        fs::write(temp_dir.path().join("small.txt"), "x").unwrap();

        let mut config = CorpusConfig::new(temp_dir.path());
        config.max_file_bytes = Some(16);
        let result = CorpusScanner::new(config).unwrap().scan().unwrap();

        assert_eq!(ids(&result), vec![DocumentId::from("small.txt")]);
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn test_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = CorpusConfig::new(temp_dir.path().join("nope"));
        assert!(matches!(
            CorpusScanner::new(config),
            Err(CorpusError::RootNotFound(_))
        ));
    }

    #[test]
    fn test_admits_applies_scan_rules() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CorpusConfig::new(temp_dir.path()).exclude("drafts/**");
        config.max_file_bytes = Some(16);
        let scanner = CorpusScanner::new(config).unwrap();
        let root = scanner.root().to_path_buf();

        assert!(scanner.admits(&root.join("notes/a.txt"), 4).is_ok());
        for (path, size) in [
            (root.join("drafts/wip.txt"), 4),
            (root.join(".docvec/store.json"), 4),
            (root.join("image.png"), 4),
            (root.join("big.txt"), 64),
        ] {
            assert!(
                matches!(
                    scanner.admits(&path, size),
                    Err(CorpusError::Unsupported { .. })
                ),
                "{} was admitted",
                path.display()
            );
        }
        assert!(matches!(
            scanner.admits(Path::new("/elsewhere/a.txt"), 4),
            Err(CorpusError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn test_document_for_path_inside_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();

        let scanner = CorpusScanner::new(CorpusConfig::new(temp_dir.path())).unwrap();
        let doc = scanner.document_for(&temp_dir.path().join("a.txt")).unwrap();
        assert_eq!(doc.id, DocumentId::from("a.txt"));
    }
}
