//! Configuration for corpus discovery.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::file_type;
use crate::error::{CorpusError, Result};

/// Name of the directory inside the corpus root that holds docvec's own state.
pub const STATE_DIR: &str = ".docvec";

/// Configuration for a document corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Root directory of the corpus.
    pub root: PathBuf,

    /// File extensions (without the dot, lowercase) that count as documents.
    pub extensions: Vec<String>,

    /// Patterns to exclude (glob patterns, matched against the path
    /// relative to the root).
    pub exclude_patterns: Vec<String>,

    /// Maximum depth to recurse (None = unlimited).
    pub max_depth: Option<usize>,

    /// Whether to follow symbolic links.
    pub follow_symlinks: bool,

    /// Files larger than this are skipped during scans.
    pub max_file_bytes: Option<u64>,
}

impl CorpusConfig {
    /// Create a new corpus config rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Self::default_extensions(),
            exclude_patterns: Self::default_excludes(),
            max_depth: None,
            follow_symlinks: false,
            max_file_bytes: Some(10 * 1024 * 1024),
        }
    }

    /// Replace the accepted extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Set the maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Enable following symbolic links.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    /// Directory holding docvec state for this corpus.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn default_extensions() -> Vec<String> {
        ["txt", "md", "markdown", "rst", "csv", "json", "html"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_excludes() -> Vec<String> {
        vec![
            format!("**/{STATE_DIR}/**"),
            // Version control
            "**/.git/**".to_string(),
            "**/.svn/**".to_string(),
            "**/.hg/**".to_string(),
            // IDE/Editor
            "**/.idea/**".to_string(),
            "**/.vscode/**".to_string(),
            "**/*.swp".to_string(),
            "**/*~".to_string(),
            // System files
            "**/.DS_Store".to_string(),
            "**/Thumbs.db".to_string(),
            // Temporary files
            "**/*.tmp".to_string(),
        ]
    }

    /// Compile the exclude patterns, rejecting invalid ones.
    pub fn compile_excludes(&self) -> Result<Vec<glob::Pattern>> {
        self.exclude_patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| CorpusError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Check whether a file extension is accepted.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        file_type(path).is_some_and(|ext| self.extensions.contains(&ext))
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self::new("documents")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extensions_are_normalised() {
        let config = CorpusConfig::new("/corpus").with_extensions([".TXT", "md"]);
        assert_eq!(config.extensions, vec!["txt".to_string(), "md".to_string()]);
        assert!(config.accepts_extension(Path::new("/corpus/a.Txt")));
        assert!(!config.accepts_extension(Path::new("/corpus/a.pdf")));
        assert!(!config.accepts_extension(Path::new("/corpus/README")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = CorpusConfig::new("/corpus").exclude("[unterminated");
        assert!(matches!(
            config.compile_excludes(),
            Err(CorpusError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_state_dir_is_excluded_by_default() {
        let config = CorpusConfig::new("/corpus");
        let patterns = config.compile_excludes().unwrap();
        assert!(patterns.iter().any(|p| p.matches(".docvec/store.json")));
        assert!(patterns.iter().any(|p| p.matches("notes/.git/HEAD")));
        assert!(!patterns.iter().any(|p| p.matches("notes/today.md")));
    }
}
