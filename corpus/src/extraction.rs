//! Text extraction from document files.
//!
//! Rich formats (PDF, images, Office documents) are handled by external
//! extractors plugged in through [`TextExtractor`]; this crate ships the
//! plain-text one.

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::document::Document;
use crate::error::{CorpusError, Result};

/// Turns a document file into the text that gets embedded.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the text content of `document`.
    async fn extract(&self, document: &Document) -> Result<String>;
}

/// Reads documents as UTF-8 text, replacing invalid sequences.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor {
    max_chars: Option<usize>,
}

impl PlainTextExtractor {
    /// Create a new plain-text extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate extracted text to at most `max_chars` characters.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, document: &Document) -> Result<String> {
        let bytes = fs::read(&document.source_path)
            .await
            .map_err(|source| CorpusError::Read {
                path: document.source_path.clone(),
                source,
            })?;

        if bytes.contains(&0) {
            return Err(CorpusError::Unsupported {
                path: document.source_path.clone(),
                reason: "binary content".to_string(),
            });
        }

        let text = String::from_utf8_lossy(&bytes);
        match self.max_chars {
            Some(max) if text.chars().nth(max).is_some() => {
                debug!("Truncated {} to {max} characters", document.id);
                Ok(truncate_chars(&text, max).to_string())
            }
            _ => Ok(text.into_owned()),
        }
    }
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_doc(dir: &TempDir, name: &str, bytes: &[u8]) -> Document {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        Document::new(dir.path(), path).unwrap()
    }

    #[tokio::test]
    async fn test_extract_plain_text() {
        let dir = TempDir::new().unwrap();
        let doc = write_doc(&dir, "a.txt", "héllo wörld".as_bytes());

        let text = PlainTextExtractor::new().extract(&doc).await.unwrap();
        assert_eq!(text, "héllo wörld");
    }

    #[tokio::test]
    async fn test_truncates_on_char_boundary() {
        let dir = TempDir::new().unwrap();
        let doc = write_doc(&dir, "a.txt", "héllo wörld".as_bytes());

        let text = PlainTextExtractor::new()
            .with_max_chars(4)
            .extract(&doc)
            .await
            .unwrap();
        assert_eq!(text, "héll");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("hi", 2), "hi");
    }

    #[tokio::test]
    async fn test_binary_content_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let doc = write_doc(&dir, "a.txt", &[0x89, 0x50, 0x00, 0x47]);

        let result = PlainTextExtractor::new().extract(&doc).await;
        assert!(matches!(result, Err(CorpusError::Unsupported { .. })));
    }
}
