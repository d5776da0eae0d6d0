//! # Corpus
//!
//! Discovers the documents of a local corpus and derives what the embedding
//! cache needs to know about each of them.
//!
//! ## Features
//!
//! - **Scanning**: Walk the corpus root, honouring extension filters and
//!   exclusion patterns
//! - **Identity**: Stable `DocumentId`s derived from the path relative to the root
//! - **Fingerprints**: Content digests used to detect stale embeddings
//! - **Extraction**: Turn a document file into the text that gets embedded
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Corpus                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  CorpusConfig ──► CorpusScanner ──► Document                    │
//! │                                        │                        │
//! │                                        ▼                        │
//! │                         Fingerprint / TextExtractor             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod fingerprint;
pub mod scanner;

pub use config::CorpusConfig;
pub use document::{Document, DocumentId, file_type};
pub use error::{CorpusError, Result};
pub use extraction::{PlainTextExtractor, TextExtractor, truncate_chars};
pub use fingerprint::{Fingerprint, fingerprint};
pub use scanner::{CorpusScanner, ScanResult, SkippedFile};
