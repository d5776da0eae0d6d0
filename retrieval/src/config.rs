//! Configuration for the document manager.

use std::path::{Path, PathBuf};

use docvec_corpus::CorpusConfig;
use docvec_embeddings::RetryPolicy;
use docvec_embeddings::similarity::validate_threshold;
use docvec_vector_cache::{CacheConfig, OrphanPolicy, default_store_path};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RetrievalError};

/// Configuration for a docvec corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Document discovery.
    pub corpus: CorpusConfig,

    /// Store file; defaults to `<root>/.docvec/store.json`.
    pub store_path: Option<PathBuf>,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Cache behaviour.
    pub cache: CacheSettings,

    /// Search defaults.
    pub search: SearchConfig,

    /// Chat configuration.
    pub chat: ChatConfig,
}

impl RetrievalConfig {
    /// Create a new configuration for the corpus at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            corpus: CorpusConfig::new(root),
            store_path: None,
            embedding: EmbeddingConfig::default(),
            cache: CacheSettings::default(),
            search: SearchConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    /// Load a TOML file. Relative paths inside it resolve against the
    /// file's directory.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&content)?;

        if let Some(base) = path.parent() {
            if config.corpus.root.is_relative() {
                config.corpus.root = base.join(&config.corpus.root);
            }
            if let Some(store_path) = config.store_path.as_mut() {
                if store_path.is_relative() {
                    *store_path = base.join(&*store_path);
                }
            }
        }

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Platform default location of the configuration file.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("docvec").join("config.toml"))
    }

    /// Set the store path.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the embedding provider.
    pub fn with_provider(mut self, provider: EmbeddingProviderType) -> Self {
        self.embedding.provider = provider;
        self
    }

    /// Set the chat configuration.
    pub fn with_chat(mut self, config: ChatConfig) -> Self {
        self.chat = config;
        self
    }

    /// Resolved store path.
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| default_store_path(&self.corpus.root))
    }

    /// Settings for the cache manager.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_max_concurrency(self.embedding.max_concurrency)
            .with_orphan_policy(self.cache.orphan_policy)
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.search.default_threshold)?;
        validate_threshold(self.chat.threshold)?;
        if self.embedding.max_concurrency == 0 {
            return Err(RetrievalError::Config(
                "embedding.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.embedding.dimensions == Some(0) {
            return Err(RetrievalError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        self.corpus.compile_excludes()?;
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new("documents")
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to use for embeddings.
    pub model: Option<String>,

    /// API base URL override.
    pub base_url: Option<String>,

    /// Requested vector length.
    pub dimensions: Option<usize>,

    /// Retry policy for provider calls.
    pub retry: RetryPolicy,

    /// Provider calls in flight at once.
    pub max_concurrency: usize,

    /// Characters of document text sent to the provider.
    pub max_input_chars: Option<usize>,

    /// Free-text query embeddings kept in memory.
    pub query_cache_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: None,
            base_url: None,
            dimensions: None,
            retry: RetryPolicy::default(),
            max_concurrency: 4,
            max_input_chars: Some(24_000),
            query_cache_entries: 256,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Offline feature hashing.
    Hashing,
}

/// Cache behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// What happens to records of deleted documents.
    pub orphan_policy: OrphanPolicy,
}

/// Search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Threshold used when a search gives none.
    pub default_threshold: f32,

    /// Maximum number of results to return.
    pub max_results: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.7,
            max_results: None,
        }
    }
}

/// Configuration for retrieval-augmented chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Chat completion model.
    pub model: String,

    /// API base URL override.
    pub base_url: Option<String>,

    /// Minimum similarity for a document to be used as context.
    pub threshold: f32,

    /// Documents passed to the model per question.
    pub max_context_documents: usize,

    /// Characters of each document passed to the model.
    pub max_context_chars: usize,

    /// Question/answer pairs remembered by a session.
    pub max_history_turns: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            threshold: 0.3,
            max_context_documents: 3,
            max_context_chars: 4000,
            max_history_turns: 10,
        }
    }
}
