//! Bounded retry around an embedding provider.
//!
//! [`RetryingEmbedder`] is the only way the rest of docvec calls a provider.
//! It rejects empty input up front, retries `RateLimited` and
//! `ProviderUnavailable` failures with exponential backoff, and checks the
//! returned vector against the dimension the caller expects.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay, including provider hints.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial and maximum backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Doubles from `initial_backoff_ms`; a provider `retry-after` hint raises
    /// the delay but never past `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        let hinted = hint.map_or(0, |h| h.as_millis() as u64);
        Duration::from_millis(exponential.max(hinted).min(self.max_backoff_ms))
    }
}

/// Provider adapter with retry, input checks and dimension validation.
pub struct RetryingEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    model: Option<String>,
    dimensions: Option<usize>,
}

impl RetryingEmbedder {
    /// Wrap `provider` with `policy`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            model: None,
            dimensions: None,
        }
    }

    /// Request a specific model instead of the provider default.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Ask the provider for vectors of this many dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Model used for requests.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn request(&self, text: &str) -> EmbeddingRequest {
        let mut request = EmbeddingRequest::new(text).with_model(self.model());
        if let Some(dimensions) = self.dimensions {
            request = request.with_dimensions(dimensions);
        }
        request
    }

    /// Embed `text`, retrying transient failures.
    ///
    /// When `expected_dimension` is set, a vector of any other length fails
    /// with `DimensionMismatch`.
    pub async fn embed(
        &self,
        text: &str,
        expected_dimension: Option<usize>,
    ) -> Result<EmbeddingResponse> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let mut attempt = 0u32;
        loop {
            match self.provider.embed(self.request(text)).await {
                Ok(response) => return validate(response, expected_dimension),
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let hint = match &e {
                        EmbeddingError::RateLimited {
                            retry_after_secs: Some(secs),
                        } => Some(Duration::from_secs(*secs)),
                        _ => None,
                    };
                    let delay = self.policy.backoff_for(attempt, hint);
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Embedding call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(
                        provider = self.provider.name(),
                        attempts = attempt + 1,
                        error = %e,
                        "Embedding call failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

fn validate(
    response: EmbeddingResponse,
    expected_dimension: Option<usize>,
) -> Result<EmbeddingResponse> {
    let actual = response.embedding.len();
    if actual == 0 {
        return Err(EmbeddingError::InvalidResponse(
            "provider returned an empty vector".to_string(),
        ));
    }
    if let Some(expected) = expected_dimension {
        if actual != expected {
            return Err(EmbeddingError::DimensionMismatch { expected, actual });
        }
    }
    Ok(response)
}
