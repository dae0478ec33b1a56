//! Pluggable code-generation backends.
//!
//! A [`Generator`] turns one prompt into one raw completion. Exactly one
//! backend is chosen per run; the sampler owns retries and sanitization, so
//! implementations make a single attempt per call.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{GenerationRequest, RawCompletion, TokenUsage};

/// Failure of a single generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl GenerationError {
    /// Whether another attempt may succeed. Credentials do not fix themselves.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::Auth(_))
    }

    /// Backoff hint supplied by the backend, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A failed attempt, with whatever tokens were billed before it failed.
///
/// Multi-call backends can fail on a later call after earlier calls were
/// already charged; `usage` carries those tokens so the ledger still
/// counts them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct GenerationFailure {
    pub error: GenerationError,
    pub usage: TokenUsage,
}

impl GenerationFailure {
    pub fn with_usage(error: GenerationError, usage: TokenUsage) -> Self {
        Self { error, usage }
    }
}

impl From<GenerationError> for GenerationFailure {
    fn from(error: GenerationError) -> Self {
        Self::with_usage(error, TokenUsage::default())
    }
}

/// A code-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short backend label used in logs and artifact names.
    fn name(&self) -> &str;

    /// Make one attempt at completing `request.prompt`.
    async fn complete(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<RawCompletion, GenerationFailure>;
}
