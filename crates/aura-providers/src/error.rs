//! Typed provider-call errors.

use aura_types::ErrorCode;

/// The result of a single provider invocation, classified so the retry/
/// fallback machinery in `aura-resilience`/`aura-orchestrator` can decide
/// whether to consume retry budget or advance the chain immediately.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider_name}: {message} ({code})", code = self.kind.code())]
pub struct ProviderError {
    pub kind: ErrorCode,
    pub retryable: bool,
    pub provider_name: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorCode, provider_name: impl Into<String>, message: impl Into<String>) -> Self {
        let retryable = kind.is_retryable_by_default();
        Self {
            kind,
            retryable,
            provider_name: provider_name.into(),
            message: message.into(),
        }
    }

    /// Override the default retryability for this particular occurrence
    /// (e.g. an auth error is normally non-retryable, but some providers
    /// wrap transient 401s from an expiring token).
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
