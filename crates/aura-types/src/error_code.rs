//! The E3xx error taxonomy, shared by provider errors, job
//! failure payloads, and the external API surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// E300 — generic provider failure.
    GenericProviderFailure,
    /// E301 — timeout or cancellation at a provider.
    Timeout,
    /// E302 — provider returned empty/invalid output.
    InvalidProviderOutput,
    /// E303 — input validation (enum or range).
    InvalidInput,
    /// E304 — encoder runtime failure.
    EncoderRuntime,
    /// E305 — no provider available for a stage under policy.
    NoProviderAvailable,
    /// E306 — authentication/credential failure.
    AuthFailure,
    /// E307 — offline-mode policy violation.
    OfflinePolicyViolation,
    /// E308 — rate limit.
    RateLimit,
    /// E309 — output structure invalid.
    InvalidOutputStructure,
    /// E310 — content policy violation.
    ContentPolicyViolation,
    /// E311 — insufficient resources.
    InsufficientResources,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::GenericProviderFailure => "E300",
            ErrorCode::Timeout => "E301",
            ErrorCode::InvalidProviderOutput => "E302",
            ErrorCode::InvalidInput => "E303",
            ErrorCode::EncoderRuntime => "E304",
            ErrorCode::NoProviderAvailable => "E305",
            ErrorCode::AuthFailure => "E306",
            ErrorCode::OfflinePolicyViolation => "E307",
            ErrorCode::RateLimit => "E308",
            ErrorCode::InvalidOutputStructure => "E309",
            ErrorCode::ContentPolicyViolation => "E310",
            ErrorCode::InsufficientResources => "E311",
        }
    }

    /// Whether an error of this kind should consume retry budget before the
    /// fallback chain advances.
    pub fn is_retryable_by_default(&self) -> bool {
        matches!(
            self,
            ErrorCode::GenericProviderFailure
                | ErrorCode::Timeout
                | ErrorCode::InvalidProviderOutput
                | ErrorCode::InvalidOutputStructure
                | ErrorCode::RateLimit
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_policy_errors_are_not_retryable_by_default() {
        assert!(!ErrorCode::AuthFailure.is_retryable_by_default());
        assert!(!ErrorCode::OfflinePolicyViolation.is_retryable_by_default());
        assert!(!ErrorCode::InvalidInput.is_retryable_by_default());
    }

    #[test]
    fn transient_errors_are_retryable_by_default() {
        assert!(ErrorCode::Timeout.is_retryable_by_default());
        assert!(ErrorCode::GenericProviderFailure.is_retryable_by_default());
    }
}
