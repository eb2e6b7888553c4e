//! Cross-cutting resilience primitives shared by provider calls: a
//! per-provider circuit breaker and cancellation-aware retry/backoff.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use retry::{retry_with_backoff, FailureTracker, RetryConfig, RetryResult};
