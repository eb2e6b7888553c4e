//! Circuit breaker for provider calls.
//!
//! Provides fault tolerance and graceful degradation for unreliable
//! upstream providers, keyed one breaker per `(category, provider_name)`
//! by the caller (usually the selection engine in `aura-orchestrator`).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Clone, Debug, PartialEq)]
pub enum CircuitState {
    /// Circuit is closed (normal operation).
    Closed,
    /// Circuit is open (failing fast).
    Open { opened_at: Instant },
    /// Circuit is half-open (testing recovery).
    HalfOpen { success_count: u32 },
}

/// Circuit breaker for a single provider.
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<RwLock<CircuitState>>,
    failure_count: Arc<AtomicU32>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, success_threshold: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(CircuitState::Closed)),
            failure_count: Arc::new(AtomicU32::new(0)),
            failure_threshold,
            recovery_timeout,
            success_threshold,
        }
    }

    /// Check whether a call is currently allowed through, transitioning
    /// `Open -> HalfOpen` once `recovery_timeout` has elapsed.
    pub fn allow(&self) -> bool {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => true,
            CircuitState::Open { opened_at } => {
                if Instant::now().duration_since(opened_at) > self.recovery_timeout {
                    *state = CircuitState::HalfOpen { success_count: 0 };
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen { .. } => true,
        }
    }

    /// Record a successful call. While `Closed`, resets the consecutive-
    /// failure count back to zero.
    pub fn success(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen { success_count } => {
                let new_count = success_count + 1;
                *state = if new_count >= self.success_threshold {
                    self.failure_count.store(0, Ordering::SeqCst);
                    CircuitState::Closed
                } else {
                    CircuitState::HalfOpen {
                        success_count: new_count,
                    }
                };
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// Record a failed call. While `Closed`, only opens once `failure_count`
    /// reaches `failure_threshold`; a single failure during a `HalfOpen`
    /// probe reopens the circuit immediately.
    pub fn failure(&self) {
        let mut state = self.state.write().unwrap();
        match *state {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.failure_threshold {
                    *state = CircuitState::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            CircuitState::HalfOpen { .. } => {
                self.failure_count.store(0, Ordering::SeqCst);
                *state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
            }
            CircuitState::Open { .. } => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.read().unwrap().clone()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60), 3)
    }
}
