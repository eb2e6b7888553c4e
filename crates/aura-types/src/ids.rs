//! Opaque identifiers used across the job engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job, stable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing string (used when re-hydrating from a sidecar file).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Caller-supplied tracing identifier, propagated into every log line and event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Ordering key for events in a job's stream: `{unix_ms}-{counter}`.
///
/// Lexicographic string ordering and numeric `(ms, counter)` ordering agree
/// as long as `ms` never regresses within a job, which the generator in
/// `aura-jobstore::events` guarantees.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(unix_ms: i64, counter: u64) -> Self {
        Self(format!("{}-{}", unix_ms, counter))
    }

    /// Split back into `(ms, counter)`, used by the resume-from-id lookup.
    pub fn parts(&self) -> Option<(i64, u64)> {
        let (ms, counter) = self.0.split_once('-')?;
        Some((ms.parse().ok()?, counter.parse().ok()?))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = InvalidEventId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.to_string());
        if id.parts().is_some() {
            Ok(id)
        } else {
            Err(InvalidEventId(s.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid event id: {0}")]
pub struct InvalidEventId(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_orders_lexicographically_and_numerically() {
        let a = EventId::new(1_000, 3);
        let b = EventId::new(1_000, 10);
        let c = EventId::new(1_001, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.parts(), Some((1_000, 3)));
    }

    #[test]
    fn event_id_parses_from_str() {
        let parsed: EventId = "1700000000000-42".parse().unwrap();
        assert_eq!(parsed.parts(), Some((1_700_000_000_000, 42)));
        assert!("not-an-id".parse::<EventId>().is_err());
    }
}
