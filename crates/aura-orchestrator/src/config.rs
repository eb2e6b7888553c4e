//! Engine-wide configuration: a `Default` plus a `from_env()` override
//! layer, covering every tunable named in the job-submission wire format.

use std::collections::HashMap;
use std::time::Duration;

use aura_resilience::RetryConfig;
use aura_types::{RequestedTier, Stage};

/// Per-stage retry tuning, the `{max_attempts, base_delay_ms, max_delay_ms}`
/// triple the `retry_defaults` names.
#[derive(Debug, Clone)]
pub struct StageRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl StageRetryConfig {
    fn into_retry_config(self, operation_name: impl Into<String>) -> RetryConfig {
        RetryConfig::new(operation_name)
            .with_max_retries(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
    }
}

impl Default for StageRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

/// Engine-wide configuration (the "Configuration recognized by
/// the core"). One instance shared by every submitted job; a job's own
/// `offline_only`/`requested_tier` always take precedence over these
/// defaults, which only apply when the caller didn't specify them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_offline_only: bool,
    pub default_tier: RequestedTier,
    pub auto_fallback: bool,
    pub max_concurrent_jobs: usize,
    pub graceful_shutdown_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub event_buffer_size: usize,
    pub retry_defaults: HashMap<Stage, StageRetryConfig>,
    pub work_dir: String,
    pub logs_dir: String,
    pub encoder_binary: String,
    /// Consecutive failures a `(stage, provider)` breaker tolerates before
    /// it opens and starts failing fast.
    pub circuit_failure_threshold: u32,
    /// How long an open breaker stays open before allowing a half-open probe.
    pub circuit_recovery_timeout: Duration,
    /// Consecutive half-open successes needed to close a breaker again.
    pub circuit_success_threshold: u32,
}

/// Stage-by-stage retry defaults: 3 attempts for script/visuals, 1 for
/// voice/render.
fn default_retry_defaults() -> HashMap<Stage, StageRetryConfig> {
    let mut defaults = HashMap::new();
    defaults.insert(
        Stage::Script,
        StageRetryConfig {
            max_attempts: 3,
            ..StageRetryConfig::default()
        },
    );
    defaults.insert(
        Stage::Visuals,
        StageRetryConfig {
            max_attempts: 3,
            ..StageRetryConfig::default()
        },
    );
    defaults.insert(
        Stage::Voice,
        StageRetryConfig {
            max_attempts: 1,
            ..StageRetryConfig::default()
        },
    );
    defaults.insert(
        Stage::Render,
        StageRetryConfig {
            max_attempts: 1,
            ..StageRetryConfig::default()
        },
    );
    defaults
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_offline_only: false,
            default_tier: RequestedTier::Free,
            auto_fallback: true,
            max_concurrent_jobs: 4,
            graceful_shutdown_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(10),
            event_buffer_size: 1024,
            retry_defaults: default_retry_defaults(),
            work_dir: "/tmp/aura".to_string(),
            logs_dir: "/tmp/aura/logs".to_string(),
            encoder_binary: "ffmpeg".to_string(),
            circuit_failure_threshold: 5,
            circuit_recovery_timeout: Duration::from_secs(60),
            circuit_success_threshold: 3,
        }
    }
}

/// Overrides one stage's retry tuning from `AURA_RETRY_<STAGE>_{MAX_ATTEMPTS,
/// BASE_DELAY_MS,MAX_DELAY_MS}`, falling back to whatever `default` already
/// has for that stage when a var is absent.
fn retry_override_for(stage: Stage, env_name: &str, default: &HashMap<Stage, StageRetryConfig>) -> StageRetryConfig {
    let base = default.get(&stage).cloned().unwrap_or_default();
    StageRetryConfig {
        max_attempts: std::env::var(format!("AURA_RETRY_{env_name}_MAX_ATTEMPTS"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(base.max_attempts),
        base_delay_ms: std::env::var(format!("AURA_RETRY_{env_name}_BASE_DELAY_MS"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(base.base_delay_ms),
        max_delay_ms: std::env::var(format!("AURA_RETRY_{env_name}_MAX_DELAY_MS"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(base.max_delay_ms),
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            default_offline_only: std::env::var("AURA_OFFLINE_ONLY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.default_offline_only),
            default_tier: std::env::var("AURA_DEFAULT_TIER")
                .ok()
                .and_then(|s| match s.to_lowercase().as_str() {
                    "free" => Some(RequestedTier::Free),
                    "pro_if_available" | "proifavailable" => Some(RequestedTier::ProIfAvailable),
                    "pro" => Some(RequestedTier::Pro),
                    _ => None,
                })
                .unwrap_or(default.default_tier),
            auto_fallback: std::env::var("AURA_AUTO_FALLBACK")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.auto_fallback),
            max_concurrent_jobs: std::env::var("AURA_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_concurrent_jobs),
            graceful_shutdown_timeout: Duration::from_millis(
                std::env::var("AURA_GRACEFUL_SHUTDOWN_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.graceful_shutdown_timeout.as_millis() as u64),
            ),
            heartbeat_interval: Duration::from_millis(
                std::env::var("AURA_HEARTBEAT_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.heartbeat_interval.as_millis() as u64),
            ),
            event_buffer_size: std::env::var("AURA_EVENT_BUFFER_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.event_buffer_size),
            retry_defaults: HashMap::from([
                (Stage::Script, retry_override_for(Stage::Script, "SCRIPT", &default.retry_defaults)),
                (Stage::Visuals, retry_override_for(Stage::Visuals, "VISUALS", &default.retry_defaults)),
                (Stage::Voice, retry_override_for(Stage::Voice, "VOICE", &default.retry_defaults)),
                (Stage::Render, retry_override_for(Stage::Render, "RENDER", &default.retry_defaults)),
            ]),
            work_dir: std::env::var("AURA_WORK_DIR").unwrap_or(default.work_dir),
            logs_dir: std::env::var("AURA_LOGS_DIR").unwrap_or(default.logs_dir),
            encoder_binary: std::env::var("AURA_ENCODER_BINARY").unwrap_or(default.encoder_binary),
            circuit_failure_threshold: std::env::var("AURA_CIRCUIT_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.circuit_failure_threshold),
            circuit_recovery_timeout: Duration::from_millis(
                std::env::var("AURA_CIRCUIT_RECOVERY_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.circuit_recovery_timeout.as_millis() as u64),
            ),
            circuit_success_threshold: std::env::var("AURA_CIRCUIT_SUCCESS_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.circuit_success_threshold),
        }
    }

    /// Resolve a stage's retry policy, falling back to `StageRetryConfig`'s
    /// default when the caller hasn't overridden it.
    pub fn retry_config_for(&self, stage: Stage, operation_name: impl Into<String>) -> RetryConfig {
        self.retry_defaults
            .get(&stage)
            .cloned()
            .unwrap_or_default()
            .into_retry_config(operation_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_graceful_timeout_matches_the_core_default() {
        assert_eq!(EngineConfig::default().graceful_shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn retry_defaults_match_the_per_stage_table() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_config_for(Stage::Script, "script").max_retries, 3);
        assert_eq!(config.retry_config_for(Stage::Visuals, "visuals").max_retries, 3);
        assert_eq!(config.retry_config_for(Stage::Voice, "voice").max_retries, 1);
        assert_eq!(config.retry_config_for(Stage::Render, "render").max_retries, 1);
    }

    #[test]
    fn retry_config_for_a_stage_with_no_entry_falls_back_to_the_generic_default() {
        let config = EngineConfig::default();
        let retry = config.retry_config_for(Stage::Postprocess, "postprocess");
        assert_eq!(retry.max_retries, StageRetryConfig::default().max_attempts);
    }

    #[test]
    fn default_circuit_tuning_matches_the_breaker_default() {
        let config = EngineConfig::default();
        assert_eq!(config.circuit_failure_threshold, 5);
        assert_eq!(config.circuit_recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.circuit_success_threshold, 3);
    }
}
