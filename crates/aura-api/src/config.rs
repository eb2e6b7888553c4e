//! HTTP surface configuration: host/port/CORS/rate-limit knobs, with an
//! environment-variable override layer over sensible defaults.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_rps: u32,
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            host: std::env::var("AURA_API_HOST").unwrap_or(default.host),
            port: std::env::var("AURA_API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.port),
            cors_origins: std::env::var("AURA_CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.cors_origins),
            rate_limit_rps: std::env::var("AURA_RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.rate_limit_rps),
            request_timeout: Duration::from_secs(
                std::env::var("AURA_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default.request_timeout.as_secs()),
            ),
            max_body_size: std::env::var("AURA_MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(default.environment),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
