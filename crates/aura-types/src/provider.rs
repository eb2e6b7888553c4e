//! Provider tiering and capability metadata.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Quality/cost class a provider is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Local,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Local => "local",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The pipeline category a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCategory {
    Llm,
    Tts,
    Image,
    VideoEncoder,
}

impl ProviderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderCategory::Llm => "llm",
            ProviderCategory::Tts => "tts",
            ProviderCategory::Image => "image",
            ProviderCategory::VideoEncoder => "video_encoder",
        }
    }
}

/// Static capability manifest every registered provider exposes, independent
/// of the concrete category trait it implements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub name: String,
    pub category: ProviderCategory,
    pub tier: Tier,
    pub online_required: bool,
    pub supports_streaming: bool,
    pub supports_cancellation: bool,
    /// Soft timeout for a single call to this provider. An elapsed soft
    /// timeout is treated as a retryable `ErrorCode::Timeout`, distinct from
    /// a job's (absent-by-default) overall deadline.
    pub soft_timeout: Duration,
}
