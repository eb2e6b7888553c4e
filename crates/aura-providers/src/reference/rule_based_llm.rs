//! A deterministic, offline LLM stand-in used by tests and the Free tier
//! when no real LLM is configured.

use std::time::Duration;

use async_trait::async_trait;
use aura_types::{CapabilityManifest, ProviderCategory, Tier};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{DraftedScript, LlmProvider, ScriptRequest, ScriptScene};

pub struct RuleBasedLlmProvider {
    manifest: CapabilityManifest,
}

impl RuleBasedLlmProvider {
    pub fn new() -> Self {
        Self {
            manifest: CapabilityManifest {
                name: "rule-based".to_string(),
                category: ProviderCategory::Llm,
                tier: Tier::Free,
                online_required: false,
                supports_streaming: false,
                supports_cancellation: true,
                soft_timeout: Duration::from_secs(30),
            },
        }
    }
}

impl Default for RuleBasedLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// How many scenes to draft per density setting, chosen so `sparse` reads
/// as a handful of beats and `dense` approaches one scene every few
/// seconds for short clips.
fn scene_count_for(target_duration_secs: u32, density_hint: &str) -> u32 {
    let base = match density_hint {
        "sparse" => target_duration_secs / 15,
        "dense" => target_duration_secs / 5,
        _ => target_duration_secs / 8,
    };
    base.clamp(1, 60)
}

#[async_trait]
impl LlmProvider for RuleBasedLlmProvider {
    fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    async fn draft_script(&self, request: &ScriptRequest) -> ProviderResult<DraftedScript> {
        if request.topic.trim().is_empty() {
            return Err(ProviderError::new(
                aura_types::ErrorCode::InvalidProviderOutput,
                &self.manifest.name,
                "topic is empty, cannot draft a script",
            ));
        }

        let scene_count = scene_count_for(request.target_duration_secs, "balanced");
        let mut scenes = Vec::with_capacity(scene_count as usize);
        let mut full_text = String::new();

        for i in 0..scene_count {
            let heading = format!("Scene {}: {}", i + 1, request.topic);
            let narration_line = format!(
                "In this part, we explore {} for {}, keeping a {} tone.",
                request.topic, request.audience, request.tone
            );
            full_text.push_str(&format!("## {}\n{}\n\n", heading, narration_line));
            scenes.push(ScriptScene {
                heading,
                narration_line,
            });
        }

        Ok(DraftedScript { full_text, scenes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drafts_at_least_one_scene() {
        let provider = RuleBasedLlmProvider::new();
        let request = ScriptRequest {
            topic: "Quick Start".into(),
            audience: "beginners".into(),
            goal: "teach".into(),
            tone: "friendly".into(),
            language: "English".into(),
            style: "explainer".into(),
            target_duration_secs: 10,
        };
        let script = provider.draft_script(&request).await.unwrap();
        assert!(!script.scenes.is_empty());
        assert!(script.full_text.contains("Quick Start"));
    }

    #[tokio::test]
    async fn rejects_empty_topic() {
        let provider = RuleBasedLlmProvider::new();
        let request = ScriptRequest {
            topic: "   ".into(),
            audience: "x".into(),
            goal: "x".into(),
            tone: "x".into(),
            language: "English".into(),
            style: "x".into(),
            target_duration_secs: 10,
        };
        assert!(provider.draft_script(&request).await.is_err());
    }
}
