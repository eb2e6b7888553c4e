//! The four provider category traits: LLM, TTS, Image, VideoEncoder.
//!
//! Each is `Send + Sync` and returns a boxed future via `#[async_trait]` so
//! the registry can hold heterogeneous providers behind `Arc<dyn Trait>`,
//! with dynamic dispatch across providers of differing concrete types.

use async_trait::async_trait;
use aura_types::{CapabilityManifest, RenderSpec, Timeline};

use crate::error::ProviderResult;

/// A single scene heading + narration cue handed to the LLM during
/// script drafting; kept deliberately small since the Script stage only
/// needs drafted prose back, not a structured scene graph.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub topic: String,
    pub audience: String,
    pub goal: String,
    pub tone: String,
    pub language: String,
    pub style: String,
    pub target_duration_secs: u32,
}

/// Drafted script, chunked into scene-labelled sections so downstream
/// stages can assign narration/visuals per scene.
#[derive(Debug, Clone)]
pub struct DraftedScript {
    pub full_text: String,
    pub scenes: Vec<ScriptScene>,
}

#[derive(Debug, Clone)]
pub struct ScriptScene {
    pub heading: String,
    pub narration_line: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn manifest(&self) -> &CapabilityManifest;

    async fn draft_script(&self, request: &ScriptRequest) -> ProviderResult<DraftedScript>;
}

/// One synthesized line of narration.
#[derive(Debug, Clone)]
pub struct NarrationLine {
    pub text: String,
    pub scene_index: u32,
}

/// Output of a TTS call: a single audio file covering all lines, plus the
/// per-line offsets so Compose can slice it per scene.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub path: String,
    pub line_offsets_secs: Vec<f64>,
}

#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn manifest(&self) -> &CapabilityManifest;

    async fn synthesize(
        &self,
        lines: &[NarrationLine],
        rate: f32,
        pitch: f32,
    ) -> ProviderResult<SynthesizedAudio>;
}

/// A single generated/fetched visual asset for one scene.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub path: String,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn manifest(&self) -> &CapabilityManifest;

    async fn generate_scene_image(
        &self,
        scene_heading: &str,
        scene_prompt: &str,
    ) -> ProviderResult<GeneratedImage>;
}

/// Progress update emitted by the encoder while it runs.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    pub percentage: u8,
    pub elapsed_secs: f64,
    pub eta_secs: Option<f64>,
    pub current_stage: String,
}

/// Sink the orchestrator passes down so the encoder can report progress
/// without depending on the job store directly.
pub type ProgressSink = tokio::sync::mpsc::UnboundedSender<RenderProgress>;

#[async_trait]
pub trait VideoEncoderProvider: Send + Sync {
    fn manifest(&self) -> &CapabilityManifest;

    async fn render(
        &self,
        timeline: &Timeline,
        render_spec: &RenderSpec,
        progress: ProgressSink,
        cancel: tokio_util::sync::CancellationToken,
    ) -> ProviderResult<String>;
}
