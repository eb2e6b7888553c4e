//! Pre-generation validation: the single pass run before a job is
//! accepted, covering spec shape, provider availability, encoder
//! reachability, and disk headroom.

use std::path::Path;
use std::process::Stdio;

use aura_types::{Aspect, Brief, PlanSpec, RenderSpec, VoiceSpec};
use once_cell::sync::OnceCell;
use tokio::process::Command;
use tracing::warn;

/// A single validation problem severe enough to reject the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub reason: String,
}

/// Outcome of a pre-generation pass. `warnings` never block job creation;
/// `issues` do.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            is_valid: true,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn push_issue(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.is_valid = false;
        self.issues.push(ValidationIssue {
            field: field.into(),
            reason: reason.into(),
        });
    }

    fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Encoder version info probed once and cached for the process lifetime.
#[derive(Debug, Clone)]
pub struct EncoderInfo {
    pub binary_path: String,
    pub version_line: String,
}

static ENCODER_INFO: OnceCell<Result<EncoderInfo, String>> = OnceCell::new();

/// Check the configured encoder binary is reachable and responds to a
/// version probe, caching the result for the process lifetime.
pub async fn probe_encoder(binary_name: &str) -> Result<EncoderInfo, String> {
    if let Some(cached) = ENCODER_INFO.get() {
        return cached.clone();
    }

    let result = probe_encoder_uncached(binary_name).await;
    let _ = ENCODER_INFO.set(result.clone());
    result
}

async fn probe_encoder_uncached(binary_name: &str) -> Result<EncoderInfo, String> {
    let path = which::which(binary_name).map_err(|_| format!("{binary_name} not found on PATH"))?;

    let output = Command::new(&path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("failed to run {binary_name} -version: {e}"))?;

    let version_line = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();

    Ok(EncoderInfo {
        binary_path: path.to_string_lossy().to_string(),
        version_line,
    })
}

/// Estimate, in bytes, a lower bound on output size for disk-headroom
/// checks: `width * height * fps * duration * codec_factor`, the same
/// heuristic point 4 names.
pub fn estimate_output_bytes(render: &RenderSpec, duration_secs: u32) -> u64 {
    const CODEC_FACTOR_BYTES_PER_PIXEL_SECOND: f64 = 0.02;
    let pixels = render.width as f64 * render.height as f64;
    let estimate =
        pixels * render.fps as f64 * duration_secs as f64 * CODEC_FACTOR_BYTES_PER_PIXEL_SECOND;
    estimate.max(0.0) as u64
}

fn check_available_space(working_volume: &Path, needed_bytes: u64) -> Result<(), String> {
    let available = fs2::available_space(working_volume)
        .map_err(|e| format!("failed to read available disk space: {e}"))?;
    if available < needed_bytes {
        return Err(format!(
            "only {available} bytes free on working volume, estimated output needs {needed_bytes} bytes"
        ));
    }
    Ok(())
}

/// Provider-availability check: does at least one registered provider
/// exist, for this category, honoring the effective tier/offline policy?
/// Takes a closure rather than a concrete registry type so `aura-validate`
/// has no dependency on `aura-orchestrator`'s selection engine.
pub fn check_stage_has_a_provider(
    stage_name: &str,
    has_eligible_provider: bool,
    result: &mut ValidationResult,
) {
    if !has_eligible_provider {
        result.push_issue(
            stage_name,
            format!("no provider is available for stage '{stage_name}' under the effective tier/offline policy"),
        );
    }
}

fn check_brief(brief: &Brief, result: &mut ValidationResult) {
    if brief.topic.trim().is_empty() {
        result.push_issue("brief.topic", "topic must not be empty");
    }
    if brief.audience.trim().is_empty() {
        result.push_issue("brief.audience", "audience must not be empty");
    }
    if brief.goal.trim().is_empty() {
        result.push_issue("brief.goal", "goal must not be empty");
    }
    if brief.language.trim().is_empty() {
        result.push_issue("brief.language", "language must not be empty");
    }
    let _ = Aspect::Widescreen16x9; // aspect is a closed enum, nothing further to validate.
}

fn check_plan(plan: &PlanSpec, result: &mut ValidationResult) {
    if !plan.duration_in_range() {
        result.push_issue(
            "plan.duration_secs",
            format!(
                "duration_secs must be in [{}, {}]",
                PlanSpec::MIN_DURATION_SECS,
                PlanSpec::MAX_DURATION_SECS
            ),
        );
    }
    if plan.style.trim().is_empty() {
        result.push_issue("plan.style", "style must not be empty");
    }
}

fn check_voice(voice: &VoiceSpec, result: &mut ValidationResult) {
    if !voice.rate_in_range() {
        result.push_issue("voice.rate", "rate out of range");
    }
    if !voice.pitch_in_range() {
        result.push_issue("voice.pitch", "pitch out of range");
    }
    if voice.voice_name.trim().is_empty() {
        result.push_issue("voice.voice_name", "voice_name must not be empty");
    }
}

fn check_render(render: &RenderSpec, result: &mut ValidationResult) {
    if !render.fps_in_range() {
        result.push_issue(
            "render.fps",
            format!(
                "fps must be in [{}, {}]",
                RenderSpec::MIN_FPS,
                RenderSpec::MAX_FPS
            ),
        );
    }
    if !render.quality_in_range() {
        result.push_issue("render.quality", "quality must be in [0, 100]");
    }
    if render.width == 0 || render.height == 0 {
        result.push_issue("render.width/height", "width and height must be non-zero");
    }
}

/// Run the full four-point pre-generation pass.
/// `has_eligible_provider` is supplied per stage by the caller (the
/// orchestrator, which owns the provider registries); `working_volume` is
/// the filesystem root jobs write scratch data under.
pub async fn validate_request(
    brief: &Brief,
    plan: &PlanSpec,
    voice: &VoiceSpec,
    render: &RenderSpec,
    encoder_binary: &str,
    working_volume: &Path,
    providers_available: &[(&str, bool)],
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    check_brief(brief, &mut result);
    check_plan(plan, &mut result);
    check_voice(voice, &mut result);
    check_render(render, &mut result);

    for (stage_name, available) in providers_available {
        check_stage_has_a_provider(stage_name, *available, &mut result);
    }

    match probe_encoder(encoder_binary).await {
        Ok(info) => {
            tracing::debug!(binary = %info.binary_path, version = %info.version_line, "encoder reachable");
        }
        Err(reason) => {
            result.push_issue("encoder", reason);
        }
    }

    let estimated_bytes = estimate_output_bytes(render, plan.duration_secs);
    if let Err(reason) = check_available_space(working_volume, estimated_bytes) {
        warn!(reason = %reason, "disk headroom check failed, proceeding with a warning");
        result.push_warning(reason);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_types::{Container, Density, Pacing, PauseStyle, VideoCodec};

    fn sample_brief() -> Brief {
        Brief {
            topic: "Rust ownership".into(),
            audience: "beginners".into(),
            goal: "teach".into(),
            tone: "friendly".into(),
            language: "English".into(),
            aspect: Aspect::Widescreen16x9,
            require_narration: false,
        }
    }

    fn sample_plan() -> PlanSpec {
        PlanSpec {
            duration_secs: 60,
            pacing: Pacing::Conversational,
            density: Density::Balanced,
            style: "explainer".into(),
        }
    }

    fn sample_voice() -> VoiceSpec {
        VoiceSpec {
            voice_name: "default".into(),
            rate: 1.0,
            pitch: 1.0,
            pause_style: PauseStyle::Natural,
        }
    }

    fn sample_render() -> RenderSpec {
        RenderSpec {
            width: 1280,
            height: 720,
            container: Container::Mp4,
            video_codec: VideoCodec::H264,
            fps: 30,
            video_kbps: 4000,
            audio_kbps: 128,
            quality: 75,
            enable_scene_cut: false,
        }
    }

    #[test]
    fn empty_brief_topic_is_an_issue() {
        let mut brief = sample_brief();
        brief.topic = "   ".into();
        let mut result = ValidationResult::ok();
        check_brief(&brief, &mut result);
        assert!(!result.is_valid);
        assert_eq!(result.issues[0].field, "brief.topic");
    }

    #[test]
    fn out_of_range_duration_is_an_issue() {
        let mut plan = sample_plan();
        plan.duration_secs = 0;
        let mut result = ValidationResult::ok();
        check_plan(&plan, &mut result);
        assert!(!result.is_valid);
    }

    #[test]
    fn missing_provider_for_a_stage_is_an_issue() {
        let mut result = ValidationResult::ok();
        check_stage_has_a_provider("script", false, &mut result);
        assert!(!result.is_valid);
        assert_eq!(result.issues[0].field, "script");
    }

    #[test]
    fn estimate_scales_with_resolution_and_duration() {
        let render = sample_render();
        let short = estimate_output_bytes(&render, 10);
        let long = estimate_output_bytes(&render, 100);
        assert!(long > short);
    }

    #[tokio::test]
    async fn valid_request_with_all_providers_passes() {
        let tmp = tempfile::tempdir().unwrap();
        let result = validate_request(
            &sample_brief(),
            &sample_plan(),
            &sample_voice(),
            &sample_render(),
            "definitely-not-a-real-encoder-binary",
            tmp.path(),
            &[("script", true), ("voice", true), ("visuals", true)],
        )
        .await;
        // The fake encoder binary name guarantees an issue here, proving
        // the reachability check actually runs and is wired into the result.
        assert!(!result.is_valid);
        assert!(result.issues.iter().any(|i| i.field == "encoder"));
    }
}
