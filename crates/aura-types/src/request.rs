//! Request-shaped data: the immutable inputs to a job.

use serde::{Deserialize, Serialize};

/// Target aspect ratio for the rendered video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Widescreen16x9,
    Vertical9x16,
    Square1x1,
}

impl Aspect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::Widescreen16x9 => "widescreen_16x9",
            Aspect::Vertical9x16 => "vertical_9x16",
            Aspect::Square1x1 => "square_1x1",
        }
    }
}

/// The brief: the caller's description of the video to produce. Immutable
/// per job once the job has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub topic: String,
    pub audience: String,
    pub goal: String,
    pub tone: String,
    pub language: String,
    pub aspect: Aspect,
    /// When true, a job with no available TTS provider fails the Voice
    /// stage instead of degrading to silent narration.
    #[serde(default)]
    pub require_narration: bool,
}

/// Pacing of the narration/script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    Fast,
    Conversational,
    Slow,
}

/// Density of information packed into the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Density {
    Sparse,
    Balanced,
    Dense,
}

/// Planning parameters for the generated video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSpec {
    /// Target duration in seconds. Validated to fall in `[1, 7200]`.
    pub duration_secs: u32,
    pub pacing: Pacing,
    pub density: Density,
    pub style: String,
}

impl PlanSpec {
    pub const MIN_DURATION_SECS: u32 = 1;
    pub const MAX_DURATION_SECS: u32 = 2 * 60 * 60;

    pub fn duration_in_range(&self) -> bool {
        (Self::MIN_DURATION_SECS..=Self::MAX_DURATION_SECS).contains(&self.duration_secs)
    }
}

/// Pause style between narration lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseStyle {
    Short,
    Natural,
    Long,
}

/// Voice/narration synthesis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSpec {
    pub voice_name: String,
    pub rate: f32,
    pub pitch: f32,
    pub pause_style: PauseStyle,
}

impl VoiceSpec {
    pub const RATE_RANGE: (f32, f32) = (0.5, 2.0);
    pub const PITCH_RANGE: (f32, f32) = (0.5, 2.0);

    pub fn rate_in_range(&self) -> bool {
        (Self::RATE_RANGE.0..=Self::RATE_RANGE.1).contains(&self.rate)
    }

    pub fn pitch_in_range(&self) -> bool {
        (Self::PITCH_RANGE.0..=Self::PITCH_RANGE.1).contains(&self.pitch)
    }
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mkv,
    Webm,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "mkv",
            Container::Webm => "webm",
        }
    }
}

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    Vp9,
    Av1,
}

impl VideoCodec {
    /// ffmpeg `-c:v` value.
    pub fn encoder_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Av1 => "libaom-av1",
        }
    }
}

/// Render output parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub container: Container,
    pub video_codec: VideoCodec,
    pub fps: u32,
    pub video_kbps: u32,
    pub audio_kbps: u32,
    /// Quality level, 0..100; higher is better.
    pub quality: u8,
    pub enable_scene_cut: bool,
}

impl RenderSpec {
    pub const MIN_FPS: u32 = 24;
    pub const MAX_FPS: u32 = 120;

    pub fn fps_in_range(&self) -> bool {
        (Self::MIN_FPS..=Self::MAX_FPS).contains(&self.fps)
    }

    pub fn quality_in_range(&self) -> bool {
        self.quality <= 100
    }

    /// GOP size: `2 × fps`.
    pub fn gop(&self) -> u32 {
        2 * self.fps
    }
}

/// Requested provider tier for a submission (caller's ask; the engine may
/// downgrade it — see `aura-orchestrator::selection`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedTier {
    Free,
    ProIfAvailable,
    Pro,
}
