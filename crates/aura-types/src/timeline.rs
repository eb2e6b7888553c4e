//! The immutable `Timeline` built by the Compose stage and consumed by the
//! Render stage.

use serde::{Deserialize, Serialize};

/// A single visual/narration asset placed on the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAsset {
    pub path: String,
    /// True when no image provider was available and this is a generated
    /// placeholder.
    pub is_placeholder: bool,
}

/// One scene: a slice of the timeline with its own assets and narration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub index: u32,
    pub heading: String,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub assets: Vec<SceneAsset>,
    /// Path to the narration audio slice for this scene, if narration ran.
    pub narration_path: Option<String>,
    pub subtitle_text: Option<String>,
}

/// Ordered, deterministic sequence of scenes, snapped to the render spec's
/// frame rate. Built once by the Compose stage; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub scenes: Vec<Scene>,
    pub fps: u32,
}

impl Timeline {
    pub fn total_duration_secs(&self) -> f64 {
        self.scenes
            .iter()
            .map(|s| s.start_secs + s.duration_secs)
            .fold(0.0, f64::max)
    }
}
