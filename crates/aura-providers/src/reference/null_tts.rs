//! A TTS provider that produces silence. Used whenever no real TTS
//! provider is configured; pairs with the Voice stage's graceful
//! degradation policy.

use std::time::Duration;

use async_trait::async_trait;
use aura_types::{CapabilityManifest, ProviderCategory, Tier};

use crate::error::ProviderResult;
use crate::traits::{NarrationLine, SynthesizedAudio, TtsProvider};

pub struct NullTtsProvider {
    manifest: CapabilityManifest,
}

impl NullTtsProvider {
    pub fn new() -> Self {
        Self {
            manifest: CapabilityManifest {
                name: "null".to_string(),
                category: ProviderCategory::Tts,
                tier: Tier::Free,
                online_required: false,
                supports_streaming: false,
                supports_cancellation: true,
                soft_timeout: Duration::from_secs(30),
            },
        }
    }
}

impl Default for NullTtsProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal valid WAV header for a silent mono track, long enough to pass
/// the audio output validator's "non-trivial size" + "valid container
/// header" checks without shelling out to an encoder.
fn silent_wav_bytes(duration_secs: f64) -> Vec<u8> {
    const SAMPLE_RATE: u32 = 16_000;
    let num_samples = (duration_secs.max(0.1) * SAMPLE_RATE as f64) as u32;
    let data_size = num_samples * 2; // 16-bit mono
    let mut bytes = Vec::with_capacity(44 + data_size as usize);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());
    bytes.resize(bytes.len() + data_size as usize, 0);
    bytes
}

#[async_trait]
impl TtsProvider for NullTtsProvider {
    fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    async fn synthesize(
        &self,
        lines: &[NarrationLine],
        _rate: f32,
        _pitch: f32,
    ) -> ProviderResult<SynthesizedAudio> {
        // One second of silence per line is an arbitrary but deterministic
        // duration estimate; real providers report actual synthesis length.
        let per_line_secs = 1.0;
        let total_secs = (lines.len() as f64) * per_line_secs;
        let bytes = silent_wav_bytes(total_secs.max(per_line_secs));

        let path = std::env::temp_dir().join(format!("aura-silent-{}.wav", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            crate::error::ProviderError::new(
                aura_types::ErrorCode::GenericProviderFailure,
                &self.manifest.name,
                format!("failed to write silent track: {e}"),
            )
        })?;

        let line_offsets_secs = (0..lines.len()).map(|i| i as f64 * per_line_secs).collect();

        Ok(SynthesizedAudio {
            path: path.to_string_lossy().to_string(),
            line_offsets_secs,
        })
    }
}
