//! A `VideoEncoderProvider` that fakes rendering without shelling out to a
//! real encoder binary — used by scenario tests so they don't
//! depend on `ffmpeg` being installed on the test runner.

use std::time::Duration;

use async_trait::async_trait;
use aura_types::{CapabilityManifest, ProviderCategory, RenderSpec, Tier, Timeline};
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{ProgressSink, RenderProgress, VideoEncoderProvider};

pub struct MockVideoEncoderProvider {
    manifest: CapabilityManifest,
    /// Number of simulated progress ticks; kept small so tests run fast.
    ticks: u32,
}

impl MockVideoEncoderProvider {
    pub fn new() -> Self {
        Self {
            manifest: CapabilityManifest {
                name: "mock".to_string(),
                category: ProviderCategory::VideoEncoder,
                tier: Tier::Free,
                online_required: false,
                supports_streaming: true,
                supports_cancellation: true,
                soft_timeout: Duration::from_secs(300),
            },
            ticks: 5,
        }
    }

    pub fn with_ticks(mut self, ticks: u32) -> Self {
        self.ticks = ticks.max(1);
        self
    }
}

impl Default for MockVideoEncoderProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// The smallest ISO-BMFF atom sequence that reads as an mp4 container
/// signature (`ftyp` box) to the output validator.
fn fake_mp4_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x18]); // box size
    bytes.extend_from_slice(b"ftyp");
    bytes.extend_from_slice(b"isom");
    bytes.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
    bytes.extend_from_slice(b"isomiso2avc1mp41");
    bytes.resize(bytes.len() + 4096, 0);
    bytes
}

#[async_trait]
impl VideoEncoderProvider for MockVideoEncoderProvider {
    fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    async fn render(
        &self,
        timeline: &Timeline,
        render_spec: &RenderSpec,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> ProviderResult<String> {
        let total_secs = timeline.total_duration_secs().max(0.1);

        for tick in 1..=self.ticks {
            if cancel.is_cancelled() {
                return Err(ProviderError::new(
                    aura_types::ErrorCode::Timeout,
                    &self.manifest.name,
                    "render canceled",
                )
                .with_retryable(false));
            }

            let pct = ((tick as f64 / self.ticks as f64) * 100.0) as u8;
            let _ = progress.send(RenderProgress {
                percentage: pct,
                elapsed_secs: total_secs * (tick as f64 / self.ticks as f64),
                eta_secs: Some(total_secs * (1.0 - tick as f64 / self.ticks as f64)),
                current_stage: "encoding".to_string(),
            });

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                _ = cancel.cancelled() => {
                    return Err(ProviderError::new(
                        aura_types::ErrorCode::Timeout,
                        &self.manifest.name,
                        "render canceled",
                    )
                    .with_retryable(false));
                }
            }
        }

        let path = std::env::temp_dir().join(format!(
            "aura-mock-render-{}.{}",
            uuid::Uuid::new_v4(),
            render_spec.container.extension()
        ));
        tokio::fs::write(&path, fake_mp4_bytes()).await.map_err(|e| {
            ProviderError::new(
                aura_types::ErrorCode::EncoderRuntime,
                &self.manifest.name,
                format!("failed to write mock render output: {e}"),
            )
        })?;

        Ok(path.to_string_lossy().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_types::{Container, VideoCodec};

    fn render_spec() -> RenderSpec {
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

    #[tokio::test]
    async fn renders_to_a_file_reporting_terminal_progress() {
        let provider = MockVideoEncoderProvider::new().with_ticks(2);
        let timeline = Timeline {
            scenes: vec![],
            fps: 30,
        };
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let path = provider
            .render(&timeline, &render_spec(), tx, cancel)
            .await
            .unwrap();

        let mut last = None;
        while let Ok(update) = rx.try_recv() {
            last = Some(update);
        }
        assert_eq!(last.unwrap().percentage, 100);
        assert!(tokio::fs::metadata(&path).await.is_ok());
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn cancellation_stops_the_render() {
        let provider = MockVideoEncoderProvider::new().with_ticks(50);
        let timeline = Timeline {
            scenes: vec![],
            fps: 30,
        };
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = provider.render(&timeline, &render_spec(), tx, cancel).await;
        assert!(result.is_err());
    }
}
