//! The Render stage's real provider: assembles a concat-demuxer slideshow
//! from a `Timeline`, drives ffmpeg through it, and reports progress. The
//! child process is registered with a shared [`ProcessSupervisor`] instead
//! of being owned directly, so the shutdown path can reach it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use aura_process::{CleanupScope, ProcessSupervisor};
use aura_providers::error::{ProviderError, ProviderResult};
use aura_providers::traits::{ProgressSink, RenderProgress, VideoEncoderProvider};
use aura_types::{CapabilityManifest, ErrorCode, ProviderCategory, Tier, Timeline};
use aura_types::RenderSpec;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use which::which;

use crate::command::build_render_command;
use crate::log::EncoderLogWriter;
use crate::progress::{parse_progress_line, FfmpegProgress};

pub const PROVIDER_NAME: &str = "ffmpeg-local";

/// Remediation strings attached to a render failure, per the encoder log's
/// footer and the job-level `Failure.suggested_actions`.
pub fn suggested_actions(container_codec_mismatch: bool) -> Vec<String> {
    let mut actions = vec![
        "verify the ffmpeg installation (run `ffmpeg -version`)".to_string(),
        "retry with the software encoder (libx264) if a hardware encoder was selected".to_string(),
    ];
    if container_codec_mismatch {
        actions.push("check that the selected codec is supported by the chosen container".to_string());
    }
    actions
}

pub struct FfmpegVideoEncoderProvider {
    manifest: CapabilityManifest,
    supervisor: ProcessSupervisor,
    work_dir: PathBuf,
    logs_dir: PathBuf,
}

impl FfmpegVideoEncoderProvider {
    /// Probes for `ffmpeg` on `PATH`; returns `None` (not an error) when
    /// absent so the caller can simply omit this provider from the
    /// registry rather than registering one that will always fail.
    pub fn detect(supervisor: ProcessSupervisor, work_dir: PathBuf, logs_dir: PathBuf) -> Option<Self> {
        which("ffmpeg").ok()?;
        Some(Self {
            manifest: CapabilityManifest {
                name: PROVIDER_NAME.to_string(),
                category: ProviderCategory::VideoEncoder,
                tier: Tier::Local,
                online_required: false,
                supports_streaming: true,
                supports_cancellation: true,
                soft_timeout: Duration::from_secs(1800),
            },
            supervisor,
            work_dir,
            logs_dir,
        })
    }

    fn job_scratch_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    async fn write_concat_list(&self, timeline: &Timeline, scratch: &Path) -> std::io::Result<PathBuf> {
        let mut body = String::new();
        for scene in &timeline.scenes {
            let Some(asset) = scene.assets.first() else {
                continue;
            };
            body.push_str(&format!("file '{}'\n", asset.path.replace('\'', "'\\''")));
            body.push_str(&format!("duration {}\n", scene.duration_secs));
        }
        // The concat demuxer repeats the final file once more without a
        // duration line, or it drops the last entry's requested length.
        if let Some(last) = timeline.scenes.iter().rev().find(|s| !s.assets.is_empty()) {
            body.push_str(&format!("file '{}'\n", last.assets[0].path.replace('\'', "'\\''")));
        }

        let list_path = scratch.join("concat.txt");
        tokio::fs::write(&list_path, body).await?;
        Ok(list_path)
    }
}

#[async_trait]
impl VideoEncoderProvider for FfmpegVideoEncoderProvider {
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
        let job_id = uuid_like_tag();
        let scratch = self.job_scratch_dir(&job_id);
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| self.io_error(&e))?;

        let cleanup = CleanupScope::new(format!("render-{job_id}"));
        cleanup.register_temp(&scratch);

        let result = self
            .render_inner(timeline, render_spec, &scratch, &progress, &cancel, &job_id)
            .await;

        match &result {
            Ok(output_path) => cleanup.transfer_out(Path::new(output_path)),
            Err(_) => {}
        }
        cleanup.close().await;

        result
    }
}

impl FfmpegVideoEncoderProvider {
    #[allow(clippy::too_many_arguments)]
    async fn render_inner(
        &self,
        timeline: &Timeline,
        render_spec: &RenderSpec,
        scratch: &Path,
        progress: &ProgressSink,
        cancel: &CancellationToken,
        job_id: &str,
    ) -> ProviderResult<String> {
        let concat_list = self
            .write_concat_list(timeline, scratch)
            .await
            .map_err(|e| self.io_error(&e))?;

        let narration_audio = timeline
            .scenes
            .iter()
            .find_map(|s| s.narration_path.as_ref())
            .map(PathBuf::from);

        let output_path = scratch.join(format!("output.{}", render_spec.container.extension()));
        let cmd = build_render_command(
            &concat_list,
            narration_audio.as_deref(),
            render_spec,
            &output_path,
        );
        let args = cmd.build_args();
        let command_line = format!("ffmpeg {}", args.join(" "));

        tokio::fs::create_dir_all(&self.logs_dir)
            .await
            .map_err(|e| self.io_error(&e))?;
        let log_path = crate::log::encoder_log_path(&self.logs_dir, job_id);
        let mut log_writer = EncoderLogWriter::create(
            &log_path,
            job_id,
            job_id,
            &format!("{}x{}", render_spec.width, render_spec.height),
            &command_line,
        )
        .await
        .map_err(|e| self.io_error(&e))?;

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.io_error(&e))?;

        let stderr = child.stderr.take().expect("stderr was piped");
        let token = self.supervisor.register("ffmpeg-render", child);

        let total_duration_ms = (timeline.total_duration_secs() * 1000.0) as i64;
        let mut reader = BufReader::new(stderr).lines();
        let mut accumulator = FfmpegProgress::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.supervisor.terminate(token, Duration::from_secs(5)).await;
                    log_writer.finish(None).await.ok();
                    return Err(ProviderError::new(
                        ErrorCode::Timeout,
                        PROVIDER_NAME,
                        "render canceled",
                    )
                    .with_retryable(false));
                }
                line = reader.next_line() => {
                    match line {
                        Ok(Some(text)) => {
                            log_writer.write_line("stderr", &text).await.ok();
                            if let Some(snapshot) = parse_progress_line(&text, &mut accumulator) {
                                let _ = progress.send(RenderProgress {
                                    percentage: snapshot.percentage(total_duration_ms).round() as u8,
                                    elapsed_secs: snapshot.out_time_ms as f64 / 1000.0,
                                    eta_secs: snapshot.eta_seconds(total_duration_ms),
                                    current_stage: "render".to_string(),
                                });
                                if snapshot.is_complete {
                                    break;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "failed reading ffmpeg stderr");
                            break;
                        }
                    }
                }
            }
        }

        let entry = self.supervisor.wait(token).await;
        let exit_code = entry.and_then(|e| e.exit_code);
        log_writer.finish(exit_code).await.ok();

        match exit_code {
            Some(0) => {
                info!(job_id, "render completed");
                Ok(output_path.to_string_lossy().into_owned())
            }
            other => {
                let snippet = std::fs::read_to_string(&log_path).unwrap_or_default();
                let tail: String = snippet.chars().rev().take(2000).collect::<Vec<_>>().into_iter().rev().collect();
                Err(ProviderError::new(
                    ErrorCode::EncoderRuntime,
                    PROVIDER_NAME,
                    format!(
                        "ffmpeg exited with {:?}. remediation: {}. log tail: {}",
                        other,
                        suggested_actions(false).join("; "),
                        tail,
                    ),
                ))
            }
        }
    }

    fn io_error(&self, e: &std::io::Error) -> ProviderError {
        ProviderError::new(ErrorCode::EncoderRuntime, PROVIDER_NAME, e.to_string())
    }
}

fn uuid_like_tag() -> String {
    uuid::Uuid::new_v4().to_string()
}
