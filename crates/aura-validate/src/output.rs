//! Per-stage output validators: read the first N bytes of a produced file
//! and match known magic numbers to confirm the container format is what
//! the render stage claims it is.

use aura_providers::ProviderError;
use aura_types::{Container, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationFailure(pub String);

impl ValidationFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    /// Invalid outputs consume retry budget for the producing provider
    /// before the fallback chain advances.
    pub fn into_provider_error(self, provider_name: &str) -> ProviderError {
        ProviderError::new(ErrorCode::InvalidOutputStructure, provider_name, self.0)
    }
}

pub type ValidationOutcome = Result<(), ValidationFailure>;

const MIN_AUDIO_BYTES: u64 = 44; // a bare WAV header with no samples
const MIN_IMAGE_BYTES: u64 = 16;

/// Non-empty, printable, and containing at least one scene marker for the
/// declared style. `scene_marker` is the
/// caller-supplied heading prefix the drafting style uses (e.g. `"## "`).
pub fn validate_script(text: &str, scene_marker: &str) -> ValidationOutcome {
    if text.trim().is_empty() {
        return Err(ValidationFailure::new("script is empty"));
    }
    if !text.chars().all(|c| !c.is_control() || c.is_whitespace()) {
        return Err(ValidationFailure::new(
            "script contains non-printable characters",
        ));
    }
    if !text.contains(scene_marker) {
        return Err(ValidationFailure::new(format!(
            "script contains no scene marker ('{scene_marker}') for the declared style"
        )));
    }
    Ok(())
}

async fn file_len(path: &str) -> Result<u64, ValidationFailure> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| ValidationFailure::new(format!("{path} does not exist or is unreadable: {e}")))
}

async fn read_prefix(path: &str, n: usize) -> Result<Vec<u8>, ValidationFailure> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ValidationFailure::new(format!("{path} does not exist or is unreadable: {e}")))?;
    let mut buf = vec![0u8; n];
    let read = file
        .read(&mut buf)
        .await
        .map_err(|e| ValidationFailure::new(format!("failed to read {path}: {e}")))?;
    buf.truncate(read);
    Ok(buf)
}

fn has_riff_wave_header(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// File exists, non-trivial size, valid container header for the declared
/// format.
pub async fn validate_audio(path: &str) -> ValidationOutcome {
    let len = file_len(path).await?;
    if len < MIN_AUDIO_BYTES {
        return Err(ValidationFailure::new(format!(
            "audio file is only {len} bytes, below the {MIN_AUDIO_BYTES}-byte minimum"
        )));
    }
    let prefix = read_prefix(path, 12).await?;
    if !has_riff_wave_header(&prefix) {
        return Err(ValidationFailure::new(
            "audio file does not have a valid RIFF/WAVE header",
        ));
    }
    Ok(())
}

fn matches_image_signature(bytes: &[u8]) -> bool {
    const JPEG: [u8; 3] = [0xFF, 0xD8, 0xFF];
    const PNG: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];
    bytes.starts_with(&JPEG)
        || bytes.starts_with(&PNG)
        || (bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
}

/// File exists, size above minimum, first bytes match JPEG/PNG/WebP
/// signatures.
pub async fn validate_image(path: &str) -> ValidationOutcome {
    let len = file_len(path).await?;
    if len < MIN_IMAGE_BYTES {
        return Err(ValidationFailure::new(format!(
            "image file is only {len} bytes, below the {MIN_IMAGE_BYTES}-byte minimum"
        )));
    }
    let prefix = read_prefix(path, 16).await?;
    if !matches_image_signature(&prefix) {
        return Err(ValidationFailure::new(
            "image file does not match a known JPEG/PNG/WebP signature",
        ));
    }
    Ok(())
}

fn matches_container_signature(container: Container, bytes: &[u8]) -> bool {
    match container {
        Container::Mp4 => bytes.len() >= 8 && &bytes[4..8] == b"ftyp",
        Container::Webm => bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
        Container::Mkv => bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
    }
}

/// File exists, size above a threshold proportional to duration×bitrate,
/// first bytes match the declared container's signature.
pub async fn validate_video(
    path: &str,
    container: Container,
    duration_secs: f64,
    total_kbps: u32,
) -> ValidationOutcome {
    let len = file_len(path).await?;
    let expected_min_bytes = ((duration_secs * total_kbps as f64 * 1000.0 / 8.0) * 0.1) as u64;
    if len < expected_min_bytes.max(64) {
        return Err(ValidationFailure::new(format!(
            "video file is only {len} bytes, below the expected minimum of {expected_min_bytes} bytes for a {duration_secs}s render at {total_kbps}kbps"
        )));
    }
    let prefix = read_prefix(path, 16).await?;
    if !matches_container_signature(container, &prefix) {
        return Err(ValidationFailure::new(format!(
            "video file does not match the {container:?} container signature"
        )));
    }
    Ok(())
}
