//! A provider that generates a minimal valid PNG, used for the
//! "no image provider available" graceful-degradation path and by tests
//! as the Free-tier default.

use std::time::Duration;

use async_trait::async_trait;
use aura_types::{CapabilityManifest, ProviderCategory, Tier};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{GeneratedImage, ImageProvider};

pub struct PlaceholderImageProvider {
    manifest: CapabilityManifest,
}

impl PlaceholderImageProvider {
    pub fn new() -> Self {
        Self {
            manifest: CapabilityManifest {
                name: "placeholder".to_string(),
                category: ProviderCategory::Image,
                tier: Tier::Free,
                online_required: false,
                supports_streaming: false,
                supports_cancellation: true,
                soft_timeout: Duration::from_secs(20),
            },
        }
    }
}

impl Default for PlaceholderImageProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// The smallest valid 1x1 black PNG, large enough to satisfy the image
/// output validator's signature + minimum-size checks.
const MINIMAL_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53,
    0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0x60, 0x60, 0x60, 0x00,
    0x00, 0x00, 0x04, 0x00, 0x01, 0xA3, 0x0E, 0xFA, 0xAD, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E,
    0x44, 0xAE, 0x42, 0x60, 0x82,
];

#[async_trait]
impl ImageProvider for PlaceholderImageProvider {
    fn manifest(&self) -> &CapabilityManifest {
        &self.manifest
    }

    async fn generate_scene_image(
        &self,
        scene_heading: &str,
        _scene_prompt: &str,
    ) -> ProviderResult<GeneratedImage> {
        let path = std::env::temp_dir().join(format!(
            "aura-placeholder-{}-{}.png",
            sanitize(scene_heading),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&path, MINIMAL_PNG).await.map_err(|e| {
            ProviderError::new(
                aura_types::ErrorCode::GenericProviderFailure,
                &self.manifest.name,
                format!("failed to write placeholder image: {e}"),
            )
        })?;

        Ok(GeneratedImage {
            path: path.to_string_lossy().to_string(),
        })
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_a_valid_png_signature() {
        let provider = PlaceholderImageProvider::new();
        let image = provider
            .generate_scene_image("Scene 1", "a placeholder")
            .await
            .unwrap();
        let bytes = tokio::fs::read(&image.path).await.unwrap();
        assert_eq!(&bytes[0..8], &MINIMAL_PNG[0..8]);
        tokio::fs::remove_file(&image.path).await.ok();
    }
}
