//! Offline, dependency-free reference providers for all four categories.
//! These are what a job runs against when no real provider is configured —
//! the Free tier default and the backbone of the scenario tests.

mod mock_encoder;
mod null_tts;
mod placeholder_image;
mod rule_based_llm;

pub use mock_encoder::MockVideoEncoderProvider;
pub use null_tts::NullTtsProvider;
pub use placeholder_image::PlaceholderImageProvider;
pub use rule_based_llm::RuleBasedLlmProvider;
