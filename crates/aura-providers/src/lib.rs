//! Provider category traits, the write-once registry that holds them, and
//! the offline reference implementations each registry falls back to.

pub mod error;
pub mod reference;
pub mod registry;
pub mod traits;

pub use error::{ProviderError, ProviderResult};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use traits::{
    DraftedScript, GeneratedImage, ImageProvider, LlmProvider, NarrationLine, ProgressSink,
    RenderProgress, ScriptRequest, ScriptScene, SynthesizedAudio, TtsProvider,
    VideoEncoderProvider,
};
