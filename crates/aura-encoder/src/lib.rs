//! The Render stage's ffmpeg adapter: command construction, child
//! process supervision, stderr progress parsing, and per-job logging.

pub mod command;
pub mod composer;
pub mod log;
pub mod progress;

pub use command::{build_render_command, FfmpegCommand};
pub use composer::{suggested_actions, FfmpegVideoEncoderProvider, PROVIDER_NAME};
pub use progress::{parse_progress_line, FfmpegProgress};
