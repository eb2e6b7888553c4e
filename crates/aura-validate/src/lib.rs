//! Request validation before a job is accepted, and per-stage output
//! validation during the pipeline.

pub mod output;
pub mod pregen;

pub use output::{
    validate_audio, validate_image, validate_script, validate_video, ValidationFailure,
    ValidationOutcome,
};
pub use pregen::{
    check_stage_has_a_provider, estimate_output_bytes, probe_encoder, validate_request,
    EncoderInfo, ValidationIssue, ValidationResult,
};
