//! FFmpeg command construction: a fluent builder over `std::process::Command`
//! with `-progress pipe:2` wired in so stderr carries a parseable progress
//! stream.

use std::path::{Path, PathBuf};

use aura_types::RenderSpec;

/// Builder for a single ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<PathBuf>,
    input_args: Vec<String>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            input_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add a `-i <path>` input, in order. Used once for the concat-demuxer
    /// slideshow input and again for the narration track when present.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn video_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:v").output_arg(format!("{kbps}k"))
    }

    pub fn audio_bitrate_kbps(self, kbps: u32) -> Self {
        self.output_arg("-b:a").output_arg(format!("{kbps}k"))
    }

    pub fn fps(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    /// GOP size, fixed at `2 * fps`.
    pub fn gop(self, gop: u32) -> Self {
        self.output_arg("-g").output_arg(gop.to_string())
    }

    pub fn pix_fmt_yuv420p(self) -> Self {
        self.output_arg("-pix_fmt").output_arg("yuv420p")
    }

    /// Forces a keyframe at every GOP boundary instead of relying on the
    /// encoder's own scene-change heuristic, matching `render.enable_scene_cut`.
    pub fn force_scene_cut_keyframes(self, gop: u32, fps: u32) -> Self {
        self.output_arg("-sc_threshold")
            .output_arg("0")
            .output_arg("-force_key_frames")
            .output_arg(format!("expr:gte(t,n_forced*{})", gop as f64 / fps as f64))
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());
        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Build the ffmpeg command for the Render stage from a resolved concat
/// list (the slideshow input, written by the caller) and an optional
/// narration audio track.
pub fn build_render_command(
    concat_list: &Path,
    narration_audio: Option<&Path>,
    render: &RenderSpec,
    output: &Path,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output)
        .input_arg("-f")
        .input_arg("concat")
        .input_arg("-safe")
        .input_arg("0")
        .input(concat_list);

    if let Some(audio) = narration_audio {
        cmd = cmd.input(audio).output_arg("-shortest");
    }

    cmd = cmd
        .video_filter(format!("scale={}:{}", render.width, render.height))
        .video_codec(render.video_codec.encoder_name())
        .fps(render.fps)
        .gop(render.gop())
        .pix_fmt_yuv420p()
        .video_bitrate_kbps(render.video_kbps)
        .audio_codec("aac")
        .audio_bitrate_kbps(render.audio_kbps);

    if render.enable_scene_cut {
        cmd = cmd.force_scene_cut_keyframes(render.gop(), render.fps);
    }

    cmd
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

    #[test]
    fn command_carries_gop_and_pix_fmt() {
        let cmd = build_render_command(Path::new("list.txt"), None, &render_spec(), Path::new("out.mp4"));
        let args = cmd.build_args();
        assert!(args.contains(&"-g".to_string()));
        assert!(args.contains(&"60".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
        assert!(args.contains(&"-progress".to_string()));
        assert!(args.contains(&"pipe:2".to_string()));
    }

    #[test]
    fn scene_cut_flag_adds_forced_keyframes() {
        let mut spec = render_spec();
        spec.enable_scene_cut = true;
        let cmd = build_render_command(Path::new("list.txt"), None, &spec, Path::new("out.mp4"));
        let args = cmd.build_args();
        assert!(args.contains(&"-force_key_frames".to_string()));
    }

    #[test]
    fn narration_track_is_appended_as_a_second_input() {
        let cmd = build_render_command(
            Path::new("list.txt"),
            Some(Path::new("narration.wav")),
            &render_spec(),
            Path::new("out.mp4"),
        );
        let args = cmd.build_args();
        assert!(args.iter().any(|a| a.contains("narration.wav")));
    }
}
