//! Parses ffmpeg's `-progress pipe:2` key=value stream.

/// One snapshot of ffmpeg's self-reported progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f64,
    pub out_time_ms: i64,
    pub out_time: String,
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / total_duration_ms as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn eta_seconds(&self, total_duration_ms: i64) -> Option<f64> {
        if self.speed <= 0.0 || total_duration_ms <= 0 {
            return None;
        }
        let remaining_ms = (total_duration_ms - self.out_time_ms).max(0) as f64;
        Some(remaining_ms / 1000.0 / self.speed)
    }
}

/// Folds a single `key=value` line from ffmpeg's progress pipe into
/// `current`. Returns `Some` only once a full "progress" block has been
/// seen (`progress=continue` or `progress=end`), matching ffmpeg's own
/// framing of one block per output line.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();

    match key {
        "frame" => current.frame = value.parse().unwrap_or(current.frame),
        "fps" => current.fps = value.parse().unwrap_or(current.fps),
        "out_time_ms" | "out_time_us" => {
            current.out_time_ms = value.parse().unwrap_or(current.out_time_ms)
        }
        "out_time" => current.out_time = value.to_string(),
        "speed" => {
            let trimmed = value.trim_end_matches('x');
            current.speed = trimmed.parse().unwrap_or(current.speed);
        }
        "progress" => {
            current.is_complete = value == "end";
            let snapshot = current.clone();
            *current = FfmpegProgress::default();
            return Some(snapshot);
        }
        _ => {}
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_full_progress_block_yields_one_snapshot() {
        let mut current = FfmpegProgress::default();
        assert!(parse_progress_line("frame=120", &mut current).is_none());
        assert!(parse_progress_line("fps=30.0", &mut current).is_none());
        assert!(parse_progress_line("out_time_ms=4000000", &mut current).is_none());
        assert!(parse_progress_line("speed=1.5x", &mut current).is_none());
        let snapshot = parse_progress_line("progress=continue", &mut current).unwrap();
        assert_eq!(snapshot.frame, 120);
        assert_eq!(snapshot.out_time_ms, 4_000_000);
        assert_eq!(snapshot.speed, 1.5);
        assert!(!snapshot.is_complete);
    }

    #[test]
    fn progress_end_marks_completion_and_resets_accumulator() {
        let mut current = FfmpegProgress::default();
        parse_progress_line("out_time_ms=8000000", &mut current);
        let snapshot = parse_progress_line("progress=end", &mut current).unwrap();
        assert!(snapshot.is_complete);
        assert_eq!(current, FfmpegProgress::default());
    }

    #[test]
    fn percentage_and_eta_track_the_configured_duration() {
        let progress = FfmpegProgress {
            out_time_ms: 5_000,
            speed: 2.0,
            ..Default::default()
        };
        assert_eq!(progress.percentage(10_000), 50.0);
        assert_eq!(progress.eta_seconds(10_000), Some(2.5));
    }
}
