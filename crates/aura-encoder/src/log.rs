//! Per-job encoder log file: header, streamed ffmpeg stderr lines, footer,
//! all appended to a single file per job.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Ring buffer retaining only the last `CAPACITY` bytes of ffmpeg stderr,
/// used for the `stderr_snippet` carried on a render failure so a log line
/// doesn't have to be re-read off disk to build one.
const ENCODER_LOG_TAIL_BYTES: usize = 16 * 1024;

pub fn encoder_log_path(logs_dir: &Path, job_id: &str) -> PathBuf {
    logs_dir.join(format!("{job_id}.log"))
}

pub struct EncoderLogWriter {
    file: BufWriter<File>,
    tail: Vec<u8>,
}

impl EncoderLogWriter {
    pub async fn create(
        path: &Path,
        job_id: &str,
        correlation_id: &str,
        resolution: &str,
        command: &str,
    ) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = File::create(path).await?;
        let mut writer = BufWriter::new(file);

        let header = format!(
            "job_id={job_id} correlation_id={correlation_id} resolution={resolution} started_utc={}\ncommand: {command}\n---\n",
            Utc::now().to_rfc3339(),
        );
        writer.write_all(header.as_bytes()).await?;

        Ok(Self {
            file: writer,
            tail: Vec::new(),
        })
    }

    pub async fn write_line(&mut self, stream: &str, line: &str) -> std::io::Result<()> {
        let entry = format!("[{stream}] {line}\n");
        self.file.write_all(entry.as_bytes()).await?;
        self.push_tail(entry.as_bytes());
        Ok(())
    }

    fn push_tail(&mut self, bytes: &[u8]) {
        self.tail.extend_from_slice(bytes);
        if self.tail.len() > ENCODER_LOG_TAIL_BYTES {
            let overflow = self.tail.len() - ENCODER_LOG_TAIL_BYTES;
            self.tail.drain(0..overflow);
        }
    }

    /// The bounded tail of stderr seen so far, used as the `stderr_snippet`
    /// on a non-zero exit.
    pub fn tail(&self) -> String {
        String::from_utf8_lossy(&self.tail).into_owned()
    }

    pub async fn finish(mut self, exit_code: Option<i32>) -> std::io::Result<()> {
        let footer = format!(
            "---\nexit_code={} ended_utc={}\n",
            exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()),
            Utc::now().to_rfc3339(),
        );
        self.file.write_all(footer.as_bytes()).await?;
        self.file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn header_body_and_footer_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = encoder_log_path(dir.path(), "job-1");
        let mut writer = EncoderLogWriter::create(&path, "job-1", "corr-1", "1280x720", "ffmpeg ...")
            .await
            .unwrap();
        writer.write_line("stderr", "frame=1").await.unwrap();
        writer.finish(Some(0)).await.unwrap();

        let contents = fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("job_id=job-1"));
        assert!(contents.contains("[stderr] frame=1"));
        assert!(contents.contains("exit_code=0"));
    }

    #[tokio::test]
    async fn tail_is_bounded_to_the_configured_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = encoder_log_path(dir.path(), "job-2");
        let mut writer = EncoderLogWriter::create(&path, "job-2", "corr-2", "1280x720", "ffmpeg ...")
            .await
            .unwrap();
        let long_line = "x".repeat(1024);
        for _ in 0..32 {
            writer.write_line("stderr", &long_line).await.unwrap();
        }
        assert!(writer.tail().len() <= ENCODER_LOG_TAIL_BYTES);
    }
}
