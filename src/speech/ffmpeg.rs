//! Audio conversion through an external ffmpeg process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{AudioConverter, TempAudio};

/// Converts audio with an external `ffmpeg` binary.
pub struct FfmpegConverter {
    binary: PathBuf,
}

impl FfmpegConverter {
    /// Converter invoking `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn to_wav(&self, input: &Path) -> Result<TempAudio> {
        let output = tempfile::Builder::new()
            .prefix("converted-")
            .suffix(".wav")
            .tempfile()
            .context("failed to create temporary wav file")?
            .into_temp_path();
        let result = Command::new(&self.binary)
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg(&*output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;
        let finished = match result {
            Ok(finished) => finished,
            Err(err) if err.kind() == ErrorKind::NotFound => bail!(
                "ffmpeg executable not found at {}; install ffmpeg or set FFMPEG_BIN",
                self.binary.display()
            ),
            Err(err) => return Err(err).context("failed to spawn ffmpeg"),
        };
        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            bail!(
                "ffmpeg exited with {}: {}",
                finished.status,
                stderr.trim()
            );
        }
        tracing::debug!(input = %input.display(), "converted upload to wav");
        Ok(output)
    }
}
