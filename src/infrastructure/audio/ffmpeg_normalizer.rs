use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::application::ports::{AudioNormalizer, ConversionError};

pub const CANONICAL_FILE_NAME: &str = "audio_16k.wav";

const SAMPLE_RATE: &str = "16000";
const STDERR_TAIL_BYTES: usize = 2048;

/// Runs ffmpeg to produce a mono 16 kHz WAV with video, subtitle and data
/// streams dropped.
pub struct FfmpegAudioNormalizer {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegAudioNormalizer {
    pub fn new(binary: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-ac", "1", "-ar", SAMPLE_RATE, "-f", "wav", "-vn", "-sn", "-dn"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for FfmpegAudioNormalizer {
    fn default() -> Self {
        Self::new("ffmpeg", None)
    }
}

#[async_trait]
impl AudioNormalizer for FfmpegAudioNormalizer {
    async fn normalize(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        let output_path = canonical_output_path(input);
        let mut cmd = self.command(input, &output_path);
        let run = cmd.output();

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| ConversionError::TimedOut(limit.as_secs()))?,
            None => run.await,
        };

        let output = result.map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            tracing::warn!(
                code = ?output.status.code(),
                stderr = %stderr,
                "ffmpeg conversion failed"
            );
            return Err(ConversionError::Failed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(output_path)
    }
}

impl FfmpegAudioNormalizer {
    fn spawn_error(&self, e: io::Error) -> ConversionError {
        if e.kind() == io::ErrorKind::NotFound {
            ConversionError::ToolNotFound(self.binary.display().to_string())
        } else {
            ConversionError::Io(e)
        }
    }
}

/// The canonical waveform lives next to the input. An input that already
/// carries the canonical name gets a distinct output so ffmpeg never reads and
/// writes the same file.
pub fn canonical_output_path(input: &Path) -> PathBuf {
    let candidate = input.with_file_name(CANONICAL_FILE_NAME);
    if candidate == input {
        input.with_file_name(format!("normalized_{}", CANONICAL_FILE_NAME))
    } else {
        candidate
    }
}

/// Verifies that the transcoder can be spawned.
pub async fn check_ffmpeg_binary(binary: &Path) -> Result<(), ConversionError> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConversionError::ToolNotFound(binary.display().to_string()),
            _ => ConversionError::Io(e),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(ConversionError::Failed {
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
