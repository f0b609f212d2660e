use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Converts arbitrary input media into the canonical mono 16 kHz WAV file the
/// speech model consumes.
#[async_trait]
pub trait AudioNormalizer: Send + Sync {
    /// Returns the path of the canonical waveform, written next to `input`.
    async fn normalize(&self, input: &Path) -> Result<PathBuf, ConversionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("transcoder not found: {0}")]
    ToolNotFound(String),
    #[error("transcoder exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("transcoder timed out after {0}s")]
    TimedOut(u64),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
