use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::TranscriptionOptions;

/// Externally visible handle of a single transcription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ephemeral unit of work. Lives only for the duration of one request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub options: TranscriptionOptions,
    pub received_at: DateTime<Utc>,
}

impl Job {
    pub fn new(options: TranscriptionOptions) -> Self {
        Self {
            id: JobId::new(),
            options,
            received_at: Utc::now(),
        }
    }

    /// Milliseconds elapsed since the request was received, clamped at zero.
    pub fn age_ms(&self) -> u64 {
        u64::try_from((Utc::now() - self.received_at).num_milliseconds()).unwrap_or(0)
    }
}
