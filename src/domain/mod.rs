mod job;
mod segment;
mod transcription_options;
mod transcription_result;

pub use job::{Job, JobId};
pub use segment::Segment;
pub use transcription_options::{AUTO_DETECT_LANGUAGE, DEFAULT_LANGUAGE, TranscriptionOptions};
pub use transcription_result::TranscriptionResult;
