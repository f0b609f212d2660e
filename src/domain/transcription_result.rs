use super::{JobId, Segment};

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionResult {
    pub job_id: JobId,
    pub language: Option<String>,
    pub text: String,
    pub segments: Vec<Segment>,
}

impl TranscriptionResult {
    /// Builds the result so that `text` is always the space-joined, trimmed
    /// concatenation of the segment texts in order.
    pub fn assemble(job_id: JobId, language: Option<String>, segments: Vec<Segment>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        Self {
            job_id,
            language,
            text,
            segments,
        }
    }
}
