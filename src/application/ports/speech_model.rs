use std::path::Path;

/// Opaque speech recognition model.
///
/// Implementations are CPU-bound and blocking; callers are expected to run
/// them off the async executor. The returned segment sequence is lazy and can
/// only be consumed once.
pub trait SpeechModel: Send + Sync {
    fn transcribe(
        &self,
        audio_path: &Path,
        params: &DecodeParams,
    ) -> Result<ModelTranscript, SpeechModelError>;
}

/// Invocation parameters as the model sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    pub language: Option<String>,
    pub beam_size: usize,
    pub vad_filter: bool,
    pub word_timestamps: bool,
    pub initial_prompt: Option<String>,
    pub condition_on_previous_text: bool,
    pub no_speech_threshold: f64,
    pub log_prob_threshold: f64,
    pub compression_ratio_threshold: f64,
}

pub type SegmentStream = Box<dyn Iterator<Item = Result<ModelSegment, SpeechModelError>> + Send>;

pub struct ModelTranscript {
    /// Language reported by the model, if any.
    pub language: Option<String>,
    pub segments: SegmentStream,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechModelError {
    #[error("model loading failed: {0}")]
    ModelLoad(String),
    #[error("audio decoding failed: {0}")]
    Decode(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}
