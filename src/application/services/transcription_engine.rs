use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::application::ports::{DecodeParams, SpeechModel, SpeechModelError};
use crate::domain::{Segment, TranscriptionOptions};

pub const NO_SPEECH_THRESHOLD: f64 = 0.6;
pub const LOG_PROB_THRESHOLD: f64 = -1.0;
pub const COMPRESSION_RATIO_THRESHOLD: f64 = 2.4;
pub const CONDITION_ON_PREVIOUS_TEXT: bool = true;

/// Everything the engine learned about one waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub language: Option<String>,
    pub segments: Vec<Segment>,
}

/// Wraps the shared speech model and turns its lazy output into a finished,
/// fully materialized result.
#[derive(Clone)]
pub struct TranscriptionEngine {
    model: Arc<dyn SpeechModel>,
}

impl TranscriptionEngine {
    pub fn new(model: Arc<dyn SpeechModel>) -> Self {
        Self { model }
    }

    pub async fn transcribe(
        &self,
        wav_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<EngineOutput, SpeechModelError> {
        let model = Arc::clone(&self.model);
        let wav_path: PathBuf = wav_path.to_path_buf();
        let params = decode_params_for(options);

        tokio::task::spawn_blocking(move || drain(model.as_ref(), &wav_path, &params))
            .await
            .map_err(|e| SpeechModelError::Inference(format!("inference task: {}", e)))?
    }
}

/// Maps request options onto model parameters, adding the fixed decoding
/// thresholds.
pub fn decode_params_for(options: &TranscriptionOptions) -> DecodeParams {
    DecodeParams {
        language: options.language.clone(),
        beam_size: options.beam_size.get(),
        vad_filter: options.vad_filter,
        word_timestamps: options.word_timestamps,
        initial_prompt: options.initial_prompt.clone(),
        condition_on_previous_text: CONDITION_ON_PREVIOUS_TEXT,
        no_speech_threshold: NO_SPEECH_THRESHOLD,
        log_prob_threshold: LOG_PROB_THRESHOLD,
        compression_ratio_threshold: COMPRESSION_RATIO_THRESHOLD,
    }
}

/// The model's language wins unless it is absent or empty, in which case the
/// requested one is reported.
pub fn resolve_language(reported: Option<String>, requested: Option<&str>) -> Option<String> {
    match reported {
        Some(language) if !language.is_empty() => Some(language),
        _ => requested.map(str::to_string),
    }
}

fn drain(
    model: &dyn SpeechModel,
    wav_path: &Path,
    params: &DecodeParams,
) -> Result<EngineOutput, SpeechModelError> {
    let started = Instant::now();
    let transcript = model.transcribe(wav_path, params)?;

    let segments = transcript
        .segments
        .enumerate()
        .map(|(index, item)| item.map(|s| Segment::new(index, s.start, s.end, s.text)))
        .collect::<Result<Vec<_>, _>>()?;

    let language = resolve_language(transcript.language, params.language.as_deref());

    tracing::info!(
        segments = segments.len(),
        language = language.as_deref().unwrap_or("unknown"),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Speech model drained"
    );

    Ok(EngineOutput { language, segments })
}
