use std::path::Path;

use crate::application::ports::{
    DecodeParams, ModelSegment, ModelTranscript, SpeechModel, SpeechModelError,
};

/// Scripted model used for local development and smoke tests. Every file
/// yields the same segments regardless of its audio content.
pub struct MockSpeechModel {
    language: Option<String>,
    segments: Vec<ModelSegment>,
}

impl MockSpeechModel {
    pub fn new(language: Option<String>, segments: Vec<ModelSegment>) -> Self {
        Self { language, segments }
    }
}

impl Default for MockSpeechModel {
    fn default() -> Self {
        Self::new(
            None,
            vec![
                ModelSegment {
                    start: 0.0,
                    end: 1.5,
                    text: " This is a mock transcription.".to_string(),
                },
                ModelSegment {
                    start: 1.5,
                    end: 3.0,
                    text: " No model was loaded.".to_string(),
                },
            ],
        )
    }
}

impl SpeechModel for MockSpeechModel {
    fn transcribe(
        &self,
        audio_path: &Path,
        params: &DecodeParams,
    ) -> Result<ModelTranscript, SpeechModelError> {
        if !audio_path.exists() {
            return Err(SpeechModelError::Decode(format!(
                "audio file not found: {}",
                audio_path.display()
            )));
        }

        tracing::debug!(path = %audio_path.display(), beam_size = params.beam_size, "Mock transcription");

        let segments = self.segments.clone();
        Ok(ModelTranscript {
            language: self.language.clone().or_else(|| params.language.clone()),
            segments: Box::new(segments.into_iter().map(Ok)),
        })
    }
}
