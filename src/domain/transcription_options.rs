use std::num::NonZeroUsize;

pub const DEFAULT_LANGUAGE: &str = "en";
/// Language value that asks the model to detect the spoken language.
pub const AUTO_DETECT_LANGUAGE: &str = "auto";

/// Request-level knobs forwarded to the speech model.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionOptions {
    /// `None` asks the model to detect the spoken language.
    pub language: Option<String>,
    pub beam_size: NonZeroUsize,
    pub vad_filter: bool,
    pub word_timestamps: bool,
    pub initial_prompt: Option<String>,
}

impl TranscriptionOptions {
    /// A blank language falls back to the default and `auto` turns into
    /// detection. Blank prompts count as absent.
    pub fn normalized(mut self) -> Self {
        self.language = match non_blank(self.language) {
            None => Some(DEFAULT_LANGUAGE.to_string()),
            Some(l) if l.trim().eq_ignore_ascii_case(AUTO_DETECT_LANGUAGE) => None,
            Some(l) => Some(l),
        };
        self.initial_prompt = non_blank(self.initial_prompt);
        self
    }
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            language: Some(DEFAULT_LANGUAGE.to_string()),
            beam_size: NonZeroUsize::MIN,
            vad_filter: true,
            word_timestamps: false,
            initial_prompt: None,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
