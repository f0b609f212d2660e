mod candle_whisper_model;
pub mod decoding;
pub mod languages;
mod mock_speech_model;
mod speech_model_factory;

pub use candle_whisper_model::CandleWhisperModel;
pub use mock_speech_model::MockSpeechModel;
pub use speech_model_factory::{SpeechModelFactory, dtype_for, resolve_model_id};
