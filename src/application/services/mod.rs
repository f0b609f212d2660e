mod single_flight_gate;
mod transcription_engine;
mod transcription_service;

pub use single_flight_gate::SingleFlightGate;
pub use transcription_engine::{
    COMPRESSION_RATIO_THRESHOLD, CONDITION_ON_PREVIOUS_TEXT, EngineOutput, LOG_PROB_THRESHOLD,
    NO_SPEECH_THRESHOLD, TranscriptionEngine, decode_params_for, resolve_language,
};
pub use transcription_service::{TranscriptionError, TranscriptionService};
