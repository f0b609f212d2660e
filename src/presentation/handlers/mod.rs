mod ping;
mod transcribe;

pub use ping::ping_handler;
pub use transcribe::{
    ErrorResponse, SegmentResponse, TranscriptionResponse, parse_bool, transcribe_handler,
};
