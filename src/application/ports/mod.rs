mod audio_normalizer;
mod speech_model;
mod workspace;

pub use audio_normalizer::{AudioNormalizer, ConversionError};
pub use speech_model::{
    DecodeParams, ModelSegment, ModelTranscript, SegmentStream, SpeechModel, SpeechModelError,
};
pub use workspace::{JobWorkspace, UploadStream, WorkspaceError, WorkspaceProvider};
