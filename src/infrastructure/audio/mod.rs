pub mod audio_decoder;
mod ffmpeg_normalizer;
pub mod vad;

pub use ffmpeg_normalizer::{
    CANONICAL_FILE_NAME, FfmpegAudioNormalizer, canonical_output_path, check_ffmpeg_binary,
};
