use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use scribed::application::ports::{AudioNormalizer, ConversionError};
use scribed::infrastructure::audio::audio_decoder::read_pcm_16k;
use scribed::infrastructure::audio::{
    CANONICAL_FILE_NAME, FfmpegAudioNormalizer, canonical_output_path, check_ffmpeg_binary,
};

async fn ffmpeg_available() -> bool {
    check_ffmpeg_binary(Path::new("ffmpeg")).await.is_ok()
}

/// Half a second of 440 Hz stereo at 44.1 kHz, generated by ffmpeg itself.
async fn write_tone(dir: &Path) -> PathBuf {
    let path = dir.join("tone.mp3");
    let status = tokio::process::Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=44100:duration=0.5",
            "-ac",
            "2",
        ])
        .arg(&path)
        .status()
        .await
        .unwrap();
    assert!(status.success());
    path
}

#[test]
fn given_upload_path_when_deriving_output_then_canonical_sibling_is_used() {
    let output = canonical_output_path(Path::new("/tmp/ts_abc/meeting.m4a"));
    assert_eq!(output, Path::new("/tmp/ts_abc").join(CANONICAL_FILE_NAME));
}

#[test]
fn given_upload_with_canonical_name_when_deriving_output_then_paths_differ() {
    let input = Path::new("/tmp/ts_abc").join(CANONICAL_FILE_NAME);
    let output = canonical_output_path(&input);
    assert_ne!(output, input);
    assert_eq!(output.parent(), input.parent());
}

#[tokio::test]
async fn given_missing_binary_when_normalizing_then_returns_tool_not_found() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("clip.wav");
    std::fs::write(&input, b"RIFF").unwrap();

    let normalizer = FfmpegAudioNormalizer::new("/nonexistent/bin/ffmpeg-missing", None);
    let result = normalizer.normalize(&input).await;

    assert!(matches!(result, Err(ConversionError::ToolNotFound(_))));
}

#[tokio::test]
async fn given_missing_binary_when_probing_then_returns_tool_not_found() {
    let result = check_ffmpeg_binary(Path::new("/nonexistent/bin/ffmpeg-missing")).await;
    assert!(matches!(result, Err(ConversionError::ToolNotFound(_))));
}

#[tokio::test]
async fn given_non_audio_file_when_normalizing_then_fails_with_stderr() {
    if !ffmpeg_available().await {
        return;
    }
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, b"this is plainly not an audio file").unwrap();

    let result = FfmpegAudioNormalizer::default().normalize(&input).await;

    match result {
        Err(ConversionError::Failed { code, stderr }) => {
            assert_ne!(code, Some(0));
            assert!(!stderr.is_empty());
        }
        other => panic!("expected conversion failure, got {:?}", other),
    }
}

#[tokio::test]
async fn given_stereo_mp3_when_normalizing_then_writes_mono_16k_wav() {
    if !ffmpeg_available().await {
        return;
    }
    let dir = TempDir::new().unwrap();
    let input = write_tone(dir.path()).await;

    let normalizer = FfmpegAudioNormalizer::new("ffmpeg", Some(Duration::from_secs(30)));
    let output = normalizer.normalize(&input).await.unwrap();

    assert_eq!(output, dir.path().join(CANONICAL_FILE_NAME));
    let pcm = read_pcm_16k(&output).unwrap();
    let expected = 8_000;
    assert!(
        pcm.len().abs_diff(expected) < 1_600,
        "unexpected sample count {}",
        pcm.len()
    );
    assert!(pcm.iter().any(|s| s.abs() > 0.1));
}
