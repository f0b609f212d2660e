#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::StreamExt;

use scribed::application::ports::{
    AudioNormalizer, ConversionError, DecodeParams, ModelSegment, ModelTranscript, SpeechModel,
    SpeechModelError, UploadStream,
};
use scribed::infrastructure::audio::canonical_output_path;
use scribed::presentation::config::{
    ComputeType, CorsSettings, LoggingSettings, ModelSettings, NormalizerSettings,
    ServerSettings, SpeechModelProvider, WorkspaceSettings,
};
use scribed::presentation::{Environment, Settings};

pub const BOUNDARY: &str = "scribed-test-boundary";

pub fn test_settings(workspace_root: &Path) -> Settings {
    Settings {
        environment: Environment::Test,
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_upload_mb: 1,
        },
        cors: CorsSettings {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        model: ModelSettings {
            provider: SpeechModelProvider::Mock,
            name: "base.en".to_string(),
            compute_type: ComputeType::F32,
            threads: 1,
        },
        normalizer: NormalizerSettings {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout_secs: 0,
        },
        workspace: WorkspaceSettings {
            root: workspace_root.to_path_buf(),
        },
        logging: LoggingSettings {
            level: "debug".to_string(),
            enable_json: false,
        },
    }
}

pub fn segment(start: f64, end: f64, text: &str) -> ModelSegment {
    ModelSegment {
        start,
        end,
        text: text.to_string(),
    }
}

pub fn hello_world() -> Vec<ModelSegment> {
    vec![segment(0.0, 1.0, "hello"), segment(1.0, 2.0, "world")]
}

pub fn upload(bytes: &'static [u8]) -> UploadStream {
    futures::stream::once(async move { Ok::<_, io::Error>(Bytes::from_static(bytes)) }).boxed()
}

pub fn failing_upload() -> UploadStream {
    futures::stream::iter(vec![
        Ok(Bytes::from_static(b"RIFF")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
    ])
    .boxed()
}

/// Copies the upload to the canonical location instead of transcoding.
#[derive(Default)]
pub struct CopyingNormalizer {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl AudioNormalizer for CopyingNormalizer {
    async fn normalize(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = canonical_output_path(input);
        tokio::fs::copy(input, &output).await?;
        Ok(output)
    }
}

pub struct FailingNormalizer;

#[async_trait::async_trait]
impl AudioNormalizer for FailingNormalizer {
    async fn normalize(&self, _input: &Path) -> Result<PathBuf, ConversionError> {
        Err(ConversionError::Failed {
            code: Some(1),
            stderr: "Invalid data found when processing input".to_string(),
        })
    }
}

/// Deterministic model that replays scripted segments and records how it was
/// called.
pub struct ScriptedModel {
    language: Option<String>,
    segments: Vec<ModelSegment>,
    failure: Option<String>,
    pub calls: AtomicUsize,
    pub last_params: Mutex<Option<DecodeParams>>,
    pub last_path: Mutex<Option<PathBuf>>,
}

impl ScriptedModel {
    pub fn new(language: Option<&str>, segments: Vec<ModelSegment>) -> Self {
        Self {
            language: language.map(String::from),
            segments,
            failure: None,
            calls: AtomicUsize::new(0),
            last_params: Mutex::new(None),
            last_path: Mutex::new(None),
        }
    }

    pub fn hello_world() -> Self {
        Self::new(Some("en"), hello_world())
    }

    /// Fails halfway through the segment stream.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::hello_world()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<DecodeParams> {
        self.last_params.lock().unwrap().clone()
    }
}

impl SpeechModel for ScriptedModel {
    fn transcribe(
        &self,
        audio_path: &Path,
        params: &DecodeParams,
    ) -> Result<ModelTranscript, SpeechModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params.clone());
        *self.last_path.lock().unwrap() = Some(audio_path.to_path_buf());

        let mut items: Vec<Result<ModelSegment, SpeechModelError>> =
            self.segments.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.failure {
            items.truncate(1);
            items.push(Err(SpeechModelError::Inference(message.clone())));
        }

        Ok(ModelTranscript {
            language: self.language.clone(),
            segments: Box::new(items.into_iter()),
        })
    }
}

pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self { body: Vec::new() }
    }

    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

pub fn content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Entries left under a workspace root.
pub fn leftover_entries(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}
