use std::io;
use std::num::NonZeroUsize;

use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;

use crate::application::ports::UploadStream;
use crate::application::services::TranscriptionError;
use crate::domain::{Segment, TranscriptionOptions, TranscriptionResult};
use crate::infrastructure::observability::sanitize_prompt;
use crate::presentation::state::AppState;

const AUDIO_FIELD: &str = "audio";

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub language: Option<String>,
    pub text: String,
    pub segments: Vec<SegmentResponse>,
}

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub id: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl From<TranscriptionResult> for TranscriptionResponse {
    fn from(result: TranscriptionResult) -> Self {
        Self {
            job_id: result.job_id.to_string(),
            language: result.language,
            text: result.text,
            segments: result.segments.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Segment> for SegmentResponse {
    fn from(segment: Segment) -> Self {
        Self {
            id: segment.id,
            start: segment.start,
            end: segment.end,
            text: segment.text,
        }
    }
}

struct AudioUpload {
    filename: String,
    data: Bytes,
}

struct TranscribeForm {
    audio: AudioUpload,
    options: TranscriptionOptions,
}

#[derive(Debug)]
enum FormError {
    Multipart(MultipartError),
    MissingAudio,
    InvalidField { name: &'static str, reason: String },
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            FormError::Multipart(e) => (e.status(), format!("Failed to read multipart: {}", e.body_text())),
            FormError::MissingAudio => (
                StatusCode::BAD_REQUEST,
                format!("Missing required file field '{}'", AUDIO_FIELD),
            ),
            FormError::InvalidField { name, reason } => (
                StatusCode::BAD_REQUEST,
                format!("Invalid value for '{}': {}", name, reason),
            ),
        };

        tracing::warn!(status = status.as_u16(), error = %error, "Rejected transcription request");
        (status, Json(ErrorResponse { error, kind: None })).into_response()
    }
}

impl IntoResponse for TranscriptionError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.to_string(),
                kind: Some(self.kind()),
            }),
        )
            .into_response()
    }
}

pub async fn transcribe_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };

    if let Some(prompt) = form.options.initial_prompt.as_deref() {
        tracing::debug!(initial_prompt = %sanitize_prompt(prompt), "Priming prompt supplied");
    }

    tracing::debug!(
        filename = %form.audio.filename,
        bytes = form.audio.data.len(),
        "Audio upload received"
    );

    let AudioUpload { filename, data } = form.audio;
    match state
        .transcription_service
        .handle_request(upload_stream(data), &filename, form.options)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(TranscriptionResponse::from(result))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn read_form(mut multipart: Multipart) -> Result<TranscribeForm, FormError> {
    let mut audio = None;
    let mut options = TranscriptionOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(FormError::Multipart)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            AUDIO_FIELD => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(FormError::Multipart)?;
                audio = Some(AudioUpload { filename, data });
            }
            "language" => options.language = Some(text(field).await?),
            "beam_size" => options.beam_size = parse_beam_size(&text(field).await?)?,
            "vad" => options.vad_filter = parse_flag("vad", &text(field).await?)?,
            "word_timestamps" => {
                options.word_timestamps = parse_flag("word_timestamps", &text(field).await?)?
            }
            "initial_prompt" => options.initial_prompt = Some(text(field).await?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let audio = audio.ok_or(FormError::MissingAudio)?;
    Ok(TranscribeForm { audio, options })
}

async fn text(field: Field<'_>) -> Result<String, FormError> {
    field.text().await.map_err(FormError::Multipart)
}

fn parse_beam_size(raw: &str) -> Result<NonZeroUsize, FormError> {
    raw.trim()
        .parse::<NonZeroUsize>()
        .map_err(|_| FormError::InvalidField {
            name: "beam_size",
            reason: format!("expected an integer >= 1, got '{}'", raw),
        })
}

/// Accepts the usual spellings of a boolean form value.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "off" | "f" => Some(false),
        _ => None,
    }
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, FormError> {
    parse_bool(raw).ok_or_else(|| FormError::InvalidField {
        name,
        reason: format!("expected a boolean, got '{}'", raw),
    })
}

fn upload_stream(data: Bytes) -> UploadStream {
    futures::stream::once(async move { Ok::<_, io::Error>(data) }).boxed()
}
