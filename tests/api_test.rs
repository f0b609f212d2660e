mod helpers;

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use scribed::application::ports::{AudioNormalizer, SpeechModel};
use scribed::application::services::{TranscriptionEngine, TranscriptionService};
use scribed::infrastructure::storage::TempDirWorkspaceProvider;
use scribed::presentation::{AppState, create_router};

use helpers::{
    CopyingNormalizer, FailingNormalizer, MultipartBody, ScriptedModel, content_type,
    leftover_entries, segment, test_settings,
};

fn create_test_app(
    root: &Path,
    normalizer: Arc<dyn AudioNormalizer>,
    model: Arc<dyn SpeechModel>,
) -> axum::Router {
    let service = Arc::new(TranscriptionService::new(
        Arc::new(TempDirWorkspaceProvider::new(root)),
        normalizer,
        TranscriptionEngine::new(model),
    ));
    create_router(AppState::new(service), &test_settings(root))
}

fn transcribe_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/transcribe")
        .header("content-type", content_type())
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn given_running_server_when_ping_then_returns_ok_true() {
    let root = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::hello_world());
    let app = create_test_app(root.path(), Arc::new(CopyingNormalizer::default()), model.clone());

    let response = app
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({ "ok": true }));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn given_two_segment_model_when_transcribing_then_text_is_hello_world() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::hello_world()),
    );

    let body = MultipartBody::new()
        .file("audio", "clip.mp3", b"fake audio")
        .finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["text"], "hello world");
    assert_eq!(json["language"], "en");
    assert!(json["jobId"].as_str().is_some_and(|id| !id.is_empty()));

    let segments = json["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0]["id"], 0);
    assert_eq!(segments[0]["start"], 0.0);
    assert_eq!(segments[0]["end"], 1.0);
    assert_eq!(segments[0]["text"], "hello");
    assert_eq!(segments[1]["id"], 1);
    assert_eq!(segments[1]["text"], "world");
}

#[tokio::test]
async fn given_untrimmed_segments_when_transcribing_then_text_is_joined_and_trimmed() {
    let root = TempDir::new().unwrap();
    let model = ScriptedModel::new(
        Some("en"),
        vec![segment(0.0, 1.0, " Hello"), segment(1.0, 2.5, " there. ")],
    );
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(model),
    );

    let body = MultipartBody::new().file("audio", "a.wav", b"x").finish();
    let json = json_body(app.oneshot(transcribe_request(body)).await.unwrap()).await;

    assert_eq!(json["text"], "Hello  there.");
    assert_eq!(json["segments"][0]["text"], " Hello");
    assert_eq!(json["segments"][1]["text"], " there. ");
}

#[tokio::test]
async fn given_no_form_fields_when_transcribing_then_defaults_are_forwarded() {
    let root = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::hello_world());
    let app = create_test_app(root.path(), Arc::new(CopyingNormalizer::default()), model.clone());

    let body = MultipartBody::new().file("audio", "a.wav", b"x").finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let params = model.last_params().unwrap();
    assert_eq!(params.language.as_deref(), Some("en"));
    assert_eq!(params.beam_size, 1);
    assert!(params.vad_filter);
    assert!(!params.word_timestamps);
    assert_eq!(params.initial_prompt, None);
    assert!(params.condition_on_previous_text);
    assert_eq!(params.no_speech_threshold, 0.6);
    assert_eq!(params.log_prob_threshold, -1.0);
    assert_eq!(params.compression_ratio_threshold, 2.4);
}

#[tokio::test]
async fn given_all_form_fields_when_transcribing_then_options_are_forwarded() {
    let root = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::hello_world());
    let app = create_test_app(root.path(), Arc::new(CopyingNormalizer::default()), model.clone());

    let body = MultipartBody::new()
        .text("language", "nl")
        .text("beam_size", "5")
        .text("vad", "false")
        .text("word_timestamps", "true")
        .text("initial_prompt", "Cardiology consult, echocardiogram")
        .file("audio", "consult.m4a", b"x")
        .finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let params = model.last_params().unwrap();
    assert_eq!(params.language.as_deref(), Some("nl"));
    assert_eq!(params.beam_size, 5);
    assert!(!params.vad_filter);
    assert!(params.word_timestamps);
    assert_eq!(
        params.initial_prompt.as_deref(),
        Some("Cardiology consult, echocardiogram")
    );
}

#[tokio::test]
async fn given_model_without_language_when_transcribing_then_requested_language_is_returned() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::new(None, helpers::hello_world())),
    );

    let body = MultipartBody::new()
        .text("language", "de")
        .file("audio", "a.wav", b"x")
        .finish();
    let json = json_body(app.oneshot(transcribe_request(body)).await.unwrap()).await;

    assert_eq!(json["language"], "de");
}

#[tokio::test]
async fn given_model_reporting_empty_language_when_transcribing_then_requested_language_is_returned()
{
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::new(Some(""), helpers::hello_world())),
    );

    let body = MultipartBody::new().file("audio", "a.wav", b"x").finish();
    let json = json_body(app.oneshot(transcribe_request(body)).await.unwrap()).await;

    assert_eq!(json["language"], "en");
}

#[tokio::test]
async fn given_blank_language_and_silent_model_when_transcribing_then_default_language_is_returned() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::new(None, vec![])),
    );

    let body = MultipartBody::new()
        .text("language", "")
        .file("audio", "a.wav", b"x")
        .finish();
    let json = json_body(app.oneshot(transcribe_request(body)).await.unwrap()).await;

    assert_eq!(json["language"], "en");
    assert_eq!(json["text"], "");
    assert_eq!(json["segments"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn given_missing_audio_field_when_transcribing_then_returns_bad_request() {
    let root = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::hello_world());
    let app = create_test_app(root.path(), Arc::new(CopyingNormalizer::default()), model.clone());

    let body = MultipartBody::new().text("language", "en").finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].as_str().unwrap().contains("audio"));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn given_zero_beam_size_when_transcribing_then_returns_bad_request() {
    let root = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::hello_world());
    let app = create_test_app(root.path(), Arc::new(CopyingNormalizer::default()), model.clone());

    let body = MultipartBody::new()
        .text("beam_size", "0")
        .file("audio", "a.wav", b"x")
        .finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn given_non_boolean_vad_when_transcribing_then_returns_bad_request() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::hello_world()),
    );

    let body = MultipartBody::new()
        .text("vad", "sometimes")
        .file("audio", "a.wav", b"x")
        .finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn given_failing_conversion_when_transcribing_then_returns_server_error_without_model_call()
{
    let root = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::hello_world());
    let app = create_test_app(root.path(), Arc::new(FailingNormalizer), model.clone());

    let body = MultipartBody::new()
        .file("audio", "notes.txt", b"definitely not audio")
        .finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "conversion_error");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn given_failing_model_when_transcribing_then_returns_server_error_without_segments() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::failing("decoder exploded")),
    );

    let body = MultipartBody::new().file("audio", "a.wav", b"x").finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "inference_error");
    assert!(json.get("segments").is_none());
}

#[tokio::test]
async fn given_successful_and_failed_requests_when_finished_then_no_workspace_is_left() {
    let root = TempDir::new().unwrap();

    let ok_app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::hello_world()),
    );
    let body = MultipartBody::new().file("audio", "a.wav", b"x").finish();
    let response = ok_app.oneshot(transcribe_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(leftover_entries(root.path()).is_empty());

    let failing_app = create_test_app(
        root.path(),
        Arc::new(FailingNormalizer),
        Arc::new(ScriptedModel::hello_world()),
    );
    let body = MultipartBody::new().file("audio", "a.wav", b"x").finish();
    let response = failing_app.oneshot(transcribe_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(leftover_entries(root.path()).is_empty());
}

#[tokio::test]
async fn given_upload_above_limit_when_transcribing_then_returns_payload_too_large() {
    let root = TempDir::new().unwrap();
    let model = Arc::new(ScriptedModel::hello_world());
    let app = create_test_app(root.path(), Arc::new(CopyingNormalizer::default()), model.clone());

    let oversized = vec![0u8; 2 * 1024 * 1024];
    let body = MultipartBody::new()
        .file("audio", "big.wav", &oversized)
        .finish();
    let response = app.oneshot(transcribe_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn given_request_id_header_when_pinging_then_header_is_echoed() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::hello_world()),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ping")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn given_allowed_origin_when_preflighting_then_cors_headers_are_returned() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::hello_world()),
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/transcribe")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
    assert_eq!(response.headers()["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn given_unknown_origin_when_preflighting_then_origin_is_not_allowed() {
    let root = TempDir::new().unwrap();
    let app = create_test_app(
        root.path(),
        Arc::new(CopyingNormalizer::default()),
        Arc::new(ScriptedModel::hello_world()),
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/transcribe")
                .header("origin", "http://evil.example")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.headers().get("access-control-allow-origin").is_none());
}
