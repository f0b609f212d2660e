use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use scribed::application::services::{TranscriptionEngine, TranscriptionService};
use scribed::infrastructure::audio::{FfmpegAudioNormalizer, check_ffmpeg_binary};
use scribed::infrastructure::observability::{TracingConfig, init_tracing};
use scribed::infrastructure::speech::SpeechModelFactory;
use scribed::infrastructure::storage::TempDirWorkspaceProvider;
use scribed::presentation::{AppState, Settings, create_router};

const INFERENCE_THREADS_VAR: &str = "RAYON_NUM_THREADS";

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("Failed to load settings")?;

    init_tracing(&TracingConfig::new(
        settings.environment.as_str(),
        settings.logging.level.as_str(),
        settings.logging.enable_json,
    ));

    if std::env::var_os(INFERENCE_THREADS_VAR).is_none() {
        // SAFETY: no other threads exist before the runtime is built
        unsafe { std::env::set_var(INFERENCE_THREADS_VAR, settings.model.threads.to_string()) };
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?
        .block_on(run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        environment = %settings.environment,
        provider = ?settings.model.provider,
        model = %settings.model.name,
        compute_type = ?settings.model.compute_type,
        threads = settings.model.threads,
        "Starting transcription service"
    );

    if let Err(e) = check_ffmpeg_binary(&settings.normalizer.ffmpeg_path).await {
        tracing::warn!(
            error = %e,
            ffmpeg = %settings.normalizer.ffmpeg_path.display(),
            "ffmpeg is not usable; every conversion will fail until it is installed"
        );
    }

    let model_settings = settings.model.clone();
    let model = tokio::task::spawn_blocking(move || {
        SpeechModelFactory::create(
            model_settings.provider,
            &model_settings.name,
            model_settings.compute_type,
        )
    })
    .await
    .context("Model loading task panicked")?
    .context("Failed to load speech model")?;

    let normalizer = Arc::new(FfmpegAudioNormalizer::new(
        settings.normalizer.ffmpeg_path.clone(),
        settings.normalizer.timeout(),
    ));
    let workspaces = Arc::new(TempDirWorkspaceProvider::new(
        settings.workspace.root.clone(),
    ));

    let transcription_service = Arc::new(TranscriptionService::new(
        workspaces,
        normalizer,
        TranscriptionEngine::new(model),
    ));

    let router = create_router(AppState::new(transcription_service), &settings);

    let address = settings.server.address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tracing::info!(
        address = %address,
        origins = ?settings.cors.allowed_origins,
        max_upload_mb = settings.server.max_upload_mb,
        "Listening"
    );

    axum::serve(listener, router).await?;

    Ok(())
}
