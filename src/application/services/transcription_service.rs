use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::application::ports::{
    AudioNormalizer, ConversionError, JobWorkspace, SpeechModelError, UploadStream,
    WorkspaceError, WorkspaceProvider,
};
use crate::domain::{Job, TranscriptionOptions, TranscriptionResult};

use super::{SingleFlightGate, TranscriptionEngine};

/// Per-request coordinator: workspace, upload, normalization, inference,
/// cleanup. Every step runs inside the single-flight gate.
///
/// Admitted jobs run on their own task and finish even when the caller goes
/// away, so the gate is never released while the model is still busy.
#[derive(Clone)]
pub struct TranscriptionService {
    gate: Arc<SingleFlightGate>,
    workspaces: Arc<dyn WorkspaceProvider>,
    normalizer: Arc<dyn AudioNormalizer>,
    engine: TranscriptionEngine,
}

impl TranscriptionService {
    pub fn new(
        workspaces: Arc<dyn WorkspaceProvider>,
        normalizer: Arc<dyn AudioNormalizer>,
        engine: TranscriptionEngine,
    ) -> Self {
        Self {
            gate: Arc::new(SingleFlightGate::new()),
            workspaces,
            normalizer,
            engine,
        }
    }

    pub fn gate(&self) -> &SingleFlightGate {
        &self.gate
    }

    pub async fn handle_request(
        &self,
        upload: UploadStream,
        filename: &str,
        options: TranscriptionOptions,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let job = Job::new(options.normalized());

        let span = tracing::info_span!(
            "transcription_job",
            job_id = %job.id,
            filename = %filename,
        );

        let service = self.clone();
        let filename = filename.to_owned();
        let task = tokio::spawn(
            async move {
                tracing::debug!(
                    language = job.options.language.as_deref().unwrap_or("auto"),
                    beam_size = job.options.beam_size.get(),
                    vad = job.options.vad_filter,
                    word_timestamps = job.options.word_timestamps,
                    queued_behind = service.gate.waiting(),
                    "Transcription job received"
                );

                let result = service
                    .gate
                    .run(|| service.run_job(&job, upload, &filename))
                    .await;

                match &result {
                    Ok(r) => tracing::info!(
                        segments = r.segments.len(),
                        chars = r.text.len(),
                        total_ms = job.age_ms(),
                        "Transcription job completed"
                    ),
                    Err(e) => {
                        tracing::error!(error = %e, kind = e.kind(), "Transcription job failed")
                    }
                }

                result
            }
            .instrument(span),
        );

        task.await.map_err(|e| {
            TranscriptionError::Inference(SpeechModelError::Inference(format!("job task: {}", e)))
        })?
    }

    async fn run_job(
        &self,
        job: &Job,
        upload: UploadStream,
        filename: &str,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        tracing::debug!(queued_ms = job.age_ms(), "Transcription job admitted");

        let workspace = self
            .workspaces
            .create(&job.id)
            .await
            .map_err(TranscriptionError::Upload)?;

        let outcome = self
            .run_pipeline(job, workspace.as_ref(), upload, filename)
            .await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.destroy().await {
            tracing::warn!(
                error = %e,
                path = %workspace_path.display(),
                "Failed to remove scratch workspace"
            );
        }

        outcome
    }

    async fn run_pipeline(
        &self,
        job: &Job,
        workspace: &dyn JobWorkspace,
        upload: UploadStream,
        filename: &str,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let raw_path = workspace
            .persist_upload(filename, upload)
            .await
            .map_err(TranscriptionError::Upload)?;

        let started = Instant::now();
        let wav_path = self.normalizer.normalize(&raw_path).await?;
        tracing::debug!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            wav = %display_name(&wav_path),
            "Upload normalized"
        );

        let output = self.engine.transcribe(&wav_path, &job.options).await?;

        Ok(TranscriptionResult::assemble(
            job.id,
            output.language,
            output.segments,
        ))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("upload: {0}")]
    Upload(#[source] WorkspaceError),
    #[error("conversion: {0}")]
    Conversion(#[from] ConversionError),
    #[error("inference: {0}")]
    Inference(#[from] SpeechModelError),
}

impl TranscriptionError {
    pub fn kind(&self) -> &'static str {
        match self {
            TranscriptionError::Upload(_) => "upload_error",
            TranscriptionError::Conversion(_) => "conversion_error",
            TranscriptionError::Inference(_) => "inference_error",
        }
    }
}
