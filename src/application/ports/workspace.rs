use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::domain::JobId;

pub type UploadStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Hands out isolated per-job scratch directories.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    async fn create(&self, job_id: &JobId) -> Result<Box<dyn JobWorkspace>, WorkspaceError>;
}

/// A scratch directory exclusively owned by one job.
#[async_trait]
pub trait JobWorkspace: Send + Sync {
    fn path(&self) -> &Path;

    /// Writes the upload verbatim into the workspace and returns its path.
    async fn persist_upload(
        &self,
        filename: &str,
        upload: UploadStream,
    ) -> Result<PathBuf, WorkspaceError>;

    async fn destroy(self: Box<Self>) -> Result<(), WorkspaceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace creation failed: {0}")]
    Create(#[source] io::Error),
    #[error("upload could not be persisted: {0}")]
    Persist(#[source] io::Error),
    #[error("workspace removal failed: {0}")]
    Remove(#[source] io::Error),
}
