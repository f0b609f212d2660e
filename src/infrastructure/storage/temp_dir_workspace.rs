use std::io;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use crate::application::ports::{JobWorkspace, UploadStream, WorkspaceError, WorkspaceProvider};
use crate::domain::JobId;

const DIR_PREFIX: &str = "ts_";
const FALLBACK_FILE_NAME: &str = "upload";

/// Creates one uniquely named directory per job under `root`.
pub struct TempDirWorkspaceProvider {
    root: PathBuf,
}

impl TempDirWorkspaceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for TempDirWorkspaceProvider {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

#[async_trait::async_trait]
impl WorkspaceProvider for TempDirWorkspaceProvider {
    async fn create(&self, job_id: &JobId) -> Result<Box<dyn JobWorkspace>, WorkspaceError> {
        let root = self.root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            tempfile::Builder::new().prefix(DIR_PREFIX).tempdir_in(&root)
        })
        .await
        .map_err(|e| WorkspaceError::Create(io::Error::other(e)))?
        .map_err(WorkspaceError::Create)?;

        tracing::debug!(job_id = %job_id, path = %dir.path().display(), "Workspace created");
        Ok(Box::new(TempDirWorkspace { dir }))
    }
}

pub struct TempDirWorkspace {
    dir: TempDir,
}

#[async_trait::async_trait]
impl JobWorkspace for TempDirWorkspace {
    fn path(&self) -> &Path {
        self.dir.path()
    }

    async fn persist_upload(
        &self,
        filename: &str,
        mut upload: UploadStream,
    ) -> Result<PathBuf, WorkspaceError> {
        let target = self.dir.path().join(safe_file_name(filename));
        let mut file = tokio::fs::File::create(&target)
            .await
            .map_err(WorkspaceError::Persist)?;

        let mut total_bytes: u64 = 0;
        while let Some(chunk) = upload.next().await {
            let bytes = chunk.map_err(WorkspaceError::Persist)?;
            total_bytes += bytes.len() as u64;
            file.write_all(&bytes).await.map_err(WorkspaceError::Persist)?;
        }
        file.flush().await.map_err(WorkspaceError::Persist)?;

        tracing::debug!(path = %target.display(), bytes = total_bytes, "Upload persisted");
        Ok(target)
    }

    async fn destroy(self: Box<Self>) -> Result<(), WorkspaceError> {
        let dir = self.dir;
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| WorkspaceError::Remove(io::Error::other(e)))?
            .map_err(WorkspaceError::Remove)
    }
}

/// Keeps only the final path component of a client-supplied name so the
/// upload cannot escape its workspace.
pub fn safe_file_name(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        FALLBACK_FILE_NAME.to_string()
    } else {
        name.to_string()
    }
}
