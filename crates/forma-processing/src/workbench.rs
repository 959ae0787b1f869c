//! Scoped local staging directory for one processing run.

use forma_storage::Storage;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use crate::error::ProcessingError;

/// Exclusively owned temporary directory.
///
/// The directory is deleted by [`Workbench::release`]; if a run unwinds before
/// reaching it, dropping the workbench removes the tree as well.
#[derive(Debug)]
pub struct Workbench {
    dir: TempDir,
}

impl Workbench {
    /// Create a fresh directory under `root`, or under the system temp dir.
    pub fn acquire(root: Option<&Path>) -> Result<Self, ProcessingError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("forma-workbench-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| ProcessingError::WorkbenchUnavailable(e.to_string()))?;

        tracing::debug!(path = %dir.path().display(), "Workbench acquired");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Location of `name` inside the workbench. Directory components are dropped.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "file".into());
        self.dir.path().join(file_name)
    }

    /// Copy the object at `storage_key` into the workbench as `local_name`.
    pub async fn materialize(
        &self,
        storage: &dyn Storage,
        storage_key: &str,
        local_name: &str,
    ) -> Result<PathBuf, ProcessingError> {
        let local_path = self.path_for(local_name);

        let mut stream = storage
            .get_stream(storage_key)
            .await
            .map_err(|e| ProcessingError::QueuedSourceUnavailable(e.to_string()))?;

        let mut file = tokio::fs::File::create(&local_path)
            .await
            .map_err(|e| ProcessingError::WorkbenchUnavailable(e.to_string()))?;

        let mut size_bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProcessingError::QueuedSourceUnavailable(e.to_string()))?;
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| ProcessingError::WorkbenchUnavailable(e.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|e| ProcessingError::WorkbenchUnavailable(e.to_string()))?;

        tracing::debug!(
            key = %storage_key,
            path = %local_path.display(),
            size_bytes = size_bytes,
            "Materialized remote file"
        );

        Ok(local_path)
    }

    /// Delete the whole directory tree.
    pub fn release(self) -> Result<(), ProcessingError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            ProcessingError::WorkbenchCleanupFailed(format!("{}: {}", path.display(), e))
        })
    }
}
