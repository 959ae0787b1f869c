//! Processing error taxonomy
//!
//! Every failure the pipeline can observe maps to one [`ProcessingError`] variant.
//! Fatal variants end the job with the record in `failed`; the two non-fatal ones
//! (`PreviewBatchFailed`, `WorkbenchCleanupFailed`) are only logged.

use forma_core::{ErrorMetadata, LogLevel};
use serde_json::{json, Value as JsonValue};

use crate::geometry::GeometryError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Queued source unavailable: {0}")]
    QueuedSourceUnavailable(String),

    #[error("Workbench unavailable: {0}")]
    WorkbenchUnavailable(String),

    #[error("Geometry load failed: {0}")]
    GeometryLoadFailed(#[from] GeometryError),

    #[error("Preview batch failed: {0}")]
    PreviewBatchFailed(String),

    #[error("Slicing failed: {message}")]
    SlicingFailed {
        message: String,
        tool_output: Option<String>,
    },

    #[error("{tool} produced no output at {path}")]
    ExternalToolOutputMissing {
        tool: String,
        path: String,
        tool_output: Option<String>,
    },

    #[error("Failed to launch {tool}: {message}")]
    ExternalToolLaunchFailed { tool: String, message: String },

    #[error("{tool} did not finish within {timeout_secs}s")]
    ExternalToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Toolpath estimation failed: {0}")]
    ToolpathEstimationFailed(String),

    #[error("Storage write failed for {key}: {message}")]
    StorageWriteFailed { key: String, message: String },

    #[error("Record update failed: {0}")]
    RecordUpdateFailed(String),

    #[error("Workbench cleanup failed: {0}")]
    WorkbenchCleanupFailed(String),
}

/// Static metadata for each variant: (kind, code, fatal, log_level).
fn processing_error_static_metadata(
    err: &ProcessingError,
) -> (&'static str, &'static str, bool, LogLevel) {
    match err {
        ProcessingError::QueuedSourceUnavailable(_) => (
            "QueuedSourceUnavailable",
            "QUEUED_SOURCE_UNAVAILABLE",
            true,
            LogLevel::Error,
        ),
        ProcessingError::WorkbenchUnavailable(_) => (
            "WorkbenchUnavailable",
            "WORKBENCH_UNAVAILABLE",
            true,
            LogLevel::Error,
        ),
        ProcessingError::GeometryLoadFailed(_) => (
            "GeometryLoadFailed",
            "GEOMETRY_LOAD_FAILED",
            true,
            LogLevel::Error,
        ),
        ProcessingError::PreviewBatchFailed(_) => (
            "PreviewBatchFailed",
            "PREVIEW_BATCH_FAILED",
            false,
            LogLevel::Warn,
        ),
        ProcessingError::SlicingFailed { .. } => {
            ("SlicingFailed", "SLICING_FAILED", true, LogLevel::Error)
        }
        ProcessingError::ExternalToolOutputMissing { .. } => (
            "ExternalToolOutputMissing",
            "EXTERNAL_TOOL_OUTPUT_MISSING",
            true,
            LogLevel::Error,
        ),
        ProcessingError::ExternalToolLaunchFailed { .. } => (
            "ExternalToolLaunchFailed",
            "EXTERNAL_TOOL_LAUNCH_FAILED",
            true,
            LogLevel::Error,
        ),
        ProcessingError::ExternalToolTimeout { .. } => (
            "ExternalToolTimeout",
            "EXTERNAL_TOOL_TIMEOUT",
            true,
            LogLevel::Error,
        ),
        ProcessingError::ToolpathEstimationFailed(_) => (
            "ToolpathEstimationFailed",
            "TOOLPATH_ESTIMATION_FAILED",
            true,
            LogLevel::Error,
        ),
        ProcessingError::StorageWriteFailed { .. } => (
            "StorageWriteFailed",
            "STORAGE_WRITE_FAILED",
            true,
            LogLevel::Error,
        ),
        ProcessingError::RecordUpdateFailed(_) => (
            "RecordUpdateFailed",
            "RECORD_UPDATE_FAILED",
            true,
            LogLevel::Error,
        ),
        ProcessingError::WorkbenchCleanupFailed(_) => (
            "WorkbenchCleanupFailed",
            "WORKBENCH_CLEANUP_FAILED",
            false,
            LogLevel::Warn,
        ),
    }
}

impl ErrorMetadata for ProcessingError {
    fn error_kind(&self) -> &'static str {
        processing_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        processing_error_static_metadata(self).1
    }

    fn is_fatal(&self) -> bool {
        processing_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        processing_error_static_metadata(self).3
    }

    fn tool_output(&self) -> Option<&str> {
        match self {
            ProcessingError::SlicingFailed { tool_output, .. }
            | ProcessingError::ExternalToolOutputMissing { tool_output, .. } => {
                tool_output.as_deref()
            }
            _ => None,
        }
    }
}

impl ProcessingError {
    /// Diagnostic payload written to `fail_metadata` when this error fails a job.
    pub fn fail_metadata(&self) -> JsonValue {
        let mut metadata = json!({
            "message": self.to_string(),
            "code": self.error_code(),
        });
        if let (Some(output), Some(map)) = (self.tool_output(), metadata.as_object_mut()) {
            map.insert("tool_output".to_string(), JsonValue::from(output));
        }
        metadata
    }

    /// Emit this error at its configured level.
    pub fn log(&self, media_id: uuid::Uuid) {
        match self.log_level() {
            LogLevel::Debug => tracing::debug!(
                media_id = %media_id,
                error_kind = self.error_kind(),
                error = %self,
                "Processing error"
            ),
            LogLevel::Warn => tracing::warn!(
                media_id = %media_id,
                error_kind = self.error_kind(),
                error = %self,
                "Processing degraded"
            ),
            LogLevel::Error => tracing::error!(
                media_id = %media_id,
                error_kind = self.error_kind(),
                error = %self,
                "Processing failed"
            ),
        }
    }
}
