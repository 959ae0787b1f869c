//! Error metadata module
//!
//! Errors raised while processing a media record describe themselves through
//! [`ErrorMetadata`]: the kind identifier written to `fail_error`, a machine
//! readable code, whether the error aborts the job, and the level it is logged at.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected conditions
    Debug,
    /// Warning level - for degradations the job survives
    Warn,
    /// Error level - for failures that abort the job
    Error,
}

/// Self-description implemented by every processing error.
pub trait ErrorMetadata {
    /// Error kind identifier (e.g. "GeometryLoadFailed"), stored in `fail_error`
    fn error_kind(&self) -> &'static str;

    /// Machine-readable error code (e.g. "GEOMETRY_LOAD_FAILED")
    fn error_code(&self) -> &'static str;

    /// Whether this error aborts the processing job
    fn is_fatal(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;

    /// Diagnostic output captured from an external tool, if any
    fn tool_output(&self) -> Option<&str> {
        None
    }
}
