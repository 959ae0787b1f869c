//! Bounded execution of external tools.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::ProcessingError;

/// Captured result of an external tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Run `command` to completion, killing it if it exceeds `timeout`.
///
/// The exit status is returned, not judged; callers decide what success means.
pub async fn run_tool(
    tool: &str,
    mut command: Command,
    timeout: Duration,
) -> Result<ToolOutput, ProcessingError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ProcessingError::ExternalToolLaunchFailed {
                tool: tool.to_string(),
                message: e.to_string(),
            })
        }
        Err(_) => {
            tracing::error!(
                tool = %tool,
                timeout_secs = timeout.as_secs(),
                "External tool timed out"
            );
            return Err(ProcessingError::ExternalToolTimeout {
                tool: tool.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
    };

    tracing::debug!(
        tool = %tool,
        exit_code = output.status.code(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "External tool finished"
    );

    Ok(ToolOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
