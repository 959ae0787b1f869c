//! Render adapter (Blender)
//!
//! Blender runs headless against a prepared scene (`blend_file`) and a script
//! (`blend_script`) that reads the shot description from the `RENDER_SETUP`
//! environment variable.

use async_trait::async_trait;
use forma_core::ProcessorSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::camera::Projection;
use crate::error::ProcessingError;
use crate::tool::run_tool;

/// Shot description handed to the render script as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSetup {
    pub model_path: String,
    pub model_ext: String,
    pub camera_coord: [f64; 3],
    pub camera_focus: [f64; 3],
    pub camera_clip: f64,
    pub greatest: f64,
    pub projection: Projection,
    pub width: u32,
    pub height: u32,
    pub out_file: String,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render one image to `setup.out_file`.
    ///
    /// Success means the output file exists afterwards, whatever the tool's exit
    /// status was.
    async fn render(&self, setup: &RenderSetup) -> Result<(), ProcessingError>;
}

#[derive(Debug, Clone)]
pub struct BlenderRenderer {
    blender_path: String,
    blend_file: String,
    blend_script: String,
    display: String,
    timeout: Duration,
}

impl BlenderRenderer {
    pub fn new(
        blender_path: impl Into<String>,
        blend_file: impl Into<String>,
        blend_script: impl Into<String>,
        display: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            blender_path: blender_path.into(),
            blend_file: blend_file.into(),
            blend_script: blend_script.into(),
            display: display.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &ProcessorSettings) -> Self {
        Self::new(
            settings.blender_path.clone(),
            settings.blend_file.clone(),
            settings.blend_script.clone(),
            settings.render_display.clone(),
            Duration::from_secs(settings.external_tool_timeout_secs),
        )
    }

    fn command(&self, setup_json: &str) -> Command {
        let mut command = Command::new(&self.blender_path);
        command
            .arg("-b")
            .arg(&self.blend_file)
            .arg("-F")
            .arg("JPEG")
            .arg("-P")
            .arg(&self.blend_script)
            .env("RENDER_SETUP", setup_json)
            .env("DISPLAY", &self.display);
        command
    }
}

#[async_trait]
impl Renderer for BlenderRenderer {
    #[tracing::instrument(skip(self, setup), fields(out_file = %setup.out_file))]
    async fn render(&self, setup: &RenderSetup) -> Result<(), ProcessingError> {
        let setup_json = serde_json::to_string(setup).map_err(|e| {
            ProcessingError::PreviewBatchFailed(format!("Failed to encode render setup: {}", e))
        })?;

        let output = run_tool("blender", self.command(&setup_json), self.timeout).await?;

        let exists = tokio::fs::try_exists(Path::new(&setup.out_file))
            .await
            .unwrap_or(false);
        if !exists {
            return Err(ProcessingError::ExternalToolOutputMissing {
                tool: "blender".to_string(),
                path: setup.out_file.clone(),
                tool_output: Some(output.combined()),
            });
        }

        tracing::debug!(exit_code = output.status.code(), "Render finished");
        Ok(())
    }
}
