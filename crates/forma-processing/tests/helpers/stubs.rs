//! Stand-ins for the external collaborators of the pipeline.

use async_trait::async_trait;
use forma_core::{DerivedFileKey, ModelMetadata, ProcessingState};
use forma_processing::record::FailureInfo;
use forma_processing::{
    GeometryError, GeometryLoader, InMemoryMediaRecords, MediaRecordStore, ModelGeometry,
    ProcessingError, RenderSetup, Renderer, SliceReport, Slicer, SlicerSettings,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// 10 x 10 x 10 cube centred on (5, 5, 5).
pub fn cube_geometry() -> ModelGeometry {
    ModelGeometry {
        width: 10.0,
        height: 10.0,
        depth: 10.0,
        centroid: [5.0, 5.0, 5.0],
    }
}

pub enum StubLoader {
    Returns(ModelGeometry),
    Fails,
}

#[async_trait]
impl GeometryLoader for StubLoader {
    async fn load(
        &self,
        _path: &Path,
        extension: Option<&str>,
    ) -> Result<ModelGeometry, GeometryError> {
        match self {
            StubLoader::Returns(geometry) => Ok(*geometry),
            StubLoader::Fails => Err(GeometryError::UnrecognizedFormat(
                extension.map(str::to_string),
            )),
        }
    }
}

pub const TOOLPATH: &str = "\
M83
G1 Z0.25 F600
G1 X10 E1.5
G4 P500
G1 Z0.5
G1 X0 E1.5
";

pub enum SlicerBehavior {
    /// Write `toolpath` and report 123.45 mm / 4.56 cm3.
    Writes(&'static str),
    /// Report success but leave no output file.
    NoOutput,
    Timeout,
}

pub struct StubSlicer {
    pub behavior: SlicerBehavior,
}

impl StubSlicer {
    pub fn writing(toolpath: &'static str) -> Self {
        Self {
            behavior: SlicerBehavior::Writes(toolpath),
        }
    }
}

#[async_trait]
impl Slicer for StubSlicer {
    async fn slice(
        &self,
        _input: &Path,
        output: &Path,
        _settings: &SlicerSettings,
    ) -> Result<SliceReport, ProcessingError> {
        match self.behavior {
            SlicerBehavior::Writes(toolpath) => {
                tokio::fs::write(output, toolpath).await.unwrap();
            }
            SlicerBehavior::NoOutput => {}
            SlicerBehavior::Timeout => {
                return Err(ProcessingError::ExternalToolTimeout {
                    tool: "slic3r".to_string(),
                    timeout_secs: 600,
                })
            }
        }
        Ok(SliceReport {
            filament_length: "123.45".to_string(),
            extruded_volume: "4.56".to_string(),
            tool_output: "Segmentation fault (core dumped)".to_string(),
        })
    }
}

#[derive(Clone, Copy)]
pub enum RenderFault {
    /// Return without writing the image.
    OutputMissing,
    /// Report that the renderer hit its time limit.
    Timeout,
}

/// Writes a placeholder image for every shot, optionally failing the n-th call.
#[derive(Default)]
pub struct StubRenderer {
    fail_on_call: Option<(usize, RenderFault)>,
    calls: AtomicUsize,
    setups: Mutex<Vec<RenderSetup>>,
}

impl StubRenderer {
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Fail the `call`-th render (1-based).
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some((call, RenderFault::OutputMissing)),
            ..Self::default()
        }
    }

    /// Time out on the `call`-th render (1-based).
    pub fn timing_out_on(call: usize) -> Self {
        Self {
            fail_on_call: Some((call, RenderFault::Timeout)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn setups(&self) -> Vec<RenderSetup> {
        self.setups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, setup: &RenderSetup) -> Result<(), ProcessingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.setups.lock().unwrap().push(setup.clone());
        match self.fail_on_call {
            Some((n, RenderFault::OutputMissing)) if n == call => {
                return Err(ProcessingError::ExternalToolOutputMissing {
                    tool: "blender".to_string(),
                    path: setup.out_file.clone(),
                    tool_output: None,
                });
            }
            Some((n, RenderFault::Timeout)) if n == call => {
                return Err(ProcessingError::ExternalToolTimeout {
                    tool: "blender".to_string(),
                    timeout_secs: 600,
                });
            }
            _ => {}
        }
        tokio::fs::write(&setup.out_file, b"\xff\xd8\xff\xe0jpeg")
            .await
            .unwrap();
        Ok(())
    }
}

/// Record store that deletes every workbench under `workbench_root` as soon as a
/// record reaches `processed`, so the final cleanup finds nothing to remove.
pub struct WorkbenchWipingRecords {
    pub inner: InMemoryMediaRecords,
    pub workbench_root: PathBuf,
}

#[async_trait]
impl MediaRecordStore for WorkbenchWipingRecords {
    async fn set_state(
        &self,
        media_id: uuid::Uuid,
        state: ProcessingState,
    ) -> anyhow::Result<()> {
        if state == ProcessingState::Processed {
            for entry in std::fs::read_dir(&self.workbench_root)? {
                std::fs::remove_dir_all(entry?.path())?;
            }
        }
        self.inner.set_state(media_id, state).await
    }

    async fn set_metadata(
        &self,
        media_id: uuid::Uuid,
        metadata: Option<ModelMetadata>,
    ) -> anyhow::Result<()> {
        self.inner.set_metadata(media_id, metadata).await
    }

    async fn set_derived_file(
        &self,
        media_id: uuid::Uuid,
        key: DerivedFileKey,
        location: &str,
    ) -> anyhow::Result<()> {
        self.inner.set_derived_file(media_id, key, location).await
    }

    async fn remove_derived_file(
        &self,
        media_id: uuid::Uuid,
        key: DerivedFileKey,
    ) -> anyhow::Result<()> {
        self.inner.remove_derived_file(media_id, key).await
    }

    async fn clear_queued_source(&self, media_id: uuid::Uuid) -> anyhow::Result<()> {
        self.inner.clear_queued_source(media_id).await
    }

    async fn set_failure(
        &self,
        media_id: uuid::Uuid,
        failure: Option<FailureInfo>,
    ) -> anyhow::Result<()> {
        self.inner.set_failure(media_id, failure).await
    }
}
