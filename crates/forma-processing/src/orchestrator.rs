//! Model processing orchestration: materialize → inspect → render → slice → publish.
//!
//! One call to [`ModelProcessor::process`] handles one queued upload end to end.
//! The record always ends in `processed` or `failed`; the workbench is released on
//! every path.

use forma_core::models::PREVIEW_KEYS;
use forma_core::{
    DerivedFileKey, ErrorMetadata, ModelMetadata, ProcessingState, ProcessorSettings,
};
use forma_storage::keys::{key_filename, public_file_key};
use forma_storage::Storage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::camera::{preview_shots, RenderSizes};
use crate::error::ProcessingError;
use crate::filename::FilenameBuilder;
use crate::gcode::{GcodeEstimate, GcodeEstimator};
use crate::geometry::{GeometryLoader, ModelGeometry};
use crate::record::{FailureInfo, MediaRecordStore};
use crate::render::{RenderSetup, Renderer};
use crate::slicer::{SliceReport, Slicer, SlicerSettings};
use crate::workbench::Workbench;

/// Explicit configuration for a [`ModelProcessor`].
#[derive(Clone)]
pub struct ModelProcessorConfig {
    pub queue_storage: Arc<dyn Storage>,
    pub public_storage: Arc<dyn Storage>,
    pub render_sizes: RenderSizes,
    pub slicer_settings: SlicerSettings,
    /// Parent directory for workbenches; system temp dir when `None`.
    pub workbench_root: Option<PathBuf>,
    /// Render the five previews concurrently.
    pub parallel_previews: bool,
}

impl ModelProcessorConfig {
    pub fn new(queue_storage: Arc<dyn Storage>, public_storage: Arc<dyn Storage>) -> Self {
        Self {
            queue_storage,
            public_storage,
            render_sizes: RenderSizes::default(),
            slicer_settings: SlicerSettings::default(),
            workbench_root: None,
            parallel_previews: false,
        }
    }

    /// Apply sizes and workbench settings from the loaded configuration.
    pub fn with_settings(mut self, settings: &ProcessorSettings) -> Self {
        self.render_sizes = RenderSizes::from(settings);
        self.workbench_root = settings.workbench_dir.as_ref().map(PathBuf::from);
        self.parallel_previews = settings.parallel_previews;
        self
    }
}

/// One unit of work handed over by the task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingJob {
    pub media_id: Uuid,
    pub queued_source_path: String,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ProcessingReport {
    pub media_id: Uuid,
    pub derived_files: BTreeMap<DerivedFileKey, String>,
    pub metadata: ModelMetadata,
    pub estimate: GcodeEstimate,
    /// Set when the preview batch was discarded.
    pub preview_error: Option<String>,
}

/// Drives the processing state machine for one media record at a time.
pub struct ModelProcessor {
    config: ModelProcessorConfig,
    records: Arc<dyn MediaRecordStore>,
    loader: Arc<dyn GeometryLoader>,
    slicer: Arc<dyn Slicer>,
    renderer: Arc<dyn Renderer>,
}

/// State carried from one step to the next.
struct RunContext<'a> {
    media_id: Uuid,
    workbench: &'a Workbench,
    source: PathBuf,
    extension: Option<String>,
    names: FilenameBuilder,
    derived_files: BTreeMap<DerivedFileKey, String>,
}

impl ModelProcessor {
    pub fn new(
        config: ModelProcessorConfig,
        records: Arc<dyn MediaRecordStore>,
        loader: Arc<dyn GeometryLoader>,
        slicer: Arc<dyn Slicer>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            config,
            records,
            loader,
            slicer,
            renderer,
        }
    }

    /// Process one queued upload.
    ///
    /// On failure the record is marked `failed` before the error is returned.
    #[tracing::instrument(skip(self, job), fields(media_id = %job.media_id))]
    pub async fn process(
        &self,
        job: &ProcessingJob,
    ) -> Result<ProcessingReport, ProcessingError> {
        let media_id = job.media_id;
        let start = Instant::now();
        tracing::info!(
            media_id = %media_id,
            key = %job.queued_source_path,
            "Starting model processing"
        );

        if let Err(e) = self
            .records
            .set_state(media_id, ProcessingState::Processing)
            .await
        {
            return Err(self
                .fail(media_id, ProcessingError::RecordUpdateFailed(e.to_string()))
                .await);
        }

        let workbench = match Workbench::acquire(self.config.workbench_root.as_deref()) {
            Ok(workbench) => workbench,
            Err(e) => return Err(self.fail(media_id, e).await),
        };

        let result = self.run(job, &workbench).await;

        if let Err(e) = workbench.release() {
            e.log(media_id);
        }

        match result {
            Ok(report) => {
                tracing::info!(
                    media_id = %media_id,
                    derived_files = report.derived_files.len(),
                    layer_count = report.estimate.layer_count,
                    estimated_duration_secs = report.estimate.duration_secs,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Model processing completed"
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(media_id, e).await),
        }
    }

    async fn run(
        &self,
        job: &ProcessingJob,
        workbench: &Workbench,
    ) -> Result<ProcessingReport, ProcessingError> {
        let media_id = job.media_id;

        // Start: nothing from an earlier run may outlive this one's outcome.
        self.records
            .set_failure(media_id, None)
            .await
            .map_err(record_error)?;
        self.records
            .set_metadata(media_id, None)
            .await
            .map_err(record_error)?;
        for key in PREVIEW_KEYS.into_iter().chain([DerivedFileKey::Toolpath]) {
            self.records
                .remove_derived_file(media_id, key)
                .await
                .map_err(record_error)?;
        }

        let local_name = key_filename(&job.queued_source_path).to_string();
        let source = workbench
            .materialize(
                self.config.queue_storage.as_ref(),
                &job.queued_source_path,
                &local_name,
            )
            .await?;
        let mut ctx = RunContext {
            media_id,
            workbench,
            source,
            extension: derive_extension(&local_name),
            names: FilenameBuilder::new(&local_name),
            derived_files: BTreeMap::new(),
        };

        // GeometryLoaded
        let geometry = self
            .loader
            .load(&ctx.source, ctx.extension.as_deref())
            .await?;
        tracing::info!(
            media_id = %media_id,
            width = geometry.width,
            height = geometry.height,
            depth = geometry.depth,
            file_type = ?ctx.extension,
            "Model geometry loaded"
        );

        // PreviewsAttempted
        let preview_error = match self.render_previews(&ctx, &geometry).await {
            Ok(previews) => {
                for (key, location) in previews {
                    self.record_derived_file(&mut ctx, key, location).await?;
                }
                None
            }
            Err(e) => {
                tracing::warn!(
                    media_id = %media_id,
                    error_kind = e.error_kind(),
                    error = %e,
                    "Preview batch failed, continuing without previews"
                );
                Some(ProcessingError::PreviewBatchFailed(e.to_string()).to_string())
            }
        };
        let blender_thumbs = preview_error.is_none();

        // Sliced
        let (slice_report, estimate) = self.slice_and_estimate(&mut ctx).await?;

        // Finalized
        let original_name = ctx.names.fill("{basename}{ext}");
        let original_key = public_file_key(media_id, &original_name);
        let content_type = model_content_type(ctx.extension.as_deref());
        self.publish(&ctx.source, &original_key, content_type).await?;
        self.record_derived_file(&mut ctx, DerivedFileKey::Original, original_key)
            .await?;

        if let Err(e) = self
            .config
            .queue_storage
            .delete(&job.queued_source_path)
            .await
        {
            tracing::warn!(
                media_id = %media_id,
                key = %job.queued_source_path,
                error = %e,
                "Failed to delete queued source"
            );
        }
        self.records
            .clear_queued_source(media_id)
            .await
            .map_err(record_error)?;

        let metadata = ModelMetadata {
            center_x: geometry.centroid[0],
            center_y: geometry.centroid[1],
            center_z: geometry.centroid[2],
            width: geometry.width,
            height: geometry.height,
            depth: geometry.depth,
            filament_length: slice_report.filament_length,
            extruded_volume: slice_report.extruded_volume,
            toolpath_filament_length: estimate.filament_mm,
            layer_count: estimate.layer_count,
            estimated_duration_secs: estimate.duration_secs,
            file_type: ctx.extension.clone(),
            blender_thumbs,
        };
        self.records
            .set_metadata(media_id, Some(metadata.clone()))
            .await
            .map_err(record_error)?;
        self.records
            .set_state(media_id, ProcessingState::Processed)
            .await
            .map_err(record_error)?;

        Ok(ProcessingReport {
            media_id,
            derived_files: ctx.derived_files,
            metadata,
            estimate,
            preview_error,
        })
    }

    /// Render all five shots, then publish them. Nothing is kept unless every shot
    /// was rendered and uploaded.
    async fn render_previews(
        &self,
        ctx: &RunContext<'_>,
        geometry: &ModelGeometry,
    ) -> Result<Vec<(DerivedFileKey, String)>, ProcessingError> {
        let model_ext = ctx.extension.clone().unwrap_or_default();
        let planned: Vec<(DerivedFileKey, PathBuf, RenderSetup)> =
            preview_shots(geometry, &self.config.render_sizes)
                .into_iter()
                .map(|shot| {
                    let out_file = ctx
                        .workbench
                        .path_for(&ctx.names.fill(shot.filename_template));
                    let setup =
                        shot.render_setup(geometry, &ctx.source, &model_ext, &out_file);
                    (shot.key, out_file, setup)
                })
                .collect();

        if self.config.parallel_previews {
            futures::future::try_join_all(
                planned
                    .iter()
                    .map(|(_, _, setup)| self.renderer.render(setup)),
            )
            .await?;
        } else {
            for (_, _, setup) in &planned {
                self.renderer.render(setup).await?;
            }
        }

        let mut published: Vec<(DerivedFileKey, String)> = Vec::with_capacity(planned.len());
        for (key, out_file, _) in &planned {
            let storage_key = public_file_key(ctx.media_id, &file_name_of(out_file));
            if let Err(e) = self.publish(out_file, &storage_key, "image/jpeg").await {
                for (_, uploaded) in &published {
                    if let Err(delete_err) = self.config.public_storage.delete(uploaded).await {
                        tracing::warn!(
                            media_id = %ctx.media_id,
                            key = %uploaded,
                            error = %delete_err,
                            "Failed to remove partial preview"
                        );
                    }
                }
                return Err(e);
            }
            published.push((*key, storage_key));
        }

        tracing::info!(media_id = %ctx.media_id, "Preview batch rendered");
        Ok(published)
    }

    async fn slice_and_estimate(
        &self,
        ctx: &mut RunContext<'_>,
    ) -> Result<(SliceReport, GcodeEstimate), ProcessingError> {
        let toolpath_name = ctx.names.fill("{basename}.gcode");
        let toolpath_path = ctx.workbench.path_for(&toolpath_name);

        let report = self
            .slicer
            .slice(&ctx.source, &toolpath_path, &self.config.slicer_settings)
            .await?;

        if !tokio::fs::try_exists(&toolpath_path).await.unwrap_or(false) {
            return Err(ProcessingError::ExternalToolOutputMissing {
                tool: "slic3r".to_string(),
                path: toolpath_path.to_string_lossy().to_string(),
                tool_output: Some(report.tool_output),
            });
        }

        let estimate = GcodeEstimator::estimate_file(&toolpath_path).await?;
        tracing::info!(
            media_id = %ctx.media_id,
            layer_count = estimate.layer_count,
            estimated_duration_secs = estimate.duration_secs,
            summary = %estimate.summary(),
            "Toolpath estimated"
        );

        let toolpath_key = public_file_key(ctx.media_id, &toolpath_name);
        self.publish(&toolpath_path, &toolpath_key, "text/x-gcode")
            .await?;
        self.record_derived_file(ctx, DerivedFileKey::Toolpath, toolpath_key)
            .await?;

        Ok((report, estimate))
    }

    /// Copy a workbench file to public storage.
    async fn publish(
        &self,
        local_path: &Path,
        storage_key: &str,
        content_type: &str,
    ) -> Result<(), ProcessingError> {
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| ProcessingError::WorkbenchUnavailable(e.to_string()))?;

        self.config
            .public_storage
            .put_stream(storage_key, content_type, Box::pin(file))
            .await
            .map_err(|e| ProcessingError::StorageWriteFailed {
                key: storage_key.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn record_derived_file(
        &self,
        ctx: &mut RunContext<'_>,
        key: DerivedFileKey,
        location: String,
    ) -> Result<(), ProcessingError> {
        self.records
            .set_derived_file(ctx.media_id, key, &location)
            .await
            .map_err(record_error)?;
        ctx.derived_files.insert(key, location);
        Ok(())
    }

    /// Mark the record failed; returns the error for propagation.
    async fn fail(&self, media_id: Uuid, error: ProcessingError) -> ProcessingError {
        error.log(media_id);

        let failure = FailureInfo {
            error: error.error_kind().to_string(),
            metadata: error.fail_metadata(),
        };
        if let Err(e) = self.records.set_failure(media_id, Some(failure)).await {
            tracing::error!(
                media_id = %media_id,
                error = %e,
                "Failed to record processing failure"
            );
        }
        if let Err(e) = self
            .records
            .set_state(media_id, ProcessingState::Failed)
            .await
        {
            tracing::error!(
                media_id = %media_id,
                error = %e,
                "Failed to mark record as failed"
            );
        }
        error
    }
}

fn record_error(e: anyhow::Error) -> ProcessingError {
    ProcessingError::RecordUpdateFailed(e.to_string())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Lower-cased extension of `filename` if it is exactly 3 alphanumeric characters.
pub fn derive_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.trim().rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if ext.len() == 3 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}

fn model_content_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("stl") => "model/stl",
        Some("obj") => "model/obj",
        _ => "application/octet-stream",
    }
}
