//! End-to-end tests of the model processing pipeline against stub tools.

mod helpers;

use forma_core::models::PREVIEW_KEYS;
use forma_core::{DerivedFileKey, ModelMetadata, ProcessingState};
use forma_processing::{MeshLoader, MediaRecordStore, ProcessingError};
use forma_storage::MemoryStorage;
use helpers::stubs::{
    SlicerBehavior, StubLoader, StubRenderer, StubSlicer, WorkbenchWipingRecords, TOOLPATH,
};
use helpers::{PipelineBuilder, CUBE_OBJ};
use std::sync::Arc;

#[tokio::test]
async fn test_happy_path_records_all_artifacts() {
    let pipeline = PipelineBuilder::default().build().await;

    let report = pipeline.processor.process(&pipeline.job).await.unwrap();
    let record = pipeline.record().await;

    assert_eq!(record.processing_state, ProcessingState::Processed);
    assert!(record.queued_source_path.is_none());
    assert!(record.fail_error.is_none());
    assert_eq!(record.derived_files.len(), 7);
    assert!(record.has_previews());
    assert_eq!(record.derived_files, report.derived_files);

    let id = pipeline.job.media_id;
    assert_eq!(
        record.derived_file(DerivedFileKey::Original),
        Some(format!("media_entries/{}/cube.stl", id).as_str())
    );
    assert_eq!(
        record.derived_file(DerivedFileKey::Toolpath),
        Some(format!("media_entries/{}/cube.gcode", id).as_str())
    );
    assert_eq!(
        record.derived_file(DerivedFileKey::Thumb),
        Some(format!("media_entries/{}/cube.thumb.jpg", id).as_str())
    );
    for location in record.derived_files.values() {
        assert!(pipeline.public.has_file(location), "{} not stored", location);
    }

    let metadata = record.media_metadata.unwrap();
    assert!(metadata.blender_thumbs);
    assert_eq!(
        (metadata.center_x, metadata.center_y, metadata.center_z),
        (5.0, 5.0, 5.0)
    );
    assert_eq!(
        (metadata.width, metadata.height, metadata.depth),
        (10.0, 10.0, 10.0)
    );
    assert_eq!(metadata.filament_length, "123.45");
    assert_eq!(metadata.extruded_volume, "4.56");
    assert_eq!(metadata.toolpath_filament_length, 3.0);
    assert_eq!(metadata.layer_count, 2);
    assert!(metadata.estimated_duration_secs > 0.5);
    assert_eq!(metadata.file_type.as_deref(), Some("stl"));

    assert!(pipeline.queue.keys().is_empty(), "queued source not deleted");
    assert!(pipeline.workbench_root_is_empty());
}

#[tokio::test]
async fn test_render_setups_follow_cube_geometry() {
    let renderer = Arc::new(StubRenderer::succeeding());
    let pipeline = PipelineBuilder::default()
        .renderer(renderer.clone())
        .build()
        .await;

    pipeline.processor.process(&pipeline.job).await.unwrap();

    let setups = renderer.setups();
    assert_eq!(setups.len(), 5);
    assert!(setups[0].out_file.ends_with("cube.thumb.jpg"));
    assert_eq!((setups[0].width, setups[0].height), (180, 180));
    assert_eq!(setups[0].camera_coord, [0.0, -15.0, 10.0]);
    assert!(setups[2].out_file.ends_with("cube.top.jpg"));
    assert_eq!(setups[2].camera_coord, [5.0, 5.0, 20.0]);
    for setup in &setups {
        assert_eq!(setup.camera_focus, [5.0, 5.0, 5.0]);
        assert_eq!(setup.camera_clip, 100.0);
        assert_eq!(setup.model_ext, "stl");
    }
}

#[tokio::test]
async fn test_preview_failure_on_third_shot_discards_batch() {
    let renderer = Arc::new(StubRenderer::failing_on(3));
    let pipeline = PipelineBuilder::default()
        .renderer(renderer.clone())
        .build()
        .await;

    let report = pipeline.processor.process(&pipeline.job).await.unwrap();
    let record = pipeline.record().await;

    assert_eq!(renderer.calls(), 3);
    assert_eq!(record.processing_state, ProcessingState::Processed);
    for key in PREVIEW_KEYS {
        assert!(record.derived_file(key).is_none(), "{} recorded", key);
    }
    assert_eq!(record.derived_files.len(), 2);
    assert!(!record.media_metadata.unwrap().blender_thumbs);
    assert!(report.preview_error.is_some());
    assert!(pipeline.public.keys().iter().all(|key| !key.ends_with(".jpg")));
}

#[tokio::test]
async fn test_preview_upload_failure_rolls_back_uploaded_previews() {
    let public = MemoryStorage::new();
    public.fail_writes_ending_with(".top.jpg");
    let pipeline = PipelineBuilder::default()
        .public_storage(public)
        .build()
        .await;

    pipeline.processor.process(&pipeline.job).await.unwrap();
    let record = pipeline.record().await;

    assert_eq!(record.processing_state, ProcessingState::Processed);
    assert!(!record.has_previews());
    assert!(record.derived_file(DerivedFileKey::Thumb).is_none());
    assert!(!record.media_metadata.unwrap().blender_thumbs);
    // thumb and perspective were uploaded before top failed
    assert!(pipeline.public.keys().iter().all(|key| !key.ends_with(".jpg")));
}

#[tokio::test]
async fn test_parallel_previews_keep_batch_semantics() {
    let pipeline = PipelineBuilder::default()
        .parallel_previews()
        .build()
        .await;
    pipeline.processor.process(&pipeline.job).await.unwrap();
    assert!(pipeline.record().await.has_previews());

    let failing = PipelineBuilder::default()
        .parallel_previews()
        .renderer(Arc::new(StubRenderer::failing_on(3)))
        .build()
        .await;
    failing.processor.process(&failing.job).await.unwrap();
    let record = failing.record().await;
    assert!(PREVIEW_KEYS
        .iter()
        .all(|key| record.derived_file(*key).is_none()));
    assert!(!record.media_metadata.unwrap().blender_thumbs);
}

#[tokio::test]
async fn test_geometry_failure_fails_job() {
    let renderer = Arc::new(StubRenderer::succeeding());
    let pipeline = PipelineBuilder::default()
        .loader(StubLoader::Fails)
        .renderer(renderer.clone())
        .build()
        .await;

    let err = pipeline.processor.process(&pipeline.job).await.unwrap_err();
    assert!(matches!(err, ProcessingError::GeometryLoadFailed(_)));

    let record = pipeline.assert_failed_with("GeometryLoadFailed").await;
    assert!(record.derived_files.is_empty());
    assert!(record.media_metadata.is_none());
    assert_eq!(
        record.queued_source_path.as_deref(),
        Some(pipeline.job.queued_source_path.as_str())
    );
    assert_eq!(renderer.calls(), 0);
    assert_eq!(pipeline.queue.keys().len(), 1);
}

#[tokio::test]
async fn test_unsupported_model_with_builtin_loader() {
    let pipeline = PipelineBuilder::default()
        .loader(MeshLoader::new())
        .source("scene.ply", b"ply\nformat ascii 1.0\n")
        .build()
        .await;

    pipeline.processor.process(&pipeline.job).await.unwrap_err();
    let record = pipeline.assert_failed_with("GeometryLoadFailed").await;
    let metadata = record.fail_metadata.unwrap();
    assert_eq!(metadata["code"], "GEOMETRY_LOAD_FAILED");
    assert_eq!(metadata["message"], "Geometry load failed: Unrecognized model format: ply");
}

#[tokio::test]
async fn test_builtin_loader_end_to_end() {
    let pipeline = PipelineBuilder::default()
        .loader(MeshLoader::new())
        .source("Bracket.OBJ", CUBE_OBJ.as_bytes())
        .slicer(StubSlicer::writing("G1 X10 F600\n"))
        .build()
        .await;

    pipeline.processor.process(&pipeline.job).await.unwrap();
    let record = pipeline.record().await;
    let id = pipeline.job.media_id;

    assert_eq!(
        record.derived_file(DerivedFileKey::Original),
        Some(format!("media_entries/{}/Bracket.OBJ", id).as_str())
    );
    assert_eq!(
        record.derived_file(DerivedFileKey::Perspective),
        Some(format!("media_entries/{}/Bracket.perspective.jpg", id).as_str())
    );
    let metadata = record.media_metadata.unwrap();
    assert_eq!(metadata.file_type.as_deref(), Some("obj"));
    assert_eq!(metadata.center_z, 5.0);
    assert_eq!(metadata.layer_count, 0);
    assert!((metadata.estimated_duration_secs - 1.006_666_666_666_666_7).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_toolpath_fails_job() {
    let pipeline = PipelineBuilder::default()
        .slicer(StubSlicer {
            behavior: SlicerBehavior::NoOutput,
        })
        .build()
        .await;

    let err = pipeline.processor.process(&pipeline.job).await.unwrap_err();
    assert!(matches!(err, ProcessingError::ExternalToolOutputMissing { .. }));

    let record = pipeline
        .assert_failed_with("ExternalToolOutputMissing")
        .await;
    assert!(record.derived_file(DerivedFileKey::Toolpath).is_none());
    assert!(record.derived_file(DerivedFileKey::Original).is_none());
    assert!(record.media_metadata.is_none());
    assert!(record.queued_source_path.is_some());
    assert_eq!(
        record.fail_metadata.unwrap()["tool_output"],
        "Segmentation fault (core dumped)"
    );
}

#[tokio::test]
async fn test_slicer_timeout_fails_job() {
    let pipeline = PipelineBuilder::default()
        .slicer(StubSlicer {
            behavior: SlicerBehavior::Timeout,
        })
        .build()
        .await;

    let err = pipeline.processor.process(&pipeline.job).await.unwrap_err();
    assert!(matches!(err, ProcessingError::ExternalToolTimeout { .. }));
    pipeline.assert_failed_with("ExternalToolTimeout").await;
}

#[tokio::test]
async fn test_invalid_toolpath_fails_job() {
    let pipeline = PipelineBuilder::default()
        .slicer(StubSlicer::writing("G1 X10 F600\nG1 Xnan-ish\n"))
        .build()
        .await;

    pipeline.processor.process(&pipeline.job).await.unwrap_err();
    let record = pipeline.assert_failed_with("ToolpathEstimationFailed").await;
    assert!(record.media_metadata.is_none());
}

#[tokio::test]
async fn test_storage_write_failure_keeps_confirmed_writes() {
    let public = MemoryStorage::new();
    public.fail_writes_ending_with("cube.stl");
    let pipeline = PipelineBuilder::default()
        .public_storage(public)
        .build()
        .await;

    let err = pipeline.processor.process(&pipeline.job).await.unwrap_err();
    assert!(matches!(err, ProcessingError::StorageWriteFailed { .. }));

    let record = pipeline.assert_failed_with("StorageWriteFailed").await;
    // Written before the failure and left in place
    assert!(record.derived_file(DerivedFileKey::Toolpath).is_some());
    assert!(record.has_previews());
    assert!(record.derived_file(DerivedFileKey::Original).is_none());
    assert!(record.queued_source_path.is_some());
    assert!(record.media_metadata.is_none());
}

#[tokio::test]
async fn test_missing_queued_source_fails_job() {
    let pipeline = PipelineBuilder::default().build().await;
    for key in pipeline.queue.keys() {
        forma_storage::Storage::delete(&pipeline.queue, &key)
            .await
            .unwrap();
    }

    pipeline.processor.process(&pipeline.job).await.unwrap_err();
    pipeline
        .assert_failed_with("QueuedSourceUnavailable")
        .await;
}

#[tokio::test]
async fn test_rerun_clears_stale_metadata_and_failure() {
    let pipeline = PipelineBuilder::default()
        .slicer(StubSlicer {
            behavior: SlicerBehavior::NoOutput,
        })
        .build()
        .await;
    let id = pipeline.job.media_id;
    let stale = ModelMetadata {
        center_x: 1.0,
        center_y: 1.0,
        center_z: 1.0,
        width: 2.0,
        height: 2.0,
        depth: 2.0,
        filament_length: "999".to_string(),
        extruded_volume: "99".to_string(),
        toolpath_filament_length: 999.0,
        layer_count: 99,
        estimated_duration_secs: 9999.0,
        file_type: Some("stl".to_string()),
        blender_thumbs: true,
    };
    pipeline
        .records
        .set_metadata(id, Some(stale))
        .await
        .unwrap();

    pipeline.processor.process(&pipeline.job).await.unwrap_err();
    let record = pipeline
        .assert_failed_with("ExternalToolOutputMissing")
        .await;
    assert!(record.media_metadata.is_none());

    // A later successful run clears the failure fields.
    let retry = PipelineBuilder::default().build().await;
    retry
        .records
        .set_failure(
            retry.job.media_id,
            Some(forma_processing::record::FailureInfo {
                error: "SlicingFailed".to_string(),
                metadata: serde_json::json!({"message": "old"}),
            }),
        )
        .await
        .unwrap();
    retry.processor.process(&retry.job).await.unwrap();
    let record = retry.record().await;
    assert_eq!(record.processing_state, ProcessingState::Processed);
    assert!(record.fail_error.is_none());
    assert!(record.fail_metadata.is_none());
}

#[tokio::test]
async fn test_rerun_with_failed_previews_drops_previous_previews() {
    let public = MemoryStorage::new();
    public.fail_writes_ending_with("cube.stl");
    let pipeline = PipelineBuilder::default()
        .public_storage(public)
        .build()
        .await;

    pipeline.processor.process(&pipeline.job).await.unwrap_err();
    let record = pipeline.assert_failed_with("StorageWriteFailed").await;
    assert!(record.has_previews());

    let retry = pipeline.processor_with(
        Arc::new(pipeline.records.clone()),
        StubSlicer::writing(TOOLPATH),
        Arc::new(StubRenderer::failing_on(3)),
        MemoryStorage::new(),
    );
    retry.process(&pipeline.job).await.unwrap();

    let record = pipeline.record().await;
    assert_eq!(record.processing_state, ProcessingState::Processed);
    for key in PREVIEW_KEYS {
        assert!(record.derived_file(key).is_none(), "{} survived the rerun", key);
    }
    assert!(!record.media_metadata.as_ref().unwrap().blender_thumbs);
    assert!(record.derived_file(DerivedFileKey::Toolpath).is_some());
    assert!(record.derived_file(DerivedFileKey::Original).is_some());
}

#[tokio::test]
async fn test_rerun_with_failed_slicing_drops_previous_toolpath() {
    let public = MemoryStorage::new();
    public.fail_writes_ending_with("cube.stl");
    let pipeline = PipelineBuilder::default()
        .public_storage(public)
        .build()
        .await;

    pipeline.processor.process(&pipeline.job).await.unwrap_err();
    let record = pipeline.record().await;
    assert!(record.derived_file(DerivedFileKey::Toolpath).is_some());

    let retry = pipeline.processor_with(
        Arc::new(pipeline.records.clone()),
        StubSlicer {
            behavior: SlicerBehavior::NoOutput,
        },
        Arc::new(StubRenderer::succeeding()),
        MemoryStorage::new(),
    );
    retry.process(&pipeline.job).await.unwrap_err();

    let record = pipeline
        .assert_failed_with("ExternalToolOutputMissing")
        .await;
    assert!(record.derived_file(DerivedFileKey::Toolpath).is_none());
    assert!(record.media_metadata.is_none());
}

#[tokio::test]
async fn test_preview_timeout_degrades_batch() {
    let renderer = Arc::new(StubRenderer::timing_out_on(2));
    let pipeline = PipelineBuilder::default()
        .renderer(renderer.clone())
        .build()
        .await;

    let report = pipeline.processor.process(&pipeline.job).await.unwrap();
    let record = pipeline.record().await;

    assert_eq!(renderer.calls(), 2);
    assert_eq!(record.processing_state, ProcessingState::Processed);
    assert!(record.fail_error.is_none());
    assert!(!record.has_previews());
    for key in PREVIEW_KEYS {
        assert!(record.derived_file(key).is_none(), "{} recorded", key);
    }
    assert!(!record.media_metadata.unwrap().blender_thumbs);
    assert!(report.preview_error.unwrap().contains("did not finish"));
}

#[tokio::test]
async fn test_workbench_cleanup_failure_does_not_fail_job() {
    let pipeline = PipelineBuilder::default().build().await;
    let records = WorkbenchWipingRecords {
        inner: pipeline.records.clone(),
        workbench_root: pipeline.workbench_root.path().to_path_buf(),
    };
    let processor = pipeline.processor_with(
        Arc::new(records),
        StubSlicer::writing(TOOLPATH),
        Arc::new(StubRenderer::succeeding()),
        MemoryStorage::new(),
    );

    let report = processor.process(&pipeline.job).await.unwrap();
    let record = pipeline.record().await;

    assert_eq!(record.processing_state, ProcessingState::Processed);
    assert!(record.fail_error.is_none());
    assert_eq!(report.derived_files.len(), 7);
    assert!(pipeline.workbench_root_is_empty());
}
