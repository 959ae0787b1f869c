//! Test helpers: wire a ModelProcessor to in-memory stores and stub tools.
//!
//! Run from workspace root: `cargo test -p forma-processing --test pipeline_test`.

#![allow(dead_code)]

pub mod stubs;

use forma_core::{MediaRecord, ProcessingState};
use forma_processing::{
    GeometryLoader, InMemoryMediaRecords, MediaRecordStore, ModelProcessor,
    ModelProcessorConfig, ProcessingJob, Renderer, Slicer,
};
use forma_storage::{queued_file_key, MemoryStorage, Storage};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use stubs::{cube_geometry, StubLoader, StubRenderer, StubSlicer, TOOLPATH};

pub const CUBE_OBJ: &str = "\
v 0 0 0
v 10 0 0
v 10 10 0
v 0 10 0
v 0 0 10
v 10 0 10
v 10 10 10
v 0 10 10
f 1 2 3 4
f 5 6 7 8
";

/// Collaborators for one pipeline under test.
pub struct PipelineBuilder {
    loader: Arc<dyn GeometryLoader>,
    slicer: Arc<dyn Slicer>,
    renderer: Arc<dyn Renderer>,
    public: MemoryStorage,
    parallel_previews: bool,
    source_name: String,
    source_bytes: Vec<u8>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            loader: Arc::new(StubLoader::Returns(cube_geometry())),
            slicer: Arc::new(StubSlicer::writing(TOOLPATH)),
            renderer: Arc::new(StubRenderer::succeeding()),
            public: MemoryStorage::new(),
            parallel_previews: false,
            source_name: "cube.stl".to_string(),
            source_bytes: b"solid cube\nendsolid cube\n".to_vec(),
        }
    }
}

impl PipelineBuilder {
    pub fn loader(mut self, loader: impl GeometryLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn slicer(mut self, slicer: impl Slicer + 'static) -> Self {
        self.slicer = Arc::new(slicer);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn public_storage(mut self, public: MemoryStorage) -> Self {
        self.public = public;
        self
    }

    pub fn parallel_previews(mut self) -> Self {
        self.parallel_previews = true;
        self
    }

    pub fn source(mut self, name: &str, bytes: &[u8]) -> Self {
        self.source_name = name.to_string();
        self.source_bytes = bytes.to_vec();
        self
    }

    /// Queue the source file, create the record and build the processor.
    pub async fn build(self) -> TestPipeline {
        let queue = MemoryStorage::new();
        let queued_key = queued_file_key(&self.source_name);
        queue
            .put(&queued_key, self.source_bytes, "application/octet-stream")
            .await
            .unwrap();

        let media_id = Uuid::new_v4();
        let records = InMemoryMediaRecords::new();
        records
            .insert(MediaRecord::new_queued(media_id, queued_key.clone()))
            .await;

        let workbench_root = tempfile::tempdir().unwrap();
        let mut config =
            ModelProcessorConfig::new(Arc::new(queue.clone()), Arc::new(self.public.clone()));
        config.workbench_root = Some(workbench_root.path().to_path_buf());
        config.parallel_previews = self.parallel_previews;

        let processor = ModelProcessor::new(
            config,
            Arc::new(records.clone()),
            self.loader,
            self.slicer,
            self.renderer,
        );

        TestPipeline {
            processor,
            records,
            queue,
            public: self.public,
            workbench_root,
            job: ProcessingJob {
                media_id,
                queued_source_path: queued_key,
            },
        }
    }
}

pub struct TestPipeline {
    pub processor: ModelProcessor,
    pub records: InMemoryMediaRecords,
    pub queue: MemoryStorage,
    pub public: MemoryStorage,
    pub workbench_root: TempDir,
    pub job: ProcessingJob,
}

impl TestPipeline {
    /// A second processor over the same queue, workbench root and job, for reruns.
    pub fn processor_with(
        &self,
        records: Arc<dyn MediaRecordStore>,
        slicer: impl Slicer + 'static,
        renderer: Arc<dyn Renderer>,
        public: MemoryStorage,
    ) -> ModelProcessor {
        let mut config =
            ModelProcessorConfig::new(Arc::new(self.queue.clone()), Arc::new(public));
        config.workbench_root = Some(self.workbench_root.path().to_path_buf());

        ModelProcessor::new(
            config,
            records,
            Arc::new(StubLoader::Returns(cube_geometry())),
            Arc::new(slicer),
            renderer,
        )
    }

    pub async fn record(&self) -> MediaRecord {
        self.records.get(self.job.media_id).await.unwrap()
    }

    /// True when no workbench directory is left behind.
    pub fn workbench_root_is_empty(&self) -> bool {
        std::fs::read_dir(self.workbench_root.path())
            .unwrap()
            .next()
            .is_none()
    }

    pub async fn assert_failed_with(&self, kind: &str) -> MediaRecord {
        let record = self.record().await;
        assert_eq!(record.processing_state, ProcessingState::Failed);
        assert_eq!(record.fail_error.as_deref(), Some(kind));
        assert!(record.fail_metadata.is_some());
        assert!(self.workbench_root_is_empty(), "workbench left on disk");
        record
    }
}
