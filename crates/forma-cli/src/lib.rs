use forma_core::Config;
use forma_processing::{
    BlenderRenderer, MediaRecordStore, MeshLoader, ModelGeometry, ModelProcessor,
    ModelProcessorConfig, Slic3r,
};
use forma_storage::Storage;
use std::sync::Arc;
use std::time::Duration;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Wire a processor with the built-in loader and the configured external tools.
pub fn build_processor(
    config: &Config,
    queue_storage: Arc<dyn Storage>,
    public_storage: Arc<dyn Storage>,
    records: Arc<dyn MediaRecordStore>,
) -> ModelProcessor {
    let settings = &config.processor;
    let timeout = Duration::from_secs(settings.external_tool_timeout_secs);

    ModelProcessor::new(
        ModelProcessorConfig::new(queue_storage, public_storage).with_settings(settings),
        records,
        Arc::new(MeshLoader::new()),
        Arc::new(Slic3r::new(settings.slic3r_path.clone(), timeout)),
        Arc::new(BlenderRenderer::from_settings(settings)),
    )
}

/// JSON view of a probed model.
pub fn geometry_json(geometry: &ModelGeometry) -> serde_json::Value {
    serde_json::json!({
        "width": geometry.width,
        "height": geometry.height,
        "depth": geometry.depth,
        "centroid": geometry.centroid,
        "greatest": geometry.greatest(),
    })
}
