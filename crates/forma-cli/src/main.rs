//! Forma CLI: run the model pipeline and its building blocks from a shell.
//!
//! Storage and tool locations come from the environment (or `.env`), see
//! `forma_core::Config`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use forma_cli::{build_processor, geometry_json, init_tracing};
use forma_core::{Config, MediaRecord};
use forma_processing::orchestrator::derive_extension;
use forma_processing::{
    GcodeEstimator, GeometryLoader, InMemoryMediaRecords, MeshLoader, ProcessingJob,
};
use forma_storage::{create_storage, queued_file_key};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "forma", about = "3D model processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a model file and run the full pipeline on it
    Process {
        /// Path to the STL/OBJ file
        model: PathBuf,
        /// Media record ID (random when omitted)
        #[arg(long)]
        media_id: Option<Uuid>,
    },
    /// Estimate print duration and layer count of a G-code file
    Estimate {
        /// Path to the G-code file
        gcode: PathBuf,
    },
    /// Print the bounding box and centroid of a model
    Probe {
        /// Path to the STL/OBJ file
        model: PathBuf,
    },
}

fn print_json(value: &JsonValue) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn file_name(path: &std::path::Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .with_context(|| format!("{} has no file name", path.display()))
}

async fn process(model: PathBuf, media_id: Option<Uuid>) -> anyhow::Result<bool> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let queue_storage = create_storage(&config.queue_storage)
        .await
        .context("Failed to initialize queue storage")?;
    let public_storage = create_storage(&config.public_storage)
        .await
        .context("Failed to initialize public storage")?;

    let data = tokio::fs::read(&model)
        .await
        .with_context(|| format!("Failed to read {}", model.display()))?;
    let queued_key = queued_file_key(&file_name(&model)?);
    queue_storage
        .put(&queued_key, data, "application/octet-stream")
        .await
        .context("Failed to queue model file")?;

    let media_id = media_id.unwrap_or_else(Uuid::new_v4);
    let records = InMemoryMediaRecords::new();
    records
        .insert(MediaRecord::new_queued(media_id, queued_key.clone()))
        .await;

    let processor = build_processor(
        &config,
        queue_storage,
        public_storage,
        Arc::new(records.clone()),
    );
    let job = ProcessingJob {
        media_id,
        queued_source_path: queued_key,
    };
    // The outcome is reflected in the record printed below.
    let _ = processor.process(&job).await;

    let record = records
        .get(media_id)
        .await
        .context("Media record disappeared")?;
    print_json(&serde_json::to_value(&record).context("Serialize record")?)?;
    Ok(!record.is_failed())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process { model, media_id } => {
            if !process(model, media_id).await? {
                std::process::exit(1);
            }
        }
        Commands::Estimate { gcode } => {
            let estimate = GcodeEstimator::estimate_file(&gcode)
                .await
                .with_context(|| format!("Failed to estimate {}", gcode.display()))?;
            print_json(&serde_json::json!({
                "layer_count": estimate.layer_count,
                "duration_secs": estimate.duration_secs,
                "filament_mm": estimate.filament_mm,
                "summary": estimate.summary(),
            }))?;
        }
        Commands::Probe { model } => {
            let extension = derive_extension(&file_name(&model)?);
            let geometry = MeshLoader::new()
                .load(&model, extension.as_deref())
                .await
                .with_context(|| format!("Failed to load {}", model.display()))?;
            print_json(&geometry_json(&geometry))?;
        }
    }

    Ok(())
}
