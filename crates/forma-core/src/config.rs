//! Configuration module
//!
//! Settings for the two object stores and for the model processor, loaded from
//! the environment (and `.env`) once at start-up. Nothing here is global: the
//! binary turns a [`Config`] into storage handles and a processor config and
//! passes those down explicitly.

use std::env;

use crate::storage_types::StorageBackend;

const THUMB_MAX_WIDTH: u32 = 180;
const THUMB_MAX_HEIGHT: u32 = 180;
const PREVIEW_WIDTH: u32 = 640;
const PREVIEW_HEIGHT: u32 = 640;
const EXTERNAL_TOOL_TIMEOUT_SECS: u64 = 600;

/// Settings for one object store (queue or public)
#[derive(Clone, Debug, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: Option<String>,
    pub local_base_url: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
}

impl StorageConfig {
    /// Read `{prefix}_STORAGE_BACKEND`, `{prefix}_STORAGE_PATH`, `{prefix}_S3_BUCKET`, ...
    fn from_lookup<F>(prefix: &str, lookup: &F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup(format!("{}_STORAGE_BACKEND", prefix).as_str())
            .unwrap_or_else(|| "local".to_string())
            .parse::<StorageBackend>()?;

        Ok(StorageConfig {
            backend,
            local_path: lookup(format!("{}_STORAGE_PATH", prefix).as_str()),
            local_base_url: lookup(format!("{}_STORAGE_BASE_URL", prefix).as_str()),
            s3_bucket: lookup(format!("{}_S3_BUCKET", prefix).as_str()),
            s3_region: lookup(format!("{}_S3_REGION", prefix).as_str())
                .or_else(|| lookup("AWS_REGION")),
            s3_endpoint: lookup(format!("{}_S3_ENDPOINT", prefix).as_str()),
        })
    }

    fn validate(&self, name: &str) -> Result<(), anyhow::Error> {
        match self.backend {
            StorageBackend::Local if self.local_path.is_none() => Err(anyhow::anyhow!(
                "{}_STORAGE_PATH must be set for the local storage backend",
                name
            )),
            StorageBackend::S3 if self.s3_bucket.is_none() || self.s3_region.is_none() => {
                Err(anyhow::anyhow!(
                    "{0}_S3_BUCKET and {0}_S3_REGION (or AWS_REGION) must be set for the s3 storage backend",
                    name
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Model processor settings
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessorSettings {
    pub thumb_max_width: u32,
    pub thumb_max_height: u32,
    pub preview_width: u32,
    pub preview_height: u32,
    pub slic3r_path: String,
    pub blender_path: String,
    pub blend_file: String,
    pub blend_script: String,
    pub render_display: String,
    pub external_tool_timeout_secs: u64,
    pub workbench_dir: Option<String>,
    pub parallel_previews: bool,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub queue_storage: StorageConfig,
    pub public_storage: StorageConfig,
    pub processor: ProcessorSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let queue_storage = StorageConfig::from_lookup("QUEUE", &lookup)?;
        let public_storage = StorageConfig::from_lookup("PUBLIC", &lookup)?;

        let processor = ProcessorSettings {
            thumb_max_width: lookup("THUMB_MAX_WIDTH")
                .and_then(|s| s.parse().ok())
                .unwrap_or(THUMB_MAX_WIDTH),
            thumb_max_height: lookup("THUMB_MAX_HEIGHT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(THUMB_MAX_HEIGHT),
            preview_width: lookup("PREVIEW_WIDTH")
                .and_then(|s| s.parse().ok())
                .unwrap_or(PREVIEW_WIDTH),
            preview_height: lookup("PREVIEW_HEIGHT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(PREVIEW_HEIGHT),
            slic3r_path: lookup("SLIC3R_PATH").unwrap_or_else(|| "slic3r".to_string()),
            blender_path: lookup("BLENDER_PATH").unwrap_or_else(|| "blender".to_string()),
            blend_file: lookup("BLEND_FILE")
                .unwrap_or_else(|| "assets/blender_render.blend".to_string()),
            blend_script: lookup("BLEND_SCRIPT")
                .unwrap_or_else(|| "assets/blender_render.py".to_string()),
            render_display: lookup("RENDER_DISPLAY").unwrap_or_else(|| ":0".to_string()),
            external_tool_timeout_secs: lookup("EXTERNAL_TOOL_TIMEOUT_SECS")
                .unwrap_or_else(|| EXTERNAL_TOOL_TIMEOUT_SECS.to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("EXTERNAL_TOOL_TIMEOUT_SECS must be a valid number")
                })?,
            workbench_dir: lookup("WORKBENCH_DIR"),
            parallel_previews: lookup("PARALLEL_PREVIEWS")
                .map(|s| s.to_lowercase())
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        };

        let config = Config {
            queue_storage,
            public_storage,
            processor,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.queue_storage.validate("QUEUE")?;
        self.public_storage.validate("PUBLIC")?;

        if self.processor.external_tool_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "EXTERNAL_TOOL_TIMEOUT_SECS must be greater than zero"
            ));
        }

        if self.processor.thumb_max_width == 0
            || self.processor.thumb_max_height == 0
            || self.processor.preview_width == 0
            || self.processor.preview_height == 0
        {
            return Err(anyhow::anyhow!("Render sizes must be non-zero"));
        }

        Ok(())
    }
}
