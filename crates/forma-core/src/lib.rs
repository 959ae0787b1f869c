//! Forma Core Library
//!
//! This crate provides the domain models, error metadata, and configuration
//! shared by the storage, processing, and CLI crates.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, ProcessorSettings, StorageConfig};
pub use error::{ErrorMetadata, LogLevel};
pub use models::{DerivedFileKey, MediaRecord, ModelMetadata, ProcessingState};
pub use storage_types::StorageBackend;
