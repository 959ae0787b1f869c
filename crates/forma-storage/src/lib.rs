//! Forma Storage Library
//!
//! This crate provides the object store abstraction used for both the queue
//! store (uploads waiting for processing) and the public store (processed
//! artifacts), with local filesystem, S3 and in-memory backends.
//!
//! # Storage key format
//!
//! - **Queued uploads**: `media_entries/queue/{uuid}/{filename}`
//! - **Public artifacts**: `media_entries/{media_id}/{filename}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use forma_core::StorageBackend;
pub use keys::{public_file_key, queued_file_key, validate_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
