//! Shared key generation for storage backends.

use crate::traits::{StorageError, StorageResult};
use uuid::Uuid;

const ROOT: &str = "media_entries";

/// Key under which a processed artifact of `media_id` is published.
pub fn public_file_key(media_id: Uuid, filename: &str) -> String {
    format!("{}/{}/{}", ROOT, media_id, clean_filename(filename))
}

/// Fresh queue key for an upload awaiting processing.
pub fn queued_file_key(filename: &str) -> String {
    format!("{}/queue/{}/{}", ROOT, Uuid::new_v4(), clean_filename(filename))
}

/// Last path segment of a key (the stored filename).
pub fn key_filename(storage_key: &str) -> &str {
    storage_key.rsplit('/').next().unwrap_or(storage_key)
}

/// Reject keys that could escape a backend's root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if storage_key.contains("..") || storage_key.starts_with('/') || storage_key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Keep only the final component of a client-supplied name.
fn clean_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "file".to_string()
    } else {
        name.to_string()
    }
}
