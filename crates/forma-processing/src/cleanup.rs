use forma_core::MediaRecord;
use forma_storage::{Storage, StorageError};

/// Delete every derived artifact of `record` from public storage.
///
/// All deletions are attempted; the first failure is returned afterwards.
/// Returns the number of artifacts removed.
pub async fn purge_derived_files(
    record: &MediaRecord,
    storage: &dyn Storage,
) -> Result<usize, StorageError> {
    let mut removed = 0;
    let mut first_error = None;

    for (key, location) in &record.derived_files {
        match storage.delete(location).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(
                    media_id = %record.id,
                    derived_key = %key,
                    key = %location,
                    error = %e,
                    "Failed to delete derived file"
                );
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(removed),
    }
}
