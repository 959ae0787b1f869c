//! In-memory storage backend
//!
//! Keeps objects in a map behind a mutex. Used for dry runs of the CLI and as the
//! store in pipeline tests, where [`MemoryStorage::fail_writes_ending_with`] lets a
//! test force a write failure for a particular artifact.

use crate::keys::validate_key;
use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Default)]
struct Inner {
    files: HashMap<String, Vec<u8>>,
    failing_suffixes: Vec<String>,
}

/// In-memory storage implementation
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::BackendError("memory storage lock poisoned".to_string()))
    }

    /// Make every subsequent write to a key ending with `suffix` fail.
    pub fn fail_writes_ending_with(&self, suffix: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_suffixes.push(suffix.to_string());
        }
    }

    /// Check if an object is stored under `key`
    pub fn has_file(&self, key: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.files.contains_key(key))
            .unwrap_or(false)
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .map(|inner| inner.files.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn write(&self, storage_key: &str, data: Vec<u8>) -> StorageResult<String> {
        validate_key(storage_key)?;
        let mut inner = self.lock()?;
        if inner
            .failing_suffixes
            .iter()
            .any(|suffix| storage_key.ends_with(suffix.as_str()))
        {
            return Err(StorageError::UploadFailed(format!(
                "Write rejected for {}",
                storage_key
            )));
        }
        inner.files.insert(storage_key.to_string(), data);
        Ok(format!("memory://{}", storage_key))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        validate_key(storage_key)?;
        self.lock()?
            .files
            .get(storage_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn get_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        let data = self.get(storage_key).await?;
        let chunk: Result<Bytes, StorageError> = Ok(Bytes::from(data));
        Ok(Box::pin(futures::stream::iter(vec![chunk])))
    }

    async fn put(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        let size = data.len();
        let url = self.write(storage_key, data)?;
        tracing::debug!(key = %storage_key, size_bytes = size, "Memory storage write successful");
        Ok(url)
    }

    async fn put_stream(
        &self,
        storage_key: &str,
        _content_type: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> StorageResult<String> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;
        self.write(storage_key, buffer)
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        validate_key(storage_key)?;
        self.lock()?.files.remove(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        validate_key(storage_key)?;
        Ok(self.lock()?.files.contains_key(storage_key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
