//! Media record mutation surface
//!
//! The record itself belongs to the surrounding system. Processing touches it only
//! through [`MediaRecordStore`], which implementations back with whatever
//! persistence they use.

use async_trait::async_trait;
use chrono::Utc;
use forma_core::{DerivedFileKey, MediaRecord, ModelMetadata, ProcessingState};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Contents of `fail_error` / `fail_metadata`.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureInfo {
    pub error: String,
    pub metadata: JsonValue,
}

#[async_trait]
pub trait MediaRecordStore: Send + Sync {
    async fn set_state(&self, media_id: Uuid, state: ProcessingState) -> anyhow::Result<()>;

    /// Replace `media_metadata`; `None` clears it.
    async fn set_metadata(
        &self,
        media_id: Uuid,
        metadata: Option<ModelMetadata>,
    ) -> anyhow::Result<()>;

    async fn set_derived_file(
        &self,
        media_id: Uuid,
        key: DerivedFileKey,
        location: &str,
    ) -> anyhow::Result<()>;

    /// Drop one `derived_files` entry; a missing entry is not an error.
    async fn remove_derived_file(&self, media_id: Uuid, key: DerivedFileKey)
        -> anyhow::Result<()>;

    async fn clear_queued_source(&self, media_id: Uuid) -> anyhow::Result<()>;

    /// Replace `fail_error` / `fail_metadata`; `None` clears both.
    async fn set_failure(&self, media_id: Uuid, failure: Option<FailureInfo>)
        -> anyhow::Result<()>;
}

/// Record store kept in process memory (CLI runs, tests).
#[derive(Clone, Default)]
pub struct InMemoryMediaRecords {
    records: Arc<RwLock<HashMap<Uuid, MediaRecord>>>,
}

impl InMemoryMediaRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: MediaRecord) {
        self.records.write().await.insert(record.id, record);
    }

    pub async fn get(&self, media_id: Uuid) -> Option<MediaRecord> {
        self.records.read().await.get(&media_id).cloned()
    }

    async fn update<F>(&self, media_id: Uuid, apply: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut MediaRecord) + Send,
    {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&media_id)
            .ok_or_else(|| anyhow::anyhow!("Media record {} not found", media_id))?;
        apply(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl MediaRecordStore for InMemoryMediaRecords {
    async fn set_state(&self, media_id: Uuid, state: ProcessingState) -> anyhow::Result<()> {
        self.update(media_id, |record| record.processing_state = state)
            .await
    }

    async fn set_metadata(
        &self,
        media_id: Uuid,
        metadata: Option<ModelMetadata>,
    ) -> anyhow::Result<()> {
        self.update(media_id, |record| record.media_metadata = metadata)
            .await
    }

    async fn set_derived_file(
        &self,
        media_id: Uuid,
        key: DerivedFileKey,
        location: &str,
    ) -> anyhow::Result<()> {
        let location = location.to_string();
        self.update(media_id, |record| {
            record.derived_files.insert(key, location);
        })
        .await
    }

    async fn remove_derived_file(
        &self,
        media_id: Uuid,
        key: DerivedFileKey,
    ) -> anyhow::Result<()> {
        self.update(media_id, |record| {
            record.derived_files.remove(&key);
        })
        .await
    }

    async fn clear_queued_source(&self, media_id: Uuid) -> anyhow::Result<()> {
        self.update(media_id, |record| record.queued_source_path = None)
            .await
    }

    async fn set_failure(
        &self,
        media_id: Uuid,
        failure: Option<FailureInfo>,
    ) -> anyhow::Result<()> {
        self.update(media_id, |record| match failure {
            Some(failure) => {
                record.fail_error = Some(failure.error);
                record.fail_metadata = Some(failure.metadata);
            }
            None => {
                record.fail_error = None;
                record.fail_metadata = None;
            }
        })
        .await
    }
}
