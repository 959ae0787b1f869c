use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Processing lifecycle of a media record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Unprocessed,
    Processing,
    Processed,
    Failed,
}

impl Display for ProcessingState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingState::Unprocessed => write!(f, "unprocessed"),
            ProcessingState::Processing => write!(f, "processing"),
            ProcessingState::Processed => write!(f, "processed"),
            ProcessingState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ProcessingState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unprocessed" => Ok(ProcessingState::Unprocessed),
            "processing" => Ok(ProcessingState::Processing),
            "processed" => Ok(ProcessingState::Processed),
            "failed" => Ok(ProcessingState::Failed),
            _ => Err(anyhow::anyhow!("Invalid processing state: {}", s)),
        }
    }
}

/// Logical name of a derived artifact in `derived_files`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedFileKey {
    Original,
    Toolpath,
    Thumb,
    Perspective,
    Top,
    Side,
    Front,
}

/// The five preview keys, recorded all together or not at all.
pub const PREVIEW_KEYS: [DerivedFileKey; 5] = [
    DerivedFileKey::Thumb,
    DerivedFileKey::Perspective,
    DerivedFileKey::Top,
    DerivedFileKey::Side,
    DerivedFileKey::Front,
];

/// Order in which derived files are tried when picking one to display.
pub const DEFAULT_DISPLAY_ORDER: [DerivedFileKey; 3] = [
    DerivedFileKey::Perspective,
    DerivedFileKey::Thumb,
    DerivedFileKey::Original,
];

impl DerivedFileKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedFileKey::Original => "original",
            DerivedFileKey::Toolpath => "toolpath",
            DerivedFileKey::Thumb => "thumb",
            DerivedFileKey::Perspective => "perspective",
            DerivedFileKey::Top => "top",
            DerivedFileKey::Side => "side",
            DerivedFileKey::Front => "front",
        }
    }

    pub fn is_preview(&self) -> bool {
        PREVIEW_KEYS.contains(self)
    }
}

impl Display for DerivedFileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Metadata extracted while processing a 3D model (stored in `media_metadata`).
///
/// `filament_length` and `extruded_volume` are the slicer's own report, kept as the
/// text it printed. `toolpath_filament_length` is the estimator's G92-aware
/// extrusion total; the two are never reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub filament_length: String,
    pub extruded_volume: String,
    pub toolpath_filament_length: f64,
    pub layer_count: u32,
    pub estimated_duration_secs: f64,
    pub file_type: Option<String>,
    pub blender_thumbs: bool,
}

/// Media record as seen by the processing pipeline.
///
/// The surrounding system owns the record; processing only touches the fields
/// below through its mutation surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub queued_source_path: Option<String>,
    pub derived_files: BTreeMap<DerivedFileKey, String>,
    pub media_metadata: Option<ModelMetadata>,
    pub processing_state: ProcessingState,
    pub fail_error: Option<String>,
    pub fail_metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    /// A freshly uploaded record waiting for processing.
    pub fn new_queued(id: Uuid, queued_source_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            queued_source_path: Some(queued_source_path.into()),
            derived_files: BTreeMap::new(),
            media_metadata: None,
            processing_state: ProcessingState::Unprocessed,
            fail_error: None,
            fail_metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn derived_file(&self, key: DerivedFileKey) -> Option<&str> {
        self.derived_files.get(&key).map(String::as_str)
    }

    /// Find the best derived file for display, trying `fetch_order` in turn.
    pub fn display_file(&self, fetch_order: &[DerivedFileKey]) -> Option<&str> {
        fetch_order.iter().find_map(|key| self.derived_file(*key))
    }

    /// True when all five previews are recorded.
    pub fn has_previews(&self) -> bool {
        PREVIEW_KEYS
            .iter()
            .all(|key| self.derived_files.contains_key(key))
    }

    pub fn is_failed(&self) -> bool {
        self.processing_state == ProcessingState::Failed
    }
}
