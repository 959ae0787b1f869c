//! Forma Processing Library
//!
//! Derived-artifact pipeline for uploaded 3D models: geometry inspection, preview
//! renders, slicing, print-time estimation and publication of every artifact
//! against the owning media record.

pub mod camera;
pub mod cleanup;
pub mod error;
pub mod filename;
pub mod gcode;
pub mod geometry;
pub mod orchestrator;
pub mod record;
pub mod render;
pub mod slicer;
pub mod tool;
pub mod workbench;

pub use camera::{preview_shots, CameraShot, Projection, RenderSizes};
pub use cleanup::purge_derived_files;
pub use error::ProcessingError;
pub use filename::FilenameBuilder;
pub use gcode::{GcodeEstimate, GcodeEstimator, ACCELERATION};
pub use geometry::{sniff, GeometryError, GeometryLoader, MeshLoader, ModelGeometry};
pub use orchestrator::{ModelProcessor, ModelProcessorConfig, ProcessingJob, ProcessingReport};
pub use record::{InMemoryMediaRecords, MediaRecordStore};
pub use render::{BlenderRenderer, RenderSetup, Renderer};
pub use slicer::{parse_filament_report, Slic3r, SliceReport, Slicer, SlicerProfile, SlicerSettings};
pub use workbench::Workbench;
