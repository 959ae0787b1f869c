//! Preview camera planning
//!
//! Five shots per model. Positions are derived from the centroid `(cx, cy, cz)` and
//! the greatest extent `g`:
//!
//! | shot        | position          | projection  | size      |
//! |-------------|-------------------|-------------|-----------|
//! | thumb       | `(0, -1.5g, g)`   | perspective | thumbnail |
//! | perspective | `(0, -1.5g, g)`   | perspective | preview   |
//! | top         | `(cx, cy, 2g)`    | orthographic| preview   |
//! | front       | `(cx, -2g, cz)`   | orthographic| preview   |
//! | side        | `(-2g, cy, cz)`   | orthographic| preview   |
//!
//! Every shot looks at the centroid.

use forma_core::{DerivedFileKey, ProcessorSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::geometry::ModelGeometry;
use crate::render::RenderSetup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    #[serde(rename = "PERSP")]
    Perspective,
    #[serde(rename = "ORTHO")]
    Orthographic,
}

/// Output sizes for the thumbnail and the four full previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSizes {
    pub thumb: (u32, u32),
    pub preview: (u32, u32),
}

impl Default for RenderSizes {
    fn default() -> Self {
        Self {
            thumb: (180, 180),
            preview: (640, 640),
        }
    }
}

impl From<&ProcessorSettings> for RenderSizes {
    fn from(settings: &ProcessorSettings) -> Self {
        Self {
            thumb: (settings.thumb_max_width, settings.thumb_max_height),
            preview: (settings.preview_width, settings.preview_height),
        }
    }
}

/// One planned render.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraShot {
    pub key: DerivedFileKey,
    pub filename_template: &'static str,
    pub camera_coord: [f64; 3],
    pub projection: Projection,
    pub width: u32,
    pub height: u32,
}

impl CameraShot {
    /// Renderer configuration for this shot of `model_path`.
    pub fn render_setup(
        &self,
        geometry: &ModelGeometry,
        model_path: &Path,
        model_ext: &str,
        out_file: &Path,
    ) -> RenderSetup {
        let greatest = geometry.greatest();
        RenderSetup {
            model_path: model_path.to_string_lossy().to_string(),
            model_ext: model_ext.to_string(),
            camera_coord: self.camera_coord,
            camera_focus: geometry.centroid,
            camera_clip: greatest * 10.0,
            greatest,
            projection: self.projection,
            width: self.width,
            height: self.height,
            out_file: out_file.to_string_lossy().to_string(),
        }
    }
}

/// The five preview shots, in render order: thumb, perspective, top, front, side.
pub fn preview_shots(geometry: &ModelGeometry, sizes: &RenderSizes) -> Vec<CameraShot> {
    let g = geometry.greatest();
    let [cx, cy, cz] = geometry.centroid;
    let (preview_width, preview_height) = sizes.preview;

    let shot = |key: DerivedFileKey,
                filename_template: &'static str,
                camera_coord: [f64; 3],
                projection: Projection,
                size: (u32, u32)| CameraShot {
        key,
        filename_template,
        camera_coord,
        projection,
        width: size.0,
        height: size.1,
    };

    vec![
        shot(
            DerivedFileKey::Thumb,
            "{basename}.thumb.jpg",
            [0.0, -1.5 * g, g],
            Projection::Perspective,
            sizes.thumb,
        ),
        shot(
            DerivedFileKey::Perspective,
            "{basename}.perspective.jpg",
            [0.0, -1.5 * g, g],
            Projection::Perspective,
            (preview_width, preview_height),
        ),
        shot(
            DerivedFileKey::Top,
            "{basename}.top.jpg",
            [cx, cy, 2.0 * g],
            Projection::Orthographic,
            (preview_width, preview_height),
        ),
        shot(
            DerivedFileKey::Front,
            "{basename}.front.jpg",
            [cx, -2.0 * g, cz],
            Projection::Orthographic,
            (preview_width, preview_height),
        ),
        shot(
            DerivedFileKey::Side,
            "{basename}.side.jpg",
            [-2.0 * g, cy, cz],
            Projection::Orthographic,
            (preview_width, preview_height),
        ),
    ]
}
