//! Model geometry inspection
//!
//! The pipeline only needs the bounding-box extents and the centroid of an upload,
//! which drive camera placement for the preview renders. [`GeometryLoader`] is the
//! seam; [`MeshLoader`] is the built-in STL/OBJ implementation.

mod obj;
mod stl;

use async_trait::async_trait;
use std::path::Path;

/// Extensions this pipeline accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["stl", "obj"];

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("Unrecognized model format: {}", .0.as_deref().unwrap_or("<none>"))]
    UnrecognizedFormat(Option<String>),

    #[error("Malformed model: {0}")]
    Parse(String),

    #[error("Model contains no vertices")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bounding-box dimensions and centroid of a model.
///
/// width is the x extent, depth the y extent and height the z extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelGeometry {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub centroid: [f64; 3],
}

impl ModelGeometry {
    /// Largest of the three extents; sets camera distance and clip range.
    pub fn greatest(&self) -> f64 {
        self.width.max(self.height).max(self.depth)
    }
}

#[async_trait]
pub trait GeometryLoader: Send + Sync {
    /// Inspect the model at `path`, using `extension` as the format hint.
    async fn load(&self, path: &Path, extension: Option<&str>)
        -> Result<ModelGeometry, GeometryError>;
}

/// Whether `filename` is a model this pipeline handles (case-insensitive).
pub fn sniff(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Built-in loader for ASCII STL, binary STL and Wavefront OBJ.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshLoader;

impl MeshLoader {
    pub fn new() -> Self {
        Self
    }

    /// Parse model bytes already in memory.
    pub fn parse(data: &[u8], extension: Option<&str>) -> Result<ModelGeometry, GeometryError> {
        let mut bounds = Bounds::new();
        match extension.map(|ext| ext.to_ascii_lowercase()).as_deref() {
            Some("stl") => stl::read_vertices(data, &mut bounds)?,
            Some("obj") => obj::read_vertices(data, &mut bounds)?,
            _ => {
                return Err(GeometryError::UnrecognizedFormat(
                    extension.map(str::to_string),
                ))
            }
        }
        bounds.finish()
    }
}

#[async_trait]
impl GeometryLoader for MeshLoader {
    #[tracing::instrument(skip(self))]
    async fn load(
        &self,
        path: &Path,
        extension: Option<&str>,
    ) -> Result<ModelGeometry, GeometryError> {
        if !extension.map(|ext| sniff(&format!(".{}", ext))).unwrap_or(false) {
            return Err(GeometryError::UnrecognizedFormat(
                extension.map(str::to_string),
            ));
        }

        let data = tokio::fs::read(path).await?;
        let extension = extension.map(str::to_string);

        let geometry =
            tokio::task::spawn_blocking(move || MeshLoader::parse(&data, extension.as_deref()))
                .await
                .map_err(|e| GeometryError::Parse(format!("Model parser task failed: {}", e)))??;

        tracing::debug!(
            width = geometry.width,
            height = geometry.height,
            depth = geometry.depth,
            "Model geometry loaded"
        );

        Ok(geometry)
    }
}

/// Running min/max/sum over every vertex of a model.
pub(crate) struct Bounds {
    min: [f64; 3],
    max: [f64; 3],
    sum: [f64; 3],
    count: usize,
}

impl Bounds {
    fn new() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
            sum: [0.0; 3],
            count: 0,
        }
    }

    pub(crate) fn push(&mut self, vertex: [f64; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(vertex[axis]);
            self.max[axis] = self.max[axis].max(vertex[axis]);
            self.sum[axis] += vertex[axis];
        }
        self.count += 1;
    }

    fn finish(self) -> Result<ModelGeometry, GeometryError> {
        if self.count == 0 {
            return Err(GeometryError::Empty);
        }
        let n = self.count as f64;
        Ok(ModelGeometry {
            width: self.max[0] - self.min[0],
            depth: self.max[1] - self.min[1],
            height: self.max[2] - self.min[2],
            centroid: [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n],
        })
    }
}
