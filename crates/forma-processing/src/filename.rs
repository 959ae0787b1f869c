//! Output filename derivation.
//!
//! Every artifact derived from one upload shares the upload's stem, e.g.
//! `benchy.stl` yields `benchy.thumb.jpg`, `benchy.gcode` and so on.

use std::path::Path;

/// Builds derived filenames from a source filename and a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameBuilder {
    basename: String,
    ext: String,
}

impl FilenameBuilder {
    /// `source` may be a bare filename or a path; only the final component is used.
    pub fn new(source: &str) -> Self {
        let path = Path::new(source);
        let basename = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        Self { basename, ext }
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Extension including the leading dot, or empty.
    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Substitute `{basename}` and `{ext}` in `template`.
    pub fn fill(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + self.basename.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{basename}") {
                out.push_str(&self.basename);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{ext}") {
                out.push_str(&self.ext);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
