//! Wavefront OBJ vertex reader. Only `v` lines contribute to the geometry.

use super::{Bounds, GeometryError};

pub(super) fn read_vertices(data: &[u8], bounds: &mut Bounds) -> Result<(), GeometryError> {
    let text = String::from_utf8_lossy(data);
    for (index, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        if parts.next() != Some("v") {
            continue;
        }
        let mut vertex = [0.0; 3];
        for axis in &mut vertex {
            let value = parts.next().ok_or_else(|| {
                GeometryError::Parse(format!("line {}: vertex needs three coordinates", index + 1))
            })?;
            *axis = value.parse().map_err(|_| {
                GeometryError::Parse(format!("line {}: invalid coordinate {:?}", index + 1, value))
            })?;
        }
        // An optional fourth (w) component is ignored.
        bounds.push(vertex);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::MeshLoader;
    use super::*;

    #[test]
    fn test_ignores_normals_and_texture_coords() {
        let obj = "v 1 2 3\nvn 100 100 100\nvt 50 50\nv 3 4 5 1.0\n";
        let geometry = MeshLoader::parse(obj.as_bytes(), Some("obj")).unwrap();
        assert_eq!(geometry.centroid, [2.0, 3.0, 4.0]);
        assert_eq!(geometry.width, 2.0);
    }

    #[test]
    fn test_short_vertex_line() {
        let err = MeshLoader::parse(b"v 1 2\n", Some("obj")).unwrap_err();
        assert!(matches!(err, GeometryError::Parse(ref msg) if msg.starts_with("line 1")));
    }
}
