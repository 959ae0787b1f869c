//! STL vertex reader (ASCII and binary).

use super::{Bounds, GeometryError};

const HEADER_SIZE: usize = 80;
const TRIANGLE_SIZE: usize = 50;

pub(super) fn read_vertices(data: &[u8], bounds: &mut Bounds) -> Result<(), GeometryError> {
    if is_ascii(data) {
        read_ascii(data, bounds)
    } else {
        read_binary(data, bounds)
    }
}

/// ASCII files start with "solid", but so do some binary headers; a binary file
/// whose size matches its own triangle count wins.
fn is_ascii(data: &[u8]) -> bool {
    let starts_with_solid = String::from_utf8_lossy(&data[..data.len().min(HEADER_SIZE)])
        .trim_start()
        .starts_with("solid");
    starts_with_solid && !binary_size_matches(data)
}

fn binary_size_matches(data: &[u8]) -> bool {
    if data.len() < HEADER_SIZE + 4 {
        return false;
    }
    let count = triangle_count(data) as usize;
    HEADER_SIZE + 4 + count * TRIANGLE_SIZE == data.len()
}

fn triangle_count(data: &[u8]) -> u32 {
    u32::from_le_bytes([
        data[HEADER_SIZE],
        data[HEADER_SIZE + 1],
        data[HEADER_SIZE + 2],
        data[HEADER_SIZE + 3],
    ])
}

fn read_binary(data: &[u8], bounds: &mut Bounds) -> Result<(), GeometryError> {
    if data.len() < HEADER_SIZE + 4 {
        return Err(GeometryError::Parse(
            "STL file too small for header + triangle count".to_string(),
        ));
    }

    let count = triangle_count(data) as usize;
    let expected = HEADER_SIZE + 4 + count * TRIANGLE_SIZE;
    if data.len() < expected {
        return Err(GeometryError::Parse(format!(
            "STL file truncated: expected {} bytes for {} triangles, got {}",
            expected,
            count,
            data.len()
        )));
    }

    for triangle in data[HEADER_SIZE + 4..expected].chunks_exact(TRIANGLE_SIZE) {
        // Skip the 12-byte normal; 3 vertices follow, then 2 attribute bytes.
        for offset in [12, 24, 36] {
            bounds.push(read_vertex(&triangle[offset..offset + 12]));
        }
    }
    Ok(())
}

fn read_vertex(buf: &[u8]) -> [f64; 3] {
    let coord = |i: usize| {
        f64::from(f32::from_le_bytes([
            buf[i],
            buf[i + 1],
            buf[i + 2],
            buf[i + 3],
        ]))
    };
    [coord(0), coord(4), coord(8)]
}

fn read_ascii(data: &[u8], bounds: &mut Bounds) -> Result<(), GeometryError> {
    let text = String::from_utf8_lossy(data);
    for (index, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        if !parts
            .next()
            .map(|word| word.eq_ignore_ascii_case("vertex"))
            .unwrap_or(false)
        {
            continue;
        }
        let coords: Vec<&str> = parts.take(3).collect();
        if coords.len() != 3 {
            return Err(GeometryError::Parse(format!(
                "line {}: vertex needs three coordinates",
                index + 1
            )));
        }
        let mut vertex = [0.0; 3];
        for (axis, value) in coords.iter().enumerate() {
            vertex[axis] = value.parse().map_err(|_| {
                GeometryError::Parse(format!("line {}: invalid coordinate {:?}", index + 1, value))
            })?;
        }
        bounds.push(vertex);
    }
    Ok(())
}
