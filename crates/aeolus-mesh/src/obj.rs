// Wavefront OBJ: only `v` and `f` records matter here. Polygons are fan-triangulated;
// negative indices count back from the most recent vertex.

use aeolus_geom::Vec3;

use crate::{LoadError, MeshFormat};

pub(crate) fn read(bytes: &[u8]) -> Result<(Vec<Vec3>, Vec<[u32; 3]>), LoadError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| LoadError::malformed(MeshFormat::Obj, e.to_string()))?;
    let mut vertices: Vec<Vec3> = Vec::new();
    let mut faces: Vec<[u32; 3]> = Vec::new();
    let mut poly: Vec<u32> = Vec::with_capacity(8);

    for (line_no, line) in text.lines().enumerate() {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let mut it = s.split_whitespace();
        match it.next() {
            Some("v") => {
                let xyz: Vec<f32> = it.take(3).filter_map(|t| t.parse().ok()).collect();
                if xyz.len() != 3 {
                    return Err(bad_line(line_no, "vertex needs three numbers"));
                }
                vertices.push(Vec3::new(xyz[0], xyz[1], xyz[2]));
            }
            Some("f") => {
                poly.clear();
                for tok in it {
                    let idx = tok
                        .split('/')
                        .next()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| bad_line(line_no, "bad face index"))?;
                    poly.push(resolve_index(idx, vertices.len()).ok_or_else(|| {
                        bad_line(line_no, "face index outside the vertex list")
                    })?);
                }
                if poly.len() < 3 {
                    return Err(bad_line(line_no, "face needs at least three vertices"));
                }
                for i in 1..poly.len() - 1 {
                    faces.push([poly[0], poly[i], poly[i + 1]]);
                }
            }
            _ => {}
        }
    }
    Ok((vertices, faces))
}

fn resolve_index(idx: i64, len: usize) -> Option<u32> {
    let resolved = if idx > 0 {
        idx - 1
    } else if idx < 0 {
        len as i64 + idx
    } else {
        return None;
    };
    (0..len as i64)
        .contains(&resolved)
        .then_some(resolved as u32)
}

fn bad_line(line_no: usize, what: &str) -> LoadError {
    LoadError::malformed(MeshFormat::Obj, format!("line {}: {}", line_no + 1, what))
}
