//! STL reading (binary and ASCII) and binary writing.
//!
//! Binary layout: 80-byte header, `u32` triangle count, then 50 bytes per
//! triangle (normal, three vertices as little-endian `f32`, `u16` attribute).

use std::io::{self, Write};

use aeolus_geom::Vec3;

use crate::{LoadError, Mesh, MeshFormat};

const HEADER_LEN: usize = 80;
const TRI_LEN: usize = 50;

pub(crate) fn read(bytes: &[u8]) -> Result<(Vec<Vec3>, Vec<[u32; 3]>), LoadError> {
    if is_binary(bytes) {
        read_binary(bytes)
    } else if bytes.trim_ascii_start().starts_with(b"solid") {
        read_ascii(bytes)
    } else {
        Err(LoadError::malformed(
            MeshFormat::Stl,
            format!("{} bytes is neither binary nor ASCII STL", bytes.len()),
        ))
    }
}

// Some exporters write "solid" into binary headers, so the size check wins.
fn is_binary(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_LEN + 4 {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    count
        .checked_mul(TRI_LEN)
        .and_then(|n| n.checked_add(HEADER_LEN + 4))
        .is_some_and(|expected| expected == bytes.len())
}

fn read_binary(bytes: &[u8]) -> Result<(Vec<Vec3>, Vec<[u32; 3]>), LoadError> {
    let body = &bytes[HEADER_LEN + 4..];
    let count = body.len() / TRI_LEN;
    let mut vertices = Vec::with_capacity(count * 3);
    let mut faces = Vec::with_capacity(count);
    for tri in body.chunks_exact(TRI_LEN) {
        let base = vertices.len() as u32;
        // skip the 12-byte facet normal; it is recomputed when needed
        for v in 0..3 {
            let off = 12 + v * 12;
            vertices.push(Vec3::new(
                f32_at(tri, off),
                f32_at(tri, off + 4),
                f32_at(tri, off + 8),
            ));
        }
        faces.push([base, base + 1, base + 2]);
    }
    Ok((vertices, faces))
}

#[inline]
fn f32_at(buf: &[u8], off: usize) -> f32 {
    f32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn read_ascii(bytes: &[u8]) -> Result<(Vec<Vec3>, Vec<[u32; 3]>), LoadError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| LoadError::malformed(MeshFormat::Stl, e.to_string()))?;
    let mut vertices = Vec::new();
    let mut faces = Vec::new();
    let mut pending: Vec<Vec3> = Vec::with_capacity(3);
    for (line_no, line) in text.lines().enumerate() {
        let mut it = line.split_whitespace();
        match it.next() {
            Some("vertex") => {
                let mut coord = || -> Result<f32, LoadError> {
                    it.next()
                        .and_then(|t| t.parse::<f32>().ok())
                        .ok_or_else(|| {
                            LoadError::malformed(
                                MeshFormat::Stl,
                                format!("line {}: bad vertex", line_no + 1),
                            )
                        })
                };
                let v = Vec3::new(coord()?, coord()?, coord()?);
                pending.push(v);
            }
            Some("endloop") => {
                if pending.len() != 3 {
                    return Err(LoadError::malformed(
                        MeshFormat::Stl,
                        format!(
                            "line {}: facet has {} vertices, expected 3",
                            line_no + 1,
                            pending.len()
                        ),
                    ));
                }
                let base = vertices.len() as u32;
                vertices.append(&mut pending);
                faces.push([base, base + 1, base + 2]);
            }
            _ => {}
        }
    }
    Ok((vertices, faces))
}

/// Write `mesh` as binary STL. `header_text` fills the 80-byte header (zero padded).
pub fn write_stl_binary<W: Write>(mesh: &Mesh, mut w: W, header_text: Option<&str>) -> io::Result<()> {
    let mut header = [0u8; HEADER_LEN];
    if let Some(text) = header_text {
        let bytes = text.as_bytes();
        let n = bytes.len().min(HEADER_LEN);
        header[..n].copy_from_slice(&bytes[..n]);
    }
    w.write_all(&header)?;
    w.write_all(&(mesh.face_count() as u32).to_le_bytes())?;

    for face in 0..mesh.face_count() {
        let [v0, v1, v2] = mesh.triangle(face);
        // degenerate triangles get a zero normal
        let normal = (v1 - v0).cross(v2 - v0).normalized();
        for v in [normal, v0, v1, v2] {
            for c in v.to_array() {
                w.write_all(&c.to_le_bytes())?;
            }
        }
        w.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}
