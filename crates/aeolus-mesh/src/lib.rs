//! Triangle meshes and the loaders that turn asset bytes into them.
#![forbid(unsafe_code)]

mod error;
mod format;
mod gltf_read;
mod obj;
pub mod stl;

use std::time::Instant;

use aeolus_geom::{Aabb, Vec3};

pub use error::LoadError;
pub use format::{MeshFormat, UpAxis};

/// Indexed triangle mesh. Immutable once built; the bounding box is computed up front.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
    bounds: Option<Aabb>,
}

impl Mesh {
    /// Build a mesh, checking that every face references an existing vertex.
    pub fn new(vertices: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Result<Self, LoadError> {
        let count = vertices.len();
        for (face, tri) in faces.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= count) {
                return Err(LoadError::IndexOutOfRange { face, index, count });
            }
        }
        let bounds = Aabb::from_points(
            faces
                .iter()
                .flat_map(|tri| tri.iter().map(|&i| vertices[i as usize])),
        );
        Ok(Self {
            vertices,
            faces,
            bounds,
        })
    }

    pub fn empty() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            bounds: None,
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    #[inline]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Bounds of the vertices referenced by faces; `None` for a mesh without faces.
    #[inline]
    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    #[inline]
    pub fn triangle(&self, face: usize) -> [Vec3; 3] {
        let [a, b, c] = self.faces[face];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    pub fn translated(&self, t: Vec3) -> Mesh {
        Mesh {
            vertices: self.vertices.iter().map(|&v| v + t).collect(),
            faces: self.faces.clone(),
            bounds: self.bounds.map(|b| b.translated(t)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoadOptions {
    pub up_axis: UpAxis,
}

/// Parse `bytes` as `format` with default options (Z up).
pub fn load_mesh(bytes: &[u8], format: MeshFormat) -> Result<Mesh, LoadError> {
    load_mesh_with(bytes, format, &LoadOptions::default())
}

pub fn load_mesh_with(
    bytes: &[u8],
    format: MeshFormat,
    opts: &LoadOptions,
) -> Result<Mesh, LoadError> {
    let t0 = Instant::now();
    let (mut vertices, faces) = match format {
        MeshFormat::Gltf | MeshFormat::Glb => gltf_read::read(bytes, format)?,
        MeshFormat::Stl => stl::read(bytes)?,
        MeshFormat::Obj => obj::read(bytes)?,
    };
    if opts.up_axis == UpAxis::Y {
        for v in &mut vertices {
            *v = Vec3::new(v.x, -v.z, v.y);
        }
    }
    let mesh = Mesh::new(vertices, faces)?;
    log::debug!(
        target: "mesh",
        "loaded {} mesh: {} vertices, {} faces in {} ms",
        format,
        mesh.vertex_count(),
        mesh.face_count(),
        t0.elapsed().as_millis()
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_face() {
        let err = Mesh::new(vec![Vec3::ZERO; 2], vec![[0, 1, 2]]).unwrap_err();
        assert!(matches!(
            err,
            LoadError::IndexOutOfRange {
                face: 0,
                index: 2,
                count: 2
            }
        ));
    }

    #[test]
    fn bounds_ignore_unreferenced_vertices() {
        let mesh = Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 1.0),
                Vec3::new(500.0, 500.0, 500.0),
            ],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let b = mesh.bounds().unwrap();
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn translation_moves_bounds() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        )
        .unwrap();
        let moved = mesh.translated(Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(moved.bounds().unwrap().min, Vec3::new(10.0, 20.0, 0.0));
        assert_eq!(moved.triangle(0)[1], Vec3::new(11.0, 20.0, 0.0));
    }

    #[test]
    fn empty_mesh_has_no_bounds() {
        assert!(Mesh::empty().bounds().is_none());
        assert!(Mesh::empty().is_empty());
    }
}
