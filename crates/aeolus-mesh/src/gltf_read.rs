// glTF 2.0 reader: flattens every triangle primitive of the default scene into one
// mesh, applying node transforms on the way down.

use aeolus_geom::Vec3;
use gltf::mesh::Mode;

use crate::{LoadError, MeshFormat};

type Mat4 = [[f32; 4]; 4];

const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[derive(Default)]
struct Geometry {
    vertices: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
}

pub(crate) fn read(
    bytes: &[u8],
    format: MeshFormat,
) -> Result<(Vec<Vec3>, Vec<[u32; 3]>), LoadError> {
    let is_glb = bytes.starts_with(b"glTF");
    match (format, is_glb) {
        (MeshFormat::Glb, false) => {
            return Err(LoadError::malformed(format, "missing `glTF` magic"));
        }
        (MeshFormat::Gltf, true) => {
            return Err(LoadError::malformed(
                format,
                "binary container declared as JSON glTF",
            ));
        }
        _ => {}
    }

    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)?;
    let buffers = gltf::import_buffers(&document, None, blob)?;

    let mut out = Geometry::default();
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                visit(&node, &IDENTITY, &buffers, format, &mut out)?;
            }
        }
        None => {
            for mesh in document.meshes() {
                append_mesh(&mesh, &IDENTITY, &buffers, format, &mut out)?;
            }
        }
    }
    Ok((out.vertices, out.faces))
}

fn visit(
    node: &gltf::Node<'_>,
    parent: &Mat4,
    buffers: &[gltf::buffer::Data],
    format: MeshFormat,
    out: &mut Geometry,
) -> Result<(), LoadError> {
    let world = mul(parent, &node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        append_mesh(&mesh, &world, buffers, format, out)?;
    }
    for child in node.children() {
        visit(&child, &world, buffers, format, out)?;
    }
    Ok(())
}

fn append_mesh(
    mesh: &gltf::Mesh<'_>,
    xf: &Mat4,
    buffers: &[gltf::buffer::Data],
    format: MeshFormat,
    out: &mut Geometry,
) -> Result<(), LoadError> {
    for prim in mesh.primitives() {
        if prim.mode() != Mode::Triangles {
            log::debug!(
                target: "mesh",
                "skipping non-triangle primitive {} of mesh {:?}",
                prim.index(),
                mesh.name()
            );
            continue;
        }
        let reader = prim.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let base = out.vertices.len() as u32;
        out.vertices
            .extend(positions.map(|p| transform_point(xf, Vec3::from_array(p))));
        let count = out.vertices.len() as u32 - base;

        let indices: Vec<u32> = match reader.read_indices() {
            Some(idx) => idx.into_u32().collect(),
            None => (0..count).collect(),
        };
        if indices.len() % 3 != 0 {
            return Err(LoadError::malformed(
                format,
                format!("index count {} is not a multiple of 3", indices.len()),
            ));
        }
        if let Some(bad) = indices.iter().find(|&&i| i >= count) {
            return Err(LoadError::malformed(
                format,
                format!("primitive index {bad} exceeds its {count} vertices"),
            ));
        }
        out.faces.extend(
            indices
                .chunks_exact(3)
                .map(|t| [base + t[0], base + t[1], base + t[2]]),
        );
    }
    Ok(())
}

// Column-major, as glTF stores it: m[col][row].
fn mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0f32; 4]; 4];
    for (c, col) in out.iter_mut().enumerate() {
        for (r, cell) in col.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[k][r] * b[c][k]).sum();
        }
    }
    out
}

fn transform_point(m: &Mat4, p: Vec3) -> Vec3 {
    Vec3::new(
        m[0][0] * p.x + m[1][0] * p.y + m[2][0] * p.z + m[3][0],
        m[0][1] * p.x + m[1][1] * p.y + m[2][1] * p.z + m[3][1],
        m[0][2] * p.x + m[1][2] * p.y + m[2][2] * p.z + m[3][2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_composes_through_parents() {
        let mut t1 = IDENTITY;
        t1[3] = [1.0, 2.0, 3.0, 1.0];
        let mut t2 = IDENTITY;
        t2[3] = [10.0, 0.0, 0.0, 1.0];
        let m = mul(&t1, &t2);
        assert_eq!(transform_point(&m, Vec3::ZERO), Vec3::new(11.0, 2.0, 3.0));
    }

    #[test]
    fn scale_then_translate() {
        let mut parent = IDENTITY;
        parent[3] = [5.0, 0.0, 0.0, 1.0];
        let mut child = IDENTITY;
        child[0][0] = 2.0;
        child[1][1] = 2.0;
        child[2][2] = 2.0;
        let m = mul(&parent, &child);
        assert_eq!(
            transform_point(&m, Vec3::new(1.0, 1.0, 1.0)),
            Vec3::new(7.0, 2.0, 2.0)
        );
    }
}
