use aeolus_geom::Vec3;
use aeolus_mesh::stl::write_stl_binary;
use aeolus_mesh::{LoadError, LoadOptions, Mesh, MeshFormat, UpAxis, load_mesh, load_mesh_with};

// One triangle (0,0,0) (1,0,0) (0,1,0) as f32 positions followed by u16 indices.
fn triangle_buffer() -> Vec<u8> {
    let mut bin = Vec::new();
    for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
        for c in p {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in [0u16, 1, 2] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    bin
}

fn gltf_json(buffer_uri: Option<&str>, byte_len: usize) -> String {
    let uri = buffer_uri
        .map(|u| format!(r#","uri":"{u}""#))
        .unwrap_or_default();
    format!(
        r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],
"nodes":[{{"mesh":0,"translation":[10.0,0.0,0.0]}}],
"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1}}]}}],
"buffers":[{{"byteLength":{byte_len}{uri}}}],
"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],
"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}},
{{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#
    )
}

fn build_glb() -> Vec<u8> {
    let mut bin = triangle_buffer();
    let bin_len = bin.len();
    let mut json = gltf_json(None, bin_len).into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}

fn base64(data: &[u8]) -> String {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::new();
    for chunk in data.chunks(3) {
        let b = [
            chunk[0],
            *chunk.get(1).unwrap_or(&0),
            *chunk.get(2).unwrap_or(&0),
        ];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        for i in 0..4 {
            if i <= chunk.len() {
                out.push(TABLE[((n >> (18 - 6 * i)) & 63) as usize] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}

#[test]
fn glb_applies_node_translation() {
    let mesh = load_mesh(&build_glb(), MeshFormat::Glb).unwrap();
    assert_eq!(mesh.face_count(), 1);
    let b = mesh.bounds().unwrap();
    assert_eq!(b.min, Vec3::new(10.0, 0.0, 0.0));
    assert_eq!(b.max, Vec3::new(11.0, 1.0, 0.0));
}

#[test]
fn gltf_json_with_data_uri() {
    let bin = triangle_buffer();
    let uri = format!("data:application/octet-stream;base64,{}", base64(&bin));
    let json = gltf_json(Some(&uri), bin.len());
    let mesh = load_mesh(json.as_bytes(), MeshFormat::Gltf).unwrap();
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.triangle(0)[1], Vec3::new(11.0, 0.0, 0.0));
}

#[test]
fn glb_declared_as_json_is_rejected() {
    let err = load_mesh(&build_glb(), MeshFormat::Gltf).unwrap_err();
    assert!(matches!(err, LoadError::Malformed { format: MeshFormat::Gltf, .. }));
}

#[test]
fn garbage_glb_is_rejected() {
    assert!(load_mesh(b"not a mesh at all", MeshFormat::Glb).is_err());
}

#[test]
fn y_up_assets_are_rotated_to_z_up() {
    let src = b"v 0 0 0\nv 1 0 0\nv 0 5 0\nf 1 2 3\n";
    let mesh = load_mesh_with(src, MeshFormat::Obj, &LoadOptions { up_axis: UpAxis::Y }).unwrap();
    let b = mesh.bounds().unwrap();
    assert_eq!(b.max.z, 5.0);
    assert_eq!(b.max.y, 0.0);
}

#[test]
fn stl_written_then_loaded_keeps_geometry() {
    let mesh = Mesh::new(
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(30.0, 30.0, 100.0),
            Vec3::new(0.0, 30.0, 100.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    )
    .unwrap();
    let mut buf = Vec::new();
    write_stl_binary(&mesh, &mut buf, None).unwrap();
    let back = load_mesh(&buf, MeshFormat::Stl).unwrap();
    assert_eq!(back.face_count(), 2);
    assert_eq!(back.bounds(), mesh.bounds());
}
