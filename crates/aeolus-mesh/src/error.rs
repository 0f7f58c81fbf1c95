use crate::MeshFormat;

/// Mesh input could not be turned into a [`crate::Mesh`]. Never worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unsupported mesh format `{0}`")]
    Unsupported(String),
    #[error("malformed {format} data: {reason}")]
    Malformed { format: MeshFormat, reason: String },
    #[error("face {face} references vertex {index} but the mesh has {count} vertices")]
    IndexOutOfRange { face: usize, index: u32, count: usize },
    #[error("gltf: {0}")]
    Gltf(#[from] gltf::Error),
}

impl LoadError {
    pub(crate) fn malformed(format: MeshFormat, reason: impl Into<String>) -> Self {
        LoadError::Malformed {
            format,
            reason: reason.into(),
        }
    }
}
