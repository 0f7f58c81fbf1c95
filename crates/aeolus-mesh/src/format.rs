use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LoadError;

/// Declared encoding of a mesh asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    /// glTF 2.0 JSON with embedded (data URI) buffers.
    Gltf,
    /// Binary glTF container.
    Glb,
    /// STL, binary or ASCII.
    Stl,
    /// Wavefront OBJ.
    Obj,
}

impl MeshFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "gltf" => Some(MeshFormat::Gltf),
            "glb" => Some(MeshFormat::Glb),
            "stl" => Some(MeshFormat::Stl),
            "obj" => Some(MeshFormat::Obj),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Gltf => "gltf",
            MeshFormat::Glb => "glb",
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MeshFormat {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeshFormat::from_extension(s.trim_start_matches('.'))
            .ok_or_else(|| LoadError::Unsupported(s.to_string()))
    }
}

/// Which source axis points up. Rasters always look down world Z.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpAxis {
    #[default]
    Z,
    Y,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extensions_case_insensitively() {
        assert_eq!("GLB".parse::<MeshFormat>().unwrap(), MeshFormat::Glb);
        assert_eq!(".stl".parse::<MeshFormat>().unwrap(), MeshFormat::Stl);
        assert!(matches!(
            "fbx".parse::<MeshFormat>(),
            Err(LoadError::Unsupported(_))
        ));
    }
}
