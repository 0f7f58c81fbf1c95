use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use aeolus_mesh::MeshFormat;
use aeolus_runtime::{AssetKind, FetchError, MeshBlob, MeshFetchService};

/// Reads site assets from local files; the format comes from the file extension.
#[derive(Clone, Debug)]
pub struct DirectoryFetch {
    terrain: PathBuf,
    surroundings: PathBuf,
}

impl DirectoryFetch {
    pub fn new(terrain: impl Into<PathBuf>, surroundings: impl Into<PathBuf>) -> Self {
        Self {
            terrain: terrain.into(),
            surroundings: surroundings.into(),
        }
    }

    pub fn path(&self, asset: AssetKind) -> &Path {
        match asset {
            AssetKind::Terrain => &self.terrain,
            AssetKind::Surroundings => &self.surroundings,
        }
    }
}

/// Mesh format implied by a path's extension.
pub fn format_of(path: &Path) -> Option<MeshFormat> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(MeshFormat::from_extension)
}

impl MeshFetchService for DirectoryFetch {
    fn fetch(&self, asset: AssetKind) -> Result<MeshBlob, FetchError> {
        let path = self.path(asset);
        let format = format_of(path).ok_or_else(|| FetchError::UnknownFormat {
            asset,
            name: path.display().to_string(),
        })?;
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => FetchError::NotFound {
                asset,
                path: path.to_path_buf(),
            },
            _ => FetchError::Io { asset, source },
        })?;
        log::debug!("read {asset} from {} ({} bytes)", path.display(), bytes.len());
        Ok(MeshBlob::new(bytes, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let terrain = dir.path().join("ground.OBJ");
        fs::write(&terrain, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let fetch = DirectoryFetch::new(&terrain, dir.path().join("context.stl"));
        let blob = fetch.fetch(AssetKind::Terrain).unwrap();
        assert_eq!(blob.format, MeshFormat::Obj);
        assert!(matches!(
            fetch.fetch(AssetKind::Surroundings),
            Err(FetchError::NotFound {
                asset: AssetKind::Surroundings,
                ..
            })
        ));
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let fetch = DirectoryFetch::new("site.fbx", "context.glb");
        assert!(matches!(
            fetch.fetch(AssetKind::Terrain),
            Err(FetchError::UnknownFormat { .. })
        ));
    }
}
