use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aeolus_mesh::MeshFormat;
use aeolus_runtime::{
    DesignOption, FullResultsSink, MeshBlob, OptionResult, StorageError, TopNSink,
};
use serde::Serialize;

pub const RESULTS_FILE: &str = "alternatives.json";

/// Writes run outputs into one directory: `alternative-{rank}.{ext}` for the
/// best geometries and `alternatives.json` for the full ranking.
#[derive(Clone, Debug)]
pub struct DirectoryStorage {
    dir: PathBuf,
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    rank: usize,
    index: usize,
    option: &'a DesignOption,
    key: String,
    score: f64,
    scored_cells: usize,
    format: MeshFormat,
    bytes: usize,
}

impl DirectoryStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn alternative_path(&self, rank: usize, format: MeshFormat) -> PathBuf {
        self.dir
            .join(format!("alternative-{rank}.{}", format.extension()))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    // The top list is replaced whole; earlier runs may have stored more ranks or
    // other formats.
    fn clear_alternatives(&self) -> Result<(), StorageError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let ranked = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("alternative-"))
                .is_some_and(|r| r.parse::<usize>().is_ok());
            if ranked && path.is_file() {
                fs::remove_file(&path)?;
                log::debug!("removed stale {}", path.display());
            }
        }
        Ok(())
    }
}

impl TopNSink for DirectoryStorage {
    fn store_top(&self, geometries: &[Arc<MeshBlob>]) -> Result<(), StorageError> {
        self.ensure_dir()?;
        self.clear_alternatives()?;
        for (rank, blob) in geometries.iter().enumerate() {
            let path = self.alternative_path(rank, blob.format);
            fs::write(&path, &blob.bytes)?;
            log::debug!("stored {} ({} bytes)", path.display(), blob.len());
        }
        log::info!(
            "stored {} alternatives in {}",
            geometries.len(),
            self.dir.display()
        );
        Ok(())
    }
}

impl FullResultsSink for DirectoryStorage {
    fn store_all(&self, results: &[OptionResult]) -> Result<(), StorageError> {
        self.ensure_dir()?;
        let records: Vec<ResultRecord<'_>> = results
            .iter()
            .enumerate()
            .map(|(rank, r)| ResultRecord {
                rank,
                index: r.index,
                option: &r.option,
                key: r.key.to_string(),
                score: r.score,
                scored_cells: r.scored_cells,
                format: r.geometry.format,
                bytes: r.geometry.len(),
            })
            .collect();
        let path = self.dir.join(RESULTS_FILE);
        let mut out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut out, &records)
            .map_err(|e| StorageError::Encode(e.to_string()))?;
        out.flush()?;
        log::info!("wrote {} results to {}", records.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeolus_runtime::{GeometryKey, GeometryParams};

    fn result(index: usize, score: f64, format: MeshFormat) -> OptionResult {
        let option = DesignOption {
            x: index as f64,
            ..DesignOption::default()
        };
        OptionResult {
            index,
            option,
            key: GeometryKey::from_params(&GeometryParams {
                width: 30.0,
                depth: 30.0,
                height: 100.0,
            }),
            geometry: Arc::new(MeshBlob::new(vec![index as u8; 4], format)),
            score,
            scored_cells: 10,
        }
    }

    #[test]
    fn top_geometries_are_numbered_by_rank() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path().join("nested/out"));
        let blobs = vec![
            Arc::new(MeshBlob::new(vec![1, 2, 3], MeshFormat::Stl)),
            Arc::new(MeshBlob::new(vec![4], MeshFormat::Glb)),
        ];
        storage.store_top(&blobs).unwrap();
        let first = fs::read(storage.alternative_path(0, MeshFormat::Stl)).unwrap();
        assert_eq!(first, vec![1, 2, 3]);
        assert!(storage.dir().join("alternative-1.glb").exists());
    }

    #[test]
    fn shorter_top_list_replaces_the_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path());
        let blob = |b: u8, format| Arc::new(MeshBlob::new(vec![b], format));
        storage
            .store_top(&[
                blob(1, MeshFormat::Stl),
                blob(2, MeshFormat::Stl),
                blob(3, MeshFormat::Glb),
            ])
            .unwrap();
        storage.store_all(&[]).unwrap();
        storage.store_top(&[blob(9, MeshFormat::Glb)]).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["alternative-0.glb", RESULTS_FILE]);
        assert_eq!(fs::read(dir.path().join("alternative-0.glb")).unwrap(), vec![9]);
    }

    #[test]
    fn results_file_lists_ranked_options() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path());
        storage
            .store_all(&[result(2, 0.5, MeshFormat::Stl), result(0, 1.5, MeshFormat::Stl)])
            .unwrap();
        let text = fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["rank"], 0);
        assert_eq!(rows[0]["index"], 2);
        assert_eq!(rows[0]["option"]["x"], 2.0);
        assert_eq!(rows[0]["key"], "30x30x100");
        assert!(rows[0].get("geometry_key").is_none());
        assert_eq!(rows[1]["score"], 1.5);
        assert_eq!(rows[1]["format"], "stl");
    }

    #[test]
    fn empty_results_still_write_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DirectoryStorage::new(dir.path());
        storage.store_all(&[]).unwrap();
        storage.store_top(&[]).unwrap();
        let text = fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        assert_eq!(text.trim(), "[]");
    }
}
