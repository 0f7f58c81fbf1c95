use std::fmt;
use std::path::PathBuf;

use aeolus_mesh::LoadError;
use aeolus_raster::{AlignmentError, CropError, RasterizeError};
use thiserror::Error;

use crate::services::AssetKind;

/// Pipeline step an option was in when something went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Generate,
    Load,
    Rasterize,
    Merge,
    Crop,
    Analyze,
    Score,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Generate => "generate",
            Stage::Load => "load",
            Stage::Rasterize => "rasterize",
            Stage::Merge => "merge",
            Stage::Crop => "crop",
            Stage::Analyze => "analyze",
            Stage::Score => "score",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum GenerationServiceError {
    #[error("invalid geometry parameters: {0}")]
    InvalidParams(String),
    #[error("geometry generation failed: {0}")]
    Failed(String),
    #[error("geometry generation I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure from the remote wind-comfort analysis. `transient` marks failures worth
/// retrying (timeouts, connection drops, 5xx/429); everything else is fatal for the
/// option.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AnalysisServiceError {
    pub message: String,
    pub status: Option<u16>,
    pub transient: bool,
}

impl AnalysisServiceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            transient: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            transient: false,
        }
    }

    /// Classify an HTTP status: 408, 429 and 5xx are retryable.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let transient = status == 408 || status == 429 || (500..600).contains(&status);
        Self {
            message: format!("analysis service returned {status}: {}", body.into()),
            status: Some(status),
            transient,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{asset} asset not found at {}", path.display())]
    NotFound { asset: AssetKind, path: PathBuf },
    #[error("cannot tell the mesh format of {asset} asset {name:?}")]
    UnknownFormat { asset: AssetKind, name: String },
    #[error("reading {asset} asset")]
    Io {
        asset: AssetKind,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding results: {0}")]
    Encode(String),
}

/// Cause of a failed option.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Generate(#[from] GenerationServiceError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Rasterize(#[from] RasterizeError),
    #[error(transparent)]
    Align(#[from] AlignmentError),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error(transparent)]
    Analysis(#[from] AnalysisServiceError),
    #[error("cancelled after another option failed")]
    Cancelled,
}

#[derive(Debug, Error)]
#[error("option {option} failed during {stage}: {source}")]
pub struct OptionError {
    pub option: usize,
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl OptionError {
    pub fn new(option: usize, stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            option,
            stage,
            source: source.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, StageError::Cancelled)
    }
}

/// Failure of a whole run, before, after or (under the abort policy) during the
/// per-option loop.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("loading {asset} mesh")]
    Load {
        asset: AssetKind,
        #[source]
        source: LoadError,
    },
    #[error("terrain mesh has no faces, so there is no site to analyse")]
    EmptyTerrain,
    #[error("rasterizing {asset}")]
    Rasterize {
        asset: AssetKind,
        #[source]
        source: RasterizeError,
    },
    #[error("cropping site raster to the analysis window")]
    Crop(#[source] CropError),
    #[error("run aborted")]
    Aborted(#[source] OptionError),
    #[error("writing {sink} results")]
    Store {
        sink: &'static str,
        #[source]
        source: StorageError,
    },
    #[error("building worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
