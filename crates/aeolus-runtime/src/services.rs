//! Collaborator contracts the run depends on, and the values that cross them.

use std::fmt;
use std::sync::Arc;

use aeolus_mesh::MeshFormat;
use aeolus_raster::HeightMap;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisServiceError, FetchError, GenerationServiceError, StorageError};
use crate::option::{GeometryParams, OptionResult};

/// Encoded mesh bytes and the format they were declared as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshBlob {
    pub bytes: Vec<u8>,
    pub format: MeshFormat,
}

impl MeshBlob {
    pub fn new(bytes: Vec<u8>, format: MeshFormat) -> Self {
        Self { bytes, format }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fixed site assets fetched once per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Terrain,
    Surroundings,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetKind::Terrain => "terrain",
            AssetKind::Surroundings => "surroundings",
        })
    }
}

pub trait GeometryGenerationService: Send + Sync {
    /// Produce the candidate mesh for `params`, Z-up with the footprint in X/Y.
    /// Called at most once per distinct parameter key by [`crate::GeometryCache`].
    fn generate(&self, params: &GeometryParams) -> Result<MeshBlob, GenerationServiceError>;
}

pub trait MeshFetchService: Send + Sync {
    fn fetch(&self, asset: AssetKind) -> Result<MeshBlob, FetchError>;
}

pub trait WindComfortAnalysisService: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<Heatmap, AnalysisServiceError>;
}

/// Receives the geometry of the best-ranked alternatives, best first.
pub trait TopNSink: Send + Sync {
    fn store_top(&self, geometries: &[Arc<MeshBlob>]) -> Result<(), StorageError>;
}

/// Receives every scored alternative, in ranked order.
pub trait FullResultsSink: Send + Sync {
    fn store_all(&self, results: &[OptionResult]) -> Result<(), StorageError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindDirection {
    /// Degrees clockwise from north.
    pub direction: f64,
    pub probability: f64,
    #[serde(rename = "weibull_scale_parameter")]
    pub weibull_scale: f64,
    #[serde(rename = "weibull_shape_parameter")]
    pub weibull_shape: f64,
}

/// Wind climate sent with every analysis request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindRose {
    #[serde(rename = "data")]
    pub directions: Vec<WindDirection>,
    /// Reference height of the wind measurements, metres.
    pub height: f64,
    pub roughness: f64,
}

impl Default for WindRose {
    fn default() -> Self {
        const TABLE: [(f64, f64, f64, f64); 8] = [
            (0.0, 0.09129138313326708, 8.13, 2.639),
            (45.0, 0.0984784769477789, 7.295, 1.8824999999999998),
            (90.0, 0.10994724367306372, 5.39, 1.662),
            (135.0, 0.051150699594770255, 5.625, 1.861),
            (180.0, 0.09771389249942658, 7.67, 2.127),
            (225.0, 0.16285648749904427, 9.125, 2.9745),
            (270.0, 0.17187858398960168, 9.01, 2.404),
            (315.0, 0.21668323266304768, 9.155000000000001, 2.5410000000000004),
        ];
        Self {
            directions: TABLE
                .iter()
                .map(|&(direction, probability, weibull_scale, weibull_shape)| WindDirection {
                    direction,
                    probability,
                    weibull_scale,
                    weibull_shape,
                })
                .collect(),
            height: 100.0,
            roughness: 0.4978,
        }
    }
}

/// Two equally shaped height arrays for one option, normalised to `[0, 1]`
/// against a shared `min_height`/`max_height`. Masked cells are sent as 0.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisRequest {
    pub option: usize,
    pub width: usize,
    pub height: usize,
    /// Site without the candidate.
    pub terrain: Vec<f32>,
    /// Site with the candidate merged in.
    pub augmented: Vec<f32>,
    pub min_height: f32,
    pub max_height: f32,
    pub wind_rose: WindRose,
}

impl AnalysisRequest {
    pub fn from_maps(
        option: usize,
        terrain: &HeightMap,
        augmented: &HeightMap,
        wind_rose: &WindRose,
    ) -> Result<Self, AnalysisServiceError> {
        if (terrain.width(), terrain.height()) != (augmented.width(), augmented.height()) {
            return Err(AnalysisServiceError::fatal(format!(
                "height arrays differ in shape: {}x{} vs {}x{}",
                terrain.width(),
                terrain.height(),
                augmented.width(),
                augmented.height()
            )));
        }
        let (min_height, max_height) = match (terrain.min_max(), augmented.min_max()) {
            (Some((a, b)), Some((c, d))) => (a.min(c), b.max(d)),
            (Some(r), None) | (None, Some(r)) => r,
            (None, None) => (0.0, 0.0),
        };
        let span = max_height - min_height;
        // masked cells read as the floor, which normalises to 0
        let normalize = |m: &HeightMap| -> Vec<f32> {
            m.values_or(min_height)
                .into_iter()
                .map(|v| if span > 0.0 { (v - min_height) / span } else { 0.0 })
                .collect()
        };
        Ok(Self {
            option,
            width: terrain.width(),
            height: terrain.height(),
            terrain: normalize(terrain),
            augmented: normalize(augmented),
            min_height,
            max_height,
            wind_rose: wind_rose.clone(),
        })
    }
}

/// Analysis output: one value per cell plus a mask, `true` where the value is not
/// meaningful.
#[derive(Clone, Debug, PartialEq)]
pub struct Heatmap {
    values: Vec<f64>,
    mask: Vec<bool>,
}

impl Heatmap {
    pub fn new(values: Vec<f64>, mask: Vec<bool>) -> Result<Self, AnalysisServiceError> {
        if values.len() != mask.len() {
            return Err(AnalysisServiceError::fatal(format!(
                "heatmap has {} values but {} mask entries",
                values.len(),
                mask.len()
            )));
        }
        Ok(Self { values, mask })
    }

    /// Heatmap with nothing masked.
    pub fn unmasked(values: Vec<f64>) -> Self {
        let mask = vec![false; values.len()];
        Self { values, mask }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
