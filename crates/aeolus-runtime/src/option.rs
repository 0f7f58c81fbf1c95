use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::GeometryKey;
use crate::error::GenerationServiceError;
use crate::services::MeshBlob;

/// One row of the design space: footprint placement relative to the site centre
/// and the block dimensions handed to the generator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignOption {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub height: f64,
    pub depth: f64,
    pub width: f64,
}

impl Default for DesignOption {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            height: 100.0,
            depth: 30.0,
            width: 30.0,
        }
    }
}

impl DesignOption {
    pub fn geometry_params(&self) -> GeometryParams {
        GeometryParams {
            width: self.width,
            depth: self.depth,
            height: self.height,
        }
    }
}

/// Input to candidate generation. Placement is not part of it: two options that
/// differ only in (x, y) share one generated geometry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GeometryParams {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

impl GeometryParams {
    pub fn validate(&self) -> Result<(), GenerationServiceError> {
        for (name, v) in [
            ("width", self.width),
            ("depth", self.depth),
            ("height", self.height),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(GenerationServiceError::InvalidParams(format!(
                    "{name} must be a positive number, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// A scored option. Immutable once produced.
#[derive(Clone, Debug)]
pub struct OptionResult {
    pub index: usize,
    pub option: DesignOption,
    pub key: GeometryKey,
    pub geometry: Arc<MeshBlob>,
    pub score: f64,
    /// Number of heatmap cells the score averages; 0 means the fallback score was used.
    pub scored_cells: usize,
}
