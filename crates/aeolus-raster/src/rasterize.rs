use std::time::Instant;

use aeolus_geom::{Aabb, Ray, Vec3};
use aeolus_mesh::Mesh;
use rayon::prelude::*;
use serde::Deserialize;

use crate::{Anchor, Bvh, HeightMap, RasterizeError};

/// World units per raster cell unless configured otherwise.
pub const DEFAULT_CELL_SIZE: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct RasterSettings {
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    /// Height above the highest surface the rays start from.
    #[serde(default = "default_ray_margin")]
    pub ray_margin: f32,
}

fn default_cell_size() -> f32 {
    DEFAULT_CELL_SIZE
}
fn default_ray_margin() -> f32 {
    1.0
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            ray_margin: default_ray_margin(),
        }
    }
}

/// Grid size `(cols, rows)` for `bbox`: extent over cell size, rounded, at least 1.
pub fn grid_dims(bbox: &Aabb, cell_size: f32) -> (usize, usize) {
    let e = bbox.extent();
    let cols = (e.x / cell_size).round().max(1.0) as usize;
    let rows = (e.y / cell_size).round().max(1.0) as usize;
    (cols, rows)
}

// Sample position of index `i` of `n` across [0, 1]; a single sample sits mid-span.
#[inline]
fn sample_t(i: usize, n: usize) -> f32 {
    if n <= 1 {
        0.5
    } else {
        i as f32 / (n - 1) as f32
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Casts one downward ray per cell and records normalised first-hit depth.
#[derive(Clone, Debug, Default)]
pub struct Rasterizer {
    settings: RasterSettings,
}

impl Rasterizer {
    pub fn new(settings: RasterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RasterSettings {
        &self.settings
    }

    /// Rasterize `mesh` over `bbox`, or over the mesh's own bounds when `bbox` is
    /// `None`. Rasters that will be merged must share one `bbox`.
    ///
    /// Cell values are first-hit depths below a common reference plane, scaled to
    /// integers in `[0, 255]` against this raster's own depth range. A raster whose
    /// hits all share one depth is all zeros.
    pub fn rasterize(&self, mesh: &Mesh, bbox: Option<&Aabb>) -> Result<HeightMap, RasterizeError> {
        let cell = self.settings.cell_size;
        if !(cell.is_finite() && cell > 0.0) {
            return Err(RasterizeError::InvalidCellSize(cell));
        }
        let bbox = bbox
            .copied()
            .or_else(|| mesh.bounds())
            .unwrap_or_else(|| Aabb::new(Vec3::ZERO, Vec3::ZERO));
        if !(bbox.min.is_finite() && bbox.max.is_finite() && bbox.is_valid()) {
            return Err(RasterizeError::InvalidBounds(format!("{bbox:?}")));
        }

        let (cols, rows) = grid_dims(&bbox, cell);
        let anchor = Anchor::new(bbox.max.x, bbox.min.y);
        let Some(mesh_bounds) = mesh.bounds() else {
            log::debug!(target: "raster", "empty mesh, emitting {cols}x{rows} masked raster");
            return Ok(HeightMap::masked(cols, rows, cell, anchor));
        };

        let t0 = Instant::now();
        let bvh = Bvh::build(mesh)?;
        // every ray starts on this plane, so it doubles as the depth reference
        let reference_z = bbox.max.z.max(mesh_bounds.max.z) + self.settings.ray_margin;

        let mut depths: Vec<Option<f32>> = vec![None; cols * rows];
        depths
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, row)| {
                let y = lerp(bbox.min.y, bbox.max.y, sample_t(r, rows));
                for (c, out) in row.iter_mut().enumerate() {
                    let x = lerp(bbox.min.x, bbox.max.x, sample_t(c, cols));
                    let ray = Ray::down(Vec3::new(x, y, reference_z));
                    *out = bvh
                        .first_hit(&ray)
                        .map(|t| reference_z - ray.at(t).z);
                }
            });

        let cells = normalize(&depths);
        let map = HeightMap::from_cells(cols, rows, cell, anchor, cells);
        log::debug!(
            target: "raster",
            "{}x{} raster over {} faces: {} hits in {} ms",
            cols,
            rows,
            mesh.face_count(),
            map.hit_count(),
            t0.elapsed().as_millis()
        );
        Ok(map)
    }
}

// in ulps of the largest depth
const FLAT_ULPS: f32 = 4.0;

fn normalize(depths: &[Option<f32>]) -> Vec<Option<f32>> {
    let Some((lo, hi)) = depths.iter().flatten().fold(None, |acc, &d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((f32::min(lo, d), f32::max(hi, d))),
    }) else {
        return depths.to_vec();
    };
    let span = hi - lo;
    // only rounding noise in the hit distances counts as flat
    let flat = span <= FLAT_ULPS * f32::EPSILON * hi.abs();
    depths
        .iter()
        .map(|d| {
            d.map(|d| {
                if !flat {
                    (255.0 * (d - lo) / span).round()
                } else {
                    0.0
                }
            })
        })
        .collect()
}
