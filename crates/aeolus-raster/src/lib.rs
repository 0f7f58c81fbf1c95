//! Top-down height rasters: ray casting, cropping and anchored merging.
#![forbid(unsafe_code)]

mod align;
mod bvh;
mod error;
mod heightmap;
mod rasterize;

pub use align::{DEFAULT_WINDOW, crop, merge};
pub use bvh::Bvh;
pub use error::{AlignmentError, CropError, RasterizeError};
pub use heightmap::{Anchor, HeightMap};
pub use rasterize::{DEFAULT_CELL_SIZE, RasterSettings, Rasterizer, grid_dims};
