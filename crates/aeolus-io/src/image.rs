//! Grayscale PNG previews of height rasters.

use std::path::Path;

use aeolus_raster::HeightMap;
use image::{GrayImage, ImageFormat, Luma};

/// One pixel per cell, north up. Masked cells render black, the same as the
/// highest surface; cells hold depth, so brighter means lower.
pub fn depth_image(map: &HeightMap) -> GrayImage {
    let (w, h) = (map.width() as u32, map.height() as u32);
    GrayImage::from_fn(w, h, |x, y| {
        // image rows run top-down, raster rows follow world Y upward
        let row = (h - 1 - y) as usize;
        let v = map.get(x as usize, row).unwrap_or(0.0);
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

pub fn write_depth_png(map: &HeightMap, path: &Path) -> Result<(), image::ImageError> {
    depth_image(map).save_with_format(path, ImageFormat::Png)?;
    log::info!(
        "wrote {}x{} depth preview to {}",
        map.width(),
        map.height(),
        path.display()
    );
    Ok(())
}
