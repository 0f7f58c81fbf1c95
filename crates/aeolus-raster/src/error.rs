#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
    #[error("cell size must be finite and positive, got {0}")]
    InvalidCellSize(f32),
    #[error("bounding box is not finite or has min > max: {0}")]
    InvalidBounds(String),
    #[error("intersection backend failed: {0}")]
    Backend(String),
}

/// An overlay cannot be placed inside the composite. This means the shared
/// bounding box was not used upstream; it is never clipped away.
#[derive(Debug, thiserror::Error)]
pub enum AlignmentError {
    #[error("overlay {index} has cell size {overlay} but the base uses {base}")]
    CellSizeMismatch { index: usize, base: f32, overlay: f32 },
    #[error(
        "overlay {index} ({width}x{height}) at cell offset ({dx}, {dy}) falls outside the {base_width}x{base_height} base"
    )]
    OutOfBounds {
        index: usize,
        dx: i64,
        dy: i64,
        width: usize,
        height: usize,
        base_width: usize,
        base_height: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("cannot crop a {width}x{height} map to a {size}x{size} window")]
    TooSmall {
        width: usize,
        height: usize,
        size: usize,
    },
    #[error("crop window must be at least 1x1")]
    EmptyWindow,
}
