use std::cmp::Ordering;

use crate::{AlignmentError, Anchor, CropError, HeightMap};

/// Side of the square analysis window unless configured otherwise.
pub const DEFAULT_WINDOW: usize = 500;

/// Center-crop `map` to `size x size`, moving the anchor to the max-x / min-y
/// corner of the window.
///
/// [`merge`] counts overlay offsets from column 0, so a cropped map lines up only
/// with maps cropped the same way from grids of the same shape. It does not line
/// up with its uncropped source.
pub fn crop(map: &HeightMap, size: usize) -> Result<HeightMap, CropError> {
    if size == 0 {
        return Err(CropError::EmptyWindow);
    }
    let (w, h) = (map.width(), map.height());
    if w < size || h < size {
        return Err(CropError::TooSmall {
            width: w,
            height: h,
            size,
        });
    }
    let sx = (w - size) / 2;
    let sy = (h - size) / 2;

    let mut cells = Vec::with_capacity(size * size);
    for row in sy..sy + size {
        let start = map.idx(sx, row);
        cells.extend_from_slice(&map.cells()[start..start + size]);
    }

    // anchor sits on the max-x / min-y corner
    let cell = map.cell_size();
    let trimmed_high_x = (w - size - sx) as f32;
    let anchor = Anchor::new(
        map.anchor().x - trimmed_high_x * cell,
        map.anchor().y + sy as f32 * cell,
    );
    Ok(HeightMap::from_cells(size, size, cell, anchor, cells))
}

/// Additively composite `overlays` onto a copy of `base`.
///
/// Each overlay's column 0 / row 0 lands at
/// `round((overlay.anchor - base.anchor) / cell_size)` cells into `base`.
/// A masked cell contributes nothing; a cell stays masked only if every
/// contributor is masked. Overlays are applied in a canonical order, so the output
/// is bit-identical whatever order they are passed in.
pub fn merge(base: &HeightMap, overlays: &[&HeightMap]) -> Result<HeightMap, AlignmentError> {
    let cell = base.cell_size();
    let mut placed: Vec<(i64, i64, &HeightMap)> = Vec::with_capacity(overlays.len());
    for (index, ov) in overlays.iter().enumerate() {
        if (ov.cell_size() - cell).abs() > cell * 1e-6 {
            return Err(AlignmentError::CellSizeMismatch {
                index,
                base: cell,
                overlay: ov.cell_size(),
            });
        }
        let dx = ((ov.anchor().x - base.anchor().x) / cell).round() as i64;
        let dy = ((ov.anchor().y - base.anchor().y) / cell).round() as i64;
        let fits = dx >= 0
            && dy >= 0
            && dx as usize + ov.width() <= base.width()
            && dy as usize + ov.height() <= base.height();
        if !fits {
            return Err(AlignmentError::OutOfBounds {
                index,
                dx,
                dy,
                width: ov.width(),
                height: ov.height(),
                base_width: base.width(),
                base_height: base.height(),
            });
        }
        placed.push((dx, dy, *ov));
    }

    placed.sort_by(|a, b| canonical_cmp(a, b));

    let mut out = base.clone();
    for (dx, dy, ov) in placed {
        let (dx, dy) = (dx as usize, dy as usize);
        for row in 0..ov.height() {
            for col in 0..ov.width() {
                let add = ov.get(col, row);
                let cur = out.get(col + dx, row + dy);
                let sum = match (cur, add) {
                    (Some(a), Some(b)) => Some(a + b),
                    (a, None) => a,
                    (None, b) => b,
                };
                out.set(col + dx, row + dy, sum);
            }
        }
    }
    Ok(out)
}

// Total order over placed overlays: placement, shape, then cell contents.
fn canonical_cmp(a: &(i64, i64, &HeightMap), b: &(i64, i64, &HeightMap)) -> Ordering {
    (a.0, a.1, a.2.width(), a.2.height())
        .cmp(&(b.0, b.1, b.2.width(), b.2.height()))
        .then_with(|| {
            a.2.cells()
                .iter()
                .zip(b.2.cells())
                .map(|(x, y)| cell_cmp(*x, *y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
}

fn cell_cmp(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    }
}
