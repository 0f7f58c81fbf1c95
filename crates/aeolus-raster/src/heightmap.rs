/// World-space (x, y) of a raster's reference corner: `(bbox.max.x, bbox.min.y)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

impl Anchor {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Row-major grid of cell values. Row index follows world Y, column index world X.
/// `None` marks a cell no ray hit, which is distinct from a value of zero.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightMap {
    width: usize,
    height: usize,
    cell_size: f32,
    anchor: Anchor,
    cells: Vec<Option<f32>>,
}

impl HeightMap {
    /// All-masked map.
    pub fn masked(width: usize, height: usize, cell_size: f32, anchor: Anchor) -> Self {
        Self {
            width,
            height,
            cell_size,
            anchor,
            cells: vec![None; width * height],
        }
    }

    /// # Panics
    /// If `cells.len() != width * height`.
    pub fn from_cells(
        width: usize,
        height: usize,
        cell_size: f32,
        anchor: Anchor,
        cells: Vec<Option<f32>>,
    ) -> Self {
        assert_eq!(cells.len(), width * height, "cell count does not match grid");
        Self {
            width,
            height,
            cell_size,
            anchor,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    #[inline]
    pub fn cells(&self) -> &[Option<f32>] {
        &self.cells
    }

    #[inline]
    pub fn idx(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col < self.width && row < self.height {
            self.cells[self.idx(col, row)]
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, col: usize, row: usize, value: Option<f32>) {
        let i = self.idx(col, row);
        self.cells[i] = value;
    }

    #[inline]
    pub fn is_masked(&self, col: usize, row: usize) -> bool {
        self.get(col, row).is_none()
    }

    pub fn hit_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_all_masked(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Unmasked minimum and maximum.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.cells.iter().flatten().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Arithmetic mean over unmasked cells; `None` when every cell is masked.
    pub fn mean(&self) -> Option<f64> {
        let (sum, n) = self
            .cells
            .iter()
            .flatten()
            .fold((0.0f64, 0usize), |(s, n), &v| (s + f64::from(v), n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Dense copy with masked cells replaced by `fill`.
    pub fn values_or(&self, fill: f32) -> Vec<f32> {
        self.cells.iter().map(|c| c.unwrap_or(fill)).collect()
    }
}
