use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, ScarpError};

/// Coordinate reference system tag, e.g. `EPSG:26910`.
/// An empty tag means the CRS is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(pub String);

impl Crs {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{code}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            f.write_str("<unknown CRS>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// North-up affine cell → coordinate transform.
///
/// `(origin_x, origin_y)` is the outer corner of cell (0, 0); `cell_height`
/// is negative for the usual north-up layout where row 0 is the northern edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_width: f64,
    pub cell_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, cell_width: f64, cell_height: f64) -> Self {
        Self { origin_x, origin_y, cell_width, cell_height }
    }

    /// Coordinates of the centre of cell `(row, col)`.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_width,
            self.origin_y + (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Fractional `(row, col)` of a coordinate, measured in cell-centre units
    /// (cell centres land on integers).
    #[inline]
    pub fn fractional_index(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (y - self.origin_y) / self.cell_height - 0.5,
            (x - self.origin_x) / self.cell_width - 0.5,
        )
    }

    /// Isotropic cell size in map units (mean of |width| and |height|).
    pub fn cell_size(&self) -> f64 {
        (self.cell_width.abs() + self.cell_height.abs()) / 2.0
    }

    pub fn cell_area(&self) -> f64 {
        (self.cell_width * self.cell_height).abs()
    }

    fn approx_eq(&self, other: &Self) -> bool {
        let tol = 1e-9 * self.cell_size().max(1.0);
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.cell_width - other.cell_width).abs() <= tol
            && (self.cell_height - other.cell_height).abs() <= tol
    }
}

/// A single-band raster of f32 cell values, row-major, row 0 at `origin_y`.
///
/// Missing cells are NaN or equal to `nodata`. Grids are treated as immutable
/// once a terrain or overlay provider hands them over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    /// Missing cells serialize as JSON `null` and read back as NaN.
    #[serde(deserialize_with = "nullable_cells")]
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    #[serde(default)]
    pub nodata: Option<f32>,
    #[serde(default)]
    pub crs: Crs,
}

impl Grid {
    /// Create a new grid filled with `fill`.
    pub fn new(width: usize, height: usize, transform: GeoTransform, crs: Crs, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            transform,
            nodata: None,
            crs,
        }
    }

    /// Wrap existing row-major data, checking the shape. Zero-sized grids
    /// are rejected.
    pub fn from_data(
        data: Vec<f32>,
        width: usize,
        height: usize,
        transform: GeoTransform,
        nodata: Option<f32>,
        crs: Crs,
    ) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(ScarpError::GridShape { width, height, len: data.len() });
        }
        Ok(Self { data, width, height, transform, nodata, crs })
    }

    /// A grid with the same geometry and CRS as `self`, filled with `fill`.
    pub fn filled_like(&self, fill: f32) -> Self {
        Self::new(self.width, self.height, self.transform, self.crs.clone(), fill)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    #[inline]
    pub fn is_valid(&self, v: f32) -> bool {
        v.is_finite() && self.nodata.map_or(true, |nd| v != nd)
    }

    /// Cell value, or `None` for NaN / nodata.
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        let v = self.get(row, col);
        self.is_valid(v).then_some(v)
    }

    /// Cell value by flat index, or `None` for NaN / nodata.
    #[inline]
    pub fn value_at(&self, index: usize) -> Option<f32> {
        let v = self.data[index];
        self.is_valid(v).then_some(v)
    }

    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.cell_center(row, col)
    }

    /// `(min_x, min_y, max_x, max_y)` of the outer cell edges.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let t = &self.transform;
        let x0 = t.origin_x;
        let x1 = t.origin_x + self.width as f64 * t.cell_width;
        let y0 = t.origin_y;
        let y1 = t.origin_y + self.height as f64 * t.cell_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (min_x, min_y, max_x, max_y) = self.extent();
        x >= min_x && x <= max_x && y >= min_y && y <= max_y
    }

    /// Cell containing `(x, y)`, or `None` outside the extent.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !self.contains(x, y) || self.is_empty() {
            return None;
        }
        let (fr, fc) = self.transform.fractional_index(x, y);
        let row = ((fr + 0.5).floor().max(0.0) as usize).min(self.height - 1);
        let col = ((fc + 0.5).floor().max(0.0) as usize).min(self.width - 1);
        Some((row, col))
    }

    /// True when `other` has the same dimensions, transform and CRS.
    pub fn same_geometry(&self, other: &Grid) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && self.transform.approx_eq(&other.transform)
    }

    /// Bilinear interpolation between the four surrounding cell centres.
    ///
    /// Returns `None` outside the grid extent or when any of the four cells
    /// is missing. Points between the outer edge and the first row/column of
    /// centres use the edge cells.
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        if self.is_empty() || !self.contains(x, y) {
            return None;
        }
        let (fr, fc) = self.transform.fractional_index(x, y);
        let fr = fr.clamp(0.0, (self.height - 1) as f64);
        let fc = fc.clamp(0.0, (self.width - 1) as f64);

        let r0 = fr.floor() as usize;
        let c0 = fc.floor() as usize;
        let r1 = (r0 + 1).min(self.height - 1);
        let c1 = (c0 + 1).min(self.width - 1);

        let ty = fr - r0 as f64;
        let tx = fc - c0 as f64;

        let v00 = self.value(r0, c0)? as f64;
        let v01 = self.value(r0, c1)? as f64;
        let v10 = self.value(r1, c0)? as f64;
        let v11 = self.value(r1, c1)? as f64;

        Some(
            v00 * (1.0 - tx) * (1.0 - ty)
                + v01 * tx * (1.0 - ty)
                + v10 * (1.0 - tx) * ty
                + v11 * tx * ty,
        )
    }

    /// Number of valid (non-missing) cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| self.is_valid(v)).count()
    }
}

fn nullable_cells<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<f32>, D::Error> {
    let cells: Vec<Option<f32>> = Vec::deserialize(d)?;
    Ok(cells.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
}

/// Boolean raster sharing a grid's geometry. `true` marks an eligible cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub cells: Vec<bool>,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl Mask {
    /// A mask with the geometry of `grid`, every cell set to `value`.
    pub fn like(grid: &Grid, value: bool) -> Self {
        Self {
            cells: vec![value; grid.width * grid.height],
            width: grid.width,
            height: grid.height,
            transform: grid.transform,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.cells[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: bool) {
        self.cells[row * self.width + col] = val;
    }

    /// Cell-wise conjunction. Both masks must share dimensions and transform.
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        if self.width != other.width
            || self.height != other.height
            || !self.transform.approx_eq(&other.transform)
        {
            return Err(ScarpError::NotCoRegistered {
                name: "mask".into(),
                reason: format!(
                    "{}x{} vs {}x{}",
                    self.width, self.height, other.width, other.height
                ),
            });
        }
        let cells = self.cells.iter().zip(&other.cells).map(|(&a, &b)| a && b).collect();
        Ok(Mask { cells, ..self.clone() })
    }

    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Flat indices of eligible cells, ascending.
    pub fn eligible_indices(&self) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| c.then_some(i))
            .collect()
    }

    /// Centre coordinates of the cell at flat index `index`.
    pub fn center_of_index(&self, index: usize) -> (f64, f64) {
        self.transform.cell_center(index / self.width, index % self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_4x4() -> Grid {
        // 10 m cells, north-up, top-left corner at (1000, 2000).
        let t = GeoTransform::new(1000.0, 2000.0, 10.0, -10.0);
        let mut g = Grid::new(4, 4, t, Crs::epsg(26910), 0.0);
        for r in 0..4 {
            for c in 0..4 {
                g.set(r, c, (r * 10 + c) as f32);
            }
        }
        g
    }

    #[test]
    fn cell_center_and_fractional_index_agree() {
        let g = grid_4x4();
        let (x, y) = g.cell_center(2, 3);
        assert_relative_eq!(x, 1035.0);
        assert_relative_eq!(y, 1975.0);
        let (fr, fc) = g.transform.fractional_index(x, y);
        assert_relative_eq!(fr, 2.0);
        assert_relative_eq!(fc, 3.0);
        assert_eq!(g.cell_of(x, y), Some((2, 3)));
    }

    #[test]
    fn sample_at_centres_returns_cell_values() {
        let g = grid_4x4();
        let (x, y) = g.cell_center(1, 2);
        assert_relative_eq!(g.sample(x, y).unwrap(), 12.0, epsilon = 1e-9);
    }

    #[test]
    fn sample_between_centres_interpolates() {
        let g = grid_4x4();
        // Halfway between (1,1)=11 and (2,2)=22 → mean of 11, 12, 21, 22.
        let (x, y) = (1020.0, 1980.0);
        assert_relative_eq!(g.sample(x, y).unwrap(), 16.5, epsilon = 1e-9);
    }

    #[test]
    fn sample_out_of_extent_returns_none() {
        let g = grid_4x4();
        assert!(g.sample(999.0, 1990.0).is_none());
        assert!(g.sample(1010.0, 2001.0).is_none());
    }

    #[test]
    fn sample_next_to_nodata_returns_none() {
        let mut g = grid_4x4();
        g.nodata = Some(-9999.0);
        g.set(1, 1, -9999.0);
        assert!(g.sample(1020.0, 1980.0).is_none());
        g.set(1, 1, f32::NAN);
        assert!(g.sample(1020.0, 1980.0).is_none());
        // Far corner is unaffected.
        let (x, y) = g.cell_center(3, 3);
        assert!(g.sample(x, y).is_some());
    }

    #[test]
    fn missing_cells_survive_json() {
        let mut g = grid_4x4();
        g.set(2, 2, f32::NAN);
        let text = serde_json::to_string(&g).unwrap();
        assert!(text.contains("null"));
        let back: Grid = serde_json::from_str(&text).unwrap();
        assert!(back.get(2, 2).is_nan());
        assert_eq!(back.get(2, 1), 21.0);
        assert_eq!(back.valid_count(), 15);
    }

    #[test]
    fn from_data_rejects_bad_shape() {
        let t = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        let err = Grid::from_data(vec![0.0; 5], 2, 2, t, None, Crs::default());
        assert!(matches!(err, Err(ScarpError::GridShape { .. })));
    }

    #[test]
    fn from_data_rejects_empty_dimensions() {
        let t = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        let err = Grid::from_data(vec![], 0, 5, t, None, Crs::default());
        assert!(matches!(err, Err(ScarpError::GridShape { width: 0, height: 5, len: 0 })));
    }

    #[test]
    fn mask_and_requires_matching_geometry() {
        let g = grid_4x4();
        let mut a = Mask::like(&g, true);
        a.set(0, 0, false);
        let b = Mask::like(&g, true);
        assert_eq!(a.and(&b).unwrap().count(), 15);

        let t = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        let other = Mask::like(&Grid::new(4, 4, t, Crs::default(), 0.0), true);
        assert!(a.and(&other).is_err());
    }

    #[test]
    fn mask_center_of_index_matches_grid() {
        let g = grid_4x4();
        let m = Mask::like(&g, true);
        assert_eq!(m.center_of_index(7), g.cell_center(1, 3));
    }
}
