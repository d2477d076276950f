//! Named, co-registered covariate grids for one basin.

use crate::error::{Result, ScarpError};
use crate::grid::Grid;

pub const GRADIENT: &str = "gradient";
pub const TANCURV: &str = "tancurv";
pub const PROFCURV: &str = "profcurv";
pub const MEANCURV: &str = "meancurv";
pub const DIST_TO_ROAD: &str = "dist_to_road";
pub const TOTAL_ACCUM: &str = "total_accum";
pub const ROCK_CLASS: &str = "rock_class";
pub const AGE: &str = "age";

/// Covariates whose observed envelope defines where negatives may be drawn.
pub const BOUNDARY_COVARIATES: [&str; 4] = [GRADIENT, TANCURV, PROFCURV, MEANCURV];

/// Column name of the partial contributing area for a storm duration (hours).
///
/// Whole-hour durations print without a fractional part (`pca_24`).
pub fn pca_name(duration_hours: f64) -> String {
    if duration_hours.fract() == 0.0 {
        format!("pca_{}", duration_hours as i64)
    } else {
        format!("pca_{duration_hours}")
    }
}

/// Insertion-ordered covariate name → grid mapping.
///
/// Every member shares the first grid's dimensions, transform and CRS; the
/// check runs on insert so a stack can never hold mismatched layers.
#[derive(Debug, Clone, Default)]
pub struct CovariateStack {
    layers: Vec<(String, Grid)>,
}

impl CovariateStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer, replacing an existing one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, grid: Grid) -> Result<()> {
        let name = name.into();
        if let Some((_, first)) = self.layers.first() {
            if !first.same_geometry(&grid) {
                return Err(ScarpError::NotCoRegistered {
                    name,
                    reason: format!(
                        "{}x{} {} vs {}x{} {}",
                        grid.width, grid.height, grid.crs, first.width, first.height, first.crs
                    ),
                });
            }
        }
        match self.layers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = grid,
            None => self.layers.push((name, grid)),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Grid> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, g)| g)
    }

    pub fn require(&self, name: &str) -> Result<&Grid> {
        self.get(name).ok_or_else(|| ScarpError::MissingCovariate(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The geometry every layer shares, if any layer exists.
    pub fn reference(&self) -> Option<&Grid> {
        self.layers.first().map(|(_, g)| g)
    }

    /// Grids for `names`, in order. Fails on the first absent name.
    pub fn select(&self, names: &[&str]) -> Result<Vec<&Grid>> {
        names.iter().map(|n| self.require(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Crs, GeoTransform};

    fn grid(origin_x: f64) -> Grid {
        Grid::new(3, 3, GeoTransform::new(origin_x, 30.0, 10.0, -10.0), Crs::epsg(32610), 1.0)
    }

    #[test]
    fn insert_keeps_order_and_replaces_by_name() {
        let mut s = CovariateStack::new();
        s.insert(GRADIENT, grid(0.0)).unwrap();
        s.insert(TANCURV, grid(0.0)).unwrap();
        s.insert(GRADIENT, grid(0.0).filled_like(5.0)).unwrap();
        assert_eq!(s.names().collect::<Vec<_>>(), vec![GRADIENT, TANCURV]);
        assert_eq!(s.get(GRADIENT).unwrap().get(0, 0), 5.0);
    }

    #[test]
    fn insert_rejects_misregistered_grid() {
        let mut s = CovariateStack::new();
        s.insert(GRADIENT, grid(0.0)).unwrap();
        let err = s.insert(TANCURV, grid(5.0)).unwrap_err();
        assert!(matches!(err, ScarpError::NotCoRegistered { .. }));
    }

    #[test]
    fn require_reports_missing_name() {
        let s = CovariateStack::new();
        assert!(matches!(s.require(MEANCURV), Err(ScarpError::MissingCovariate(n)) if n == MEANCURV));
    }

    #[test]
    fn pca_names_drop_integral_fraction() {
        assert_eq!(pca_name(24.0), "pca_24");
        assert_eq!(pca_name(1.5), "pca_1.5");
    }
}
