//! Narrow capability interfaces the pipeline consumes.
//!
//! Terrain derivatives and vector overlays are computed elsewhere; the
//! pipeline only sees these traits, so tests drive it with in-memory mocks.
//! Reference implementations live in [`crate::terrain`] and [`crate::overlay`].

use crate::covariates::{CovariateStack, GRADIENT, MEANCURV, PROFCURV, TANCURV, TOTAL_ACCUM};
use crate::error::{Result, ScarpError};
use crate::grid::{Crs, Grid};
use crate::point::SitePoint;
use crate::reproject::passes_through;

/// Surface derivatives of one elevation grid, co-registered with it.
#[derive(Debug, Clone)]
pub struct SurfaceDerivatives {
    pub gradient: Grid,
    pub tangential_curvature: Grid,
    pub profile_curvature: Grid,
    pub mean_curvature: Grid,
    /// Upslope contributing area.
    pub total_accumulation: Grid,
}

impl SurfaceDerivatives {
    /// Start a stack in the persisted column order.
    pub fn into_stack(self) -> Result<CovariateStack> {
        let mut stack = CovariateStack::new();
        stack.insert(GRADIENT, self.gradient)?;
        stack.insert(TANCURV, self.tangential_curvature)?;
        stack.insert(PROFCURV, self.profile_curvature)?;
        stack.insert(MEANCURV, self.mean_curvature)?;
        stack.insert(TOTAL_ACCUM, self.total_accumulation)?;
        Ok(stack)
    }
}

pub trait TerrainDerivativeProvider: Send + Sync {
    /// Gradient, curvatures and total accumulation over a window of
    /// `length_scale` map units.
    fn derivatives(&self, elevation: &Grid, length_scale: f64) -> Result<SurfaceDerivatives>;

    /// Partial contributing area for a storm of `duration_hours` with lateral
    /// hydraulic conductivity `conductivity` (m/s).
    fn partial_contributing_area(
        &self,
        elevation: &Grid,
        duration_hours: f64,
        conductivity: f64,
    ) -> Result<Grid>;
}

pub trait VectorOverlayProvider: Send + Sync {
    /// Rock class of the polygon containing each coordinate (given in `crs`).
    fn rock_class(&self, crs: &Crs, coords: &[[f64; 2]]) -> Result<Vec<Option<String>>>;

    /// Distance from each cell centre of `reference` to the nearest road.
    ///
    /// All cells are missing when no road intersects the grid.
    fn distance_to_road(&self, reference: &Grid) -> Result<Grid>;

    /// Bilinear values of every stack layer at each coordinate, in stack order.
    fn sample_stack(&self, stack: &CovariateStack, coords: &[[f64; 2]]) -> Vec<Vec<Option<f64>>> {
        coords
            .iter()
            .map(|&[x, y]| {
                stack
                    .names()
                    .map(|name| stack.get(name).and_then(|g| g.sample(x, y)))
                    .collect()
            })
            .collect()
    }

    /// Express `points` in `target`.
    ///
    /// Points already in `target`, or with an unknown CRS, pass through; any
    /// other CRS is rejected. Providers that can transform override this.
    fn reproject(&self, points: &[SitePoint], target: &Crs) -> Result<Vec<SitePoint>> {
        points
            .iter()
            .map(|p| {
                if passes_through(&p.crs, target) {
                    Ok(SitePoint { crs: target.clone(), ..p.clone() })
                } else {
                    Err(ScarpError::CrsMismatch {
                        points: p.crs.to_string(),
                        grid: target.to_string(),
                    })
                }
            })
            .collect()
    }
}
