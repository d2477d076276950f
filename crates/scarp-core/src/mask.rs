//! Negative-sampling eligibility masks.
//!
//! Two masks are intersected per basin:
//!
//! * the *eligibility* mask keeps cells whose boundary covariates all fall
//!   inside the global [`DomainRange`]. This is a modeling assumption, not a
//!   physical law: landslides are assumed unable to initiate outside the
//!   observed (possibly widened) topographic envelope of the inventory, which
//!   makes the negative domain depend on the positive sample;
//! * the *buffer* mask keeps the annulus `inner < d <= outer` around the
//!   nearest positive point of the same basin. Cells closer than `inner` may
//!   belong to an unrecorded part of a mapped failure; cells beyond `outer`
//!   are treated as outside the inventory's effective survey coverage.

use rayon::prelude::*;
use rstar::RTree;

use crate::covariates::CovariateStack;
use crate::domain::DomainRange;
use crate::error::{Result, ScarpError};
use crate::grid::{Grid, Mask};
use crate::point::SitePoint;

/// Build the eligibility mask of `stack` against `range`.
///
/// A cell is eligible when every covariate named by `range` is present at the
/// cell and lies in its inclusive interval.
pub fn eligibility_mask(stack: &CovariateStack, range: &DomainRange) -> Result<Mask> {
    let layers = range
        .covariates()
        .map(|(name, interval)| Ok((stack.require(name)?, interval)))
        .collect::<Result<Vec<_>>>()?;
    let Some((reference, _)) = layers.first() else {
        return Err(ScarpError::EmptyDomain);
    };

    let mut mask = Mask::like(reference, false);
    for (i, cell) in mask.cells.iter_mut().enumerate() {
        *cell = layers.iter().all(|(grid, interval)| {
            grid.value_at(i).is_some_and(|v| interval.contains(v as f64))
        });
    }
    Ok(mask)
}

/// Inner and outer exclusion radii in map units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSpec {
    inner: f64,
    outer: f64,
}

impl BufferSpec {
    /// Both radii must be positive and `outer > inner`.
    pub fn new(inner: f64, outer: f64) -> Result<Self> {
        if !(inner.is_finite() && inner > 0.0) {
            return Err(ScarpError::InvalidConfig {
                key: "inner_buffer",
                reason: format!("must be a positive distance, got {inner}"),
            });
        }
        if !(outer.is_finite() && outer > inner) {
            return Err(ScarpError::InvalidConfig {
                key: "outer_buffer",
                reason: format!("must exceed inner_buffer ({inner}), got {outer}"),
            });
        }
        Ok(Self { inner, outer })
    }

    pub fn inner(&self) -> f64 {
        self.inner
    }

    pub fn outer(&self) -> f64 {
        self.outer
    }

    #[inline]
    pub fn admits(&self, distance: f64) -> bool {
        distance > self.inner && distance <= self.outer
    }
}

/// Nearest-neighbour index over one basin's positive points.
pub struct NearestPositive {
    tree: RTree<[f64; 2]>,
}

impl NearestPositive {
    /// Index the points with finite coordinates.
    pub fn new(points: &[SitePoint]) -> Self {
        let coords: Vec<[f64; 2]> = points
            .iter()
            .filter(|p| p.has_finite_coords())
            .map(SitePoint::xy)
            .collect();
        Self { tree: RTree::bulk_load(coords) }
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Euclidean distance to the nearest indexed point.
    pub fn distance(&self, x: f64, y: f64) -> Option<f64> {
        self.tree
            .nearest_neighbor(&[x, y])
            .map(|p| ((p[0] - x).powi(2) + (p[1] - y).powi(2)).sqrt())
    }
}

/// Build the buffer exclusion mask over `reference`'s cells.
///
/// Distances are measured from cell centres to the nearest of `points`; with
/// no points every cell is excluded.
pub fn buffer_mask(points: &[SitePoint], reference: &Grid, spec: &BufferSpec) -> Mask {
    let index = NearestPositive::new(points);
    let mut mask = Mask::like(reference, false);
    if index.is_empty() || reference.width == 0 {
        return mask;
    }

    let width = reference.width;
    let transform = reference.transform;
    mask.cells
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, cells)| {
            for (col, cell) in cells.iter_mut().enumerate() {
                let (x, y) = transform.cell_center(row, col);
                *cell = index.distance(x, y).is_some_and(|d| spec.admits(d));
            }
        });
    mask
}
