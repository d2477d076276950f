//! Horn (1981) gradient and Zevenbergen–Thorne (1987) second derivatives on a
//! strided 3×3 window.
//!
//! Window layout, `s` cells apart:
//! ```text
//!   z[0] NW   z[1] N   z[2] NE
//!   z[3] W    z[4] *   z[5] E
//!   z[6] SW   z[7] S   z[8] SE
//! ```

use crate::grid::Grid;

/// Partial derivatives of the surface at one cell, with x east and y north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LocalSurface {
    /// dz/dx
    pub p: f64,
    /// dz/dy
    pub q: f64,
    /// d²z/dx²
    pub r: f64,
    /// d²z/dxdy
    pub s: f64,
    /// d²z/dy²
    pub t: f64,
}

/// Slopes below this are treated as flat when a direction is needed.
const FLAT: f64 = 1e-12;

/// Gather the window around `(row, col)` at `stride` cells, or `None` when it
/// leaves the grid or touches a missing cell.
pub(crate) fn window(grid: &Grid, row: usize, col: usize, stride: usize) -> Option<[f64; 9]> {
    if row < stride || col < stride || row + stride >= grid.height || col + stride >= grid.width {
        return None;
    }
    let rows = [row - stride, row, row + stride];
    let cols = [col - stride, col, col + stride];
    let mut z = [0.0; 9];
    for (i, &r) in rows.iter().enumerate() {
        for (j, &c) in cols.iter().enumerate() {
            z[i * 3 + j] = grid.value(r, c)? as f64;
        }
    }
    Some(z)
}

/// Derivatives from a window with spacings `hx` (east) and `hy` (north).
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 hx)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 hy)`
pub(crate) fn local_surface(z: &[f64; 9], hx: f64, hy: f64) -> LocalSurface {
    let p = ((z[2] + 2.0 * z[5] + z[8]) - (z[0] + 2.0 * z[3] + z[6])) / (8.0 * hx);
    let q = ((z[0] + 2.0 * z[1] + z[2]) - (z[6] + 2.0 * z[7] + z[8])) / (8.0 * hy);
    let r = (z[3] - 2.0 * z[4] + z[5]) / (hx * hx);
    let t = (z[1] - 2.0 * z[4] + z[7]) / (hy * hy);
    let s = (z[2] - z[0] - z[8] + z[6]) / (4.0 * hx * hy);
    LocalSurface { p, q, r, s, t }
}

impl LocalSurface {
    pub fn gradient(&self) -> f64 {
        (self.p * self.p + self.q * self.q).sqrt()
    }

    /// Normal curvature along the slope line; convex positive, 0 on flats.
    pub fn profile_curvature(&self) -> f64 {
        let g2 = self.p * self.p + self.q * self.q;
        if g2 < FLAT {
            return 0.0;
        }
        let LocalSurface { p, q, r, s, t } = *self;
        -(p * p * r + 2.0 * p * q * s + q * q * t) / (g2 * (1.0 + g2).powf(1.5))
    }

    /// Normal curvature across the slope line; convex positive, 0 on flats.
    pub fn tangential_curvature(&self) -> f64 {
        let g2 = self.p * self.p + self.q * self.q;
        if g2 < FLAT {
            return 0.0;
        }
        let LocalSurface { p, q, r, s, t } = *self;
        -(q * q * r - 2.0 * p * q * s + p * p * t) / (g2 * (1.0 + g2).sqrt())
    }

    /// Mean of the principal curvatures; convex positive.
    pub fn mean_curvature(&self) -> f64 {
        let LocalSurface { p, q, r, s, t } = *self;
        let g2 = p * p + q * q;
        -((1.0 + q * q) * r - 2.0 * p * q * s + (1.0 + p * p) * t) / (2.0 * (1.0 + g2).powf(1.5))
    }
}
