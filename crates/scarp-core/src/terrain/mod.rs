//! Reference terrain derivative provider.

pub(crate) mod flow;
pub(crate) mod horn;

use rayon::prelude::*;

use crate::error::{Result, ScarpError};
use crate::grid::Grid;
use crate::provider::{SurfaceDerivatives, TerrainDerivativeProvider};

use flow::FlowField;
use horn::{local_surface, window};

/// Horn gradient and Zevenbergen–Thorne curvature over a window whose stride
/// is the length scale in cells; D8 routing for contributing areas.
///
/// Cells whose window leaves the grid or touches a missing cell are NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct HornTerrain;

impl HornTerrain {
    /// Window half-width in cells for `length_scale` map units, at least 1.
    pub fn stride(elevation: &Grid, length_scale: f64) -> usize {
        let cells = (length_scale / elevation.transform.cell_size()).round();
        if cells.is_finite() && cells >= 1.0 {
            cells as usize
        } else {
            1
        }
    }
}

impl TerrainDerivativeProvider for HornTerrain {
    fn derivatives(&self, elevation: &Grid, length_scale: f64) -> Result<SurfaceDerivatives> {
        if !(length_scale.is_finite() && length_scale > 0.0) {
            return Err(ScarpError::InvalidConfig {
                key: "length_scale",
                reason: format!("must be positive, got {length_scale}"),
            });
        }
        let stride = Self::stride(elevation, length_scale);
        let hx = stride as f64 * elevation.transform.cell_width.abs();
        let hy = stride as f64 * elevation.transform.cell_height.abs();
        let w = elevation.width;

        let cells: Vec<[f32; 4]> = (0..elevation.len())
            .into_par_iter()
            .map(|i| match window(elevation, i / w, i % w, stride) {
                Some(z) => {
                    let d = local_surface(&z, hx, hy);
                    [
                        d.gradient() as f32,
                        d.tangential_curvature() as f32,
                        d.profile_curvature() as f32,
                        d.mean_curvature() as f32,
                    ]
                }
                None => [f32::NAN; 4],
            })
            .collect();

        let layer = |k: usize| {
            let mut g = elevation.filled_like(f32::NAN);
            for (dst, src) in g.data.iter_mut().zip(&cells) {
                *dst = src[k];
            }
            g
        };

        let area = elevation.transform.cell_area();
        let mut total = elevation.filled_like(f32::NAN);
        let acc = FlowField::d8(elevation).accumulation();
        for (i, (dst, a)) in total.data.iter_mut().zip(acc).enumerate() {
            if elevation.value_at(i).is_some() {
                *dst = (a * area) as f32;
            }
        }

        Ok(SurfaceDerivatives {
            gradient: layer(0),
            tangential_curvature: layer(1),
            profile_curvature: layer(2),
            mean_curvature: layer(3),
            total_accumulation: total,
        })
    }

    /// Area of upslope cells whose flow path to each cell is no longer than
    /// `conductivity · duration · 3600` map units.
    fn partial_contributing_area(
        &self,
        elevation: &Grid,
        duration_hours: f64,
        conductivity: f64,
    ) -> Result<Grid> {
        if !(duration_hours.is_finite() && duration_hours > 0.0) {
            return Err(ScarpError::InvalidConfig {
                key: "durations",
                reason: format!("must be positive, got {duration_hours}"),
            });
        }
        if !(conductivity.is_finite() && conductivity > 0.0) {
            return Err(ScarpError::InvalidConfig {
                key: "conductivity",
                reason: format!("must be positive, got {conductivity}"),
            });
        }
        let travel = conductivity * duration_hours * 3600.0;
        let area = elevation.transform.cell_area();
        let pca = FlowField::d8(elevation).partial_accumulation(travel);

        let mut out = elevation.filled_like(f32::NAN);
        for (i, (dst, a)) in out.data.iter_mut().zip(pca).enumerate() {
            if elevation.value_at(i).is_some() {
                *dst = (a * area) as f32;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Crs, GeoTransform};
    use approx::assert_relative_eq;

    /// z = 0.1·x + 0.2·y on 10 m cells.
    fn tilted(w: usize, h: usize) -> Grid {
        let t = GeoTransform::new(0.0, h as f64 * 10.0, 10.0, -10.0);
        let mut g = Grid::new(w, h, t, Crs::epsg(26910), 0.0);
        for r in 0..h {
            for c in 0..w {
                let (x, y) = g.cell_center(r, c);
                g.set(r, c, (0.1 * x + 0.2 * y) as f32);
            }
        }
        g
    }

    #[test]
    fn stride_follows_length_scale() {
        let g = tilted(4, 4);
        assert_eq!(HornTerrain::stride(&g, 10.0), 1);
        assert_eq!(HornTerrain::stride(&g, 15.0), 2);
        assert_eq!(HornTerrain::stride(&g, 30.0), 3);
        assert_eq!(HornTerrain::stride(&g, 1.0), 1);
    }

    #[test]
    fn plane_gradient_and_edges() {
        let g = tilted(9, 9);
        let d = HornTerrain.derivatives(&g, 20.0).unwrap();
        // Stride 2: two-cell margin is missing.
        assert!(d.gradient.get(1, 4).is_nan());
        assert!(d.gradient.get(4, 8).is_nan());
        assert_relative_eq!(d.gradient.get(4, 4) as f64, 0.05f64.sqrt(), epsilon = 1e-4);
        assert_relative_eq!(d.profile_curvature.get(4, 4) as f64, 0.0, epsilon = 1e-4);
        assert_relative_eq!(d.mean_curvature.get(4, 4) as f64, 0.0, epsilon = 1e-4);
        assert!(d.gradient.same_geometry(&g));
    }

    #[test]
    fn total_accumulation_is_area() {
        let g = tilted(6, 6);
        let d = HornTerrain.derivatives(&g, 10.0).unwrap();
        assert!(d.total_accumulation.data.iter().all(|&a| a >= 100.0));
        let max = d.total_accumulation.data.iter().cloned().fold(0.0f32, f32::max);
        assert!(max > 100.0);
    }

    #[test]
    fn partial_area_grows_with_duration() {
        let g = tilted(8, 8);
        let short = HornTerrain.partial_contributing_area(&g, 1.0, 25.0 / 3600.0).unwrap();
        let long = HornTerrain.partial_contributing_area(&g, 48.0, 25.0 / 3600.0).unwrap();
        for (s, l) in short.data.iter().zip(&long.data) {
            assert!(s <= l);
            assert!(*s >= 100.0);
        }
        assert!(long.data.iter().zip(&short.data).any(|(l, s)| l > s));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let g = tilted(4, 4);
        assert!(HornTerrain.derivatives(&g, 0.0).is_err());
        assert!(HornTerrain.partial_contributing_area(&g, 0.0, 1e-3).is_err());
        assert!(HornTerrain.partial_contributing_area(&g, 6.0, -1.0).is_err());
    }
}
