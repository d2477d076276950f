//! Reference vector overlay provider backed by GeoJSON layers.

use std::path::Path;

use geo::{Contains, Coord, Intersects, Point, Rect};
use rayon::prelude::*;
use rstar::primitives::Line as Segment;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use tracing::warn;

use crate::error::{Result, ScarpError};
use crate::grid::{Crs, Grid};
use crate::io::vector::{read_lines, read_polygons, LineLayer, PolygonLayer};
#[cfg(feature = "reproject")]
use crate::point::SitePoint;
use crate::provider::VectorOverlayProvider;

/// Bounding box of one geology polygon, pointing back into the layer.
#[derive(Debug, Clone, PartialEq)]
struct IndexedPolygon {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Geology polygons and road lines with R-tree indices.
pub struct GeoJsonOverlay {
    geology: PolygonLayer,
    geology_index: RTree<IndexedPolygon>,
    roads_crs: Crs,
    roads: RTree<Segment<[f64; 2]>>,
}

impl GeoJsonOverlay {
    pub fn new(geology: PolygonLayer, roads: LineLayer) -> Self {
        use geo::BoundingRect;

        let indexed = geology
            .polygons
            .iter()
            .enumerate()
            .filter_map(|(index, (shape, _))| {
                let rect = shape.bounding_rect()?;
                Some(IndexedPolygon {
                    index,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        let segments = roads
            .lines
            .iter()
            .flat_map(|line| line.lines())
            .map(|l| Segment::new([l.start.x, l.start.y], [l.end.x, l.end.y]))
            .collect();
        Self {
            geology,
            geology_index: RTree::bulk_load(indexed),
            roads_crs: roads.crs,
            roads: RTree::bulk_load(segments),
        }
    }

    /// Load the geology and road layers from GeoJSON files.
    pub fn load(geology: &Path, roads: &Path, class_field: &str) -> Result<Self> {
        Ok(Self::new(read_polygons(geology, class_field)?, read_lines(roads)?))
    }

    pub fn road_segments(&self) -> usize {
        self.roads.size()
    }

    fn check_crs(name: &'static str, layer: &Crs, other: &Crs) -> Result<()> {
        if layer.is_unknown() || other.is_unknown() || layer == other {
            Ok(())
        } else {
            Err(ScarpError::LayerCrsMismatch {
                layer: name,
                layer_crs: layer.to_string(),
                grid: other.to_string(),
            })
        }
    }

    fn class_at(&self, x: f64, y: f64) -> Option<String> {
        let point = Point::new(x, y);
        let mut candidates: Vec<usize> = self
            .geology_index
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .map(|p| p.index)
            .collect();
        candidates.sort_unstable();
        let polygons = &self.geology.polygons;
        // Interior first; a point on a shared edge takes the first touching polygon.
        candidates
            .iter()
            .find(|&&i| polygons[i].0.contains(&point))
            .or_else(|| candidates.iter().find(|&&i| polygons[i].0.intersects(&point)))
            .map(|&i| polygons[i].1.clone())
    }

    /// True when any road segment crosses the grid extent.
    fn roads_touch(&self, reference: &Grid) -> bool {
        let (min_x, min_y, max_x, max_y) = reference.extent();
        let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
        self.roads
            .locate_in_envelope_intersecting(&AABB::from_corners([min_x, min_y], [max_x, max_y]))
            .any(|s| {
                let (a, b) = (s.from, s.to);
                geo::Line::new(Coord { x: a[0], y: a[1] }, Coord { x: b[0], y: b[1] }).intersects(&rect)
            })
    }
}

impl VectorOverlayProvider for GeoJsonOverlay {
    fn rock_class(&self, crs: &Crs, coords: &[[f64; 2]]) -> Result<Vec<Option<String>>> {
        Self::check_crs("geology", &self.geology.crs, crs)?;
        Ok(coords.iter().map(|&[x, y]| self.class_at(x, y)).collect())
    }

    fn distance_to_road(&self, reference: &Grid) -> Result<Grid> {
        Self::check_crs("roads", &self.roads_crs, &reference.crs)?;
        let mut out = reference.filled_like(f32::NAN);
        if reference.is_empty() {
            return Ok(out);
        }
        if !self.roads_touch(reference) {
            warn!(crs = %reference.crs, "no road intersects the basin; distance to road is missing everywhere");
            return Ok(out);
        }
        let width = reference.width;
        let transform = reference.transform;
        out.data.par_chunks_mut(width).enumerate().for_each(|(row, cells)| {
            for (col, cell) in cells.iter_mut().enumerate() {
                let (x, y) = transform.cell_center(row, col);
                if let Some(seg) = self.roads.nearest_neighbor(&[x, y]) {
                    *cell = seg.distance_2(&[x, y]).sqrt() as f32;
                }
            }
        });
        Ok(out)
    }

    #[cfg(feature = "reproject")]
    fn reproject(&self, points: &[SitePoint], target: &Crs) -> Result<Vec<SitePoint>> {
        crate::reproject::reproject_points(points, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoTransform;
    use crate::point::SitePoint;
    use geo::{LineString, MultiPolygon, Polygon};

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        let ring = LineString::from(vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
            (x0, y0),
        ]);
        MultiPolygon::new(vec![Polygon::new(ring, vec![])])
    }

    fn overlay(road_x: f64) -> GeoJsonOverlay {
        let geology = PolygonLayer {
            crs: Crs::epsg(26910),
            polygons: vec![(square(0.0, 0.0, 50.0), "Tss".into()), (square(50.0, 0.0, 50.0), "Kgr".into())],
        };
        let roads = LineLayer {
            crs: Crs::epsg(26910),
            lines: vec![LineString::from(vec![(road_x, -100.0), (road_x, 200.0)])],
        };
        GeoJsonOverlay::new(geology, roads)
    }

    fn grid() -> Grid {
        Grid::new(10, 10, GeoTransform::new(0.0, 100.0, 10.0, -10.0), Crs::epsg(26910), 0.0)
    }

    #[test]
    fn rock_class_by_containing_polygon() {
        let o = overlay(0.0);
        let classes = o
            .rock_class(&Crs::epsg(26910), &[[10.0, 10.0], [75.0, 20.0], [50.0, 20.0], [500.0, 500.0]])
            .unwrap();
        assert_eq!(classes[0].as_deref(), Some("Tss"));
        assert_eq!(classes[1].as_deref(), Some("Kgr"));
        // Shared edge resolves to the first polygon.
        assert_eq!(classes[2].as_deref(), Some("Tss"));
        assert_eq!(classes[3], None);
    }

    #[test]
    fn rock_class_rejects_other_crs() {
        let o = overlay(0.0);
        let err = o.rock_class(&Crs::epsg(4326), &[[1.0, 1.0]]).unwrap_err();
        assert!(matches!(err, ScarpError::LayerCrsMismatch { layer: "geology", .. }));
    }

    #[test]
    fn distance_to_vertical_road() {
        let o = overlay(0.0);
        let d = o.distance_to_road(&grid()).unwrap();
        assert_eq!(d.get(0, 0), 5.0);
        assert_eq!(d.get(4, 3), 35.0);
        assert_eq!(d.valid_count(), 100);
    }

    #[test]
    fn zero_width_grid_gives_empty_distance_grid() {
        let o = overlay(0.0);
        let empty = Grid::new(0, 5, GeoTransform::new(0.0, 50.0, 10.0, -10.0), Crs::epsg(26910), 0.0);
        let d = o.distance_to_road(&empty).unwrap();
        assert!(d.is_empty());
        assert_eq!(d.height, 5);
    }

    #[test]
    fn road_outside_basin_gives_missing_grid() {
        let o = overlay(1000.0);
        let d = o.distance_to_road(&grid()).unwrap();
        assert_eq!(d.valid_count(), 0);
        assert_eq!(o.road_segments(), 1);
    }

    #[test]
    fn geographic_points_follow_the_reproject_feature() {
        let o = overlay(0.0);
        let points = [SitePoint::new(-123.0, 45.0, Crs::epsg(4326))];
        let out = o.reproject(&points, &Crs::epsg(32610));
        if cfg!(feature = "reproject") {
            let out = out.unwrap();
            assert!((out[0].x - 500_000.0).abs() < 1.0);
            assert_eq!(out[0].crs, Crs::epsg(32610));
        } else {
            assert!(matches!(out, Err(ScarpError::CrsMismatch { .. })));
        }
    }
}
