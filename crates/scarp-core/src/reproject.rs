//! Point reprojection between coordinate systems.

use crate::error::Result;
use crate::grid::Crs;
use crate::point::SitePoint;

/// True when points in `from` can be used in `to` without transforming them.
/// An unknown CRS on either side is taken on trust.
pub fn passes_through(from: &Crs, to: &Crs) -> bool {
    from == to || from.is_unknown() || to.is_unknown()
}

/// Transform `points` into `target` with PROJ, building one transformation
/// per distinct source CRS.
#[cfg(feature = "reproject")]
pub fn reproject_points(points: &[SitePoint], target: &Crs) -> Result<Vec<SitePoint>> {
    use std::collections::hash_map::{Entry, HashMap};

    use proj::Proj;

    use crate::error::ScarpError;

    let failed = |from: &Crs, reason: String| ScarpError::Reprojection {
        from: from.to_string(),
        to: target.to_string(),
        reason,
    };

    let mut transforms: HashMap<&Crs, Proj> = HashMap::new();
    let mut out = Vec::with_capacity(points.len());
    for p in points {
        if passes_through(&p.crs, target) {
            out.push(SitePoint { crs: target.clone(), ..p.clone() });
            continue;
        }
        let proj = match transforms.entry(&p.crs) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let proj = Proj::new_known_crs(p.crs.as_str(), target.as_str(), None)
                    .map_err(|err| failed(&p.crs, err.to_string()))?;
                e.insert(proj)
            }
        };
        let (x, y) = proj.convert((p.x, p.y)).map_err(|e| failed(&p.crs, e.to_string()))?;
        out.push(SitePoint { x, y, crs: target.clone(), attributes: p.attributes.clone() });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_or_equal_crs_passes_through() {
        let utm = Crs::epsg(26910);
        assert!(passes_through(&utm, &Crs::epsg(26910)));
        assert!(passes_through(&Crs::default(), &utm));
        assert!(passes_through(&utm, &Crs::default()));
        assert!(!passes_through(&Crs::epsg(4326), &utm));
    }

    #[cfg(feature = "reproject")]
    #[test]
    fn geographic_points_land_on_the_utm_grid() {
        let target = Crs::epsg(32610);
        let points = [
            SitePoint::new(-123.0, 45.0, Crs::epsg(4326)).with_year(2007),
            SitePoint::new(500_000.0, 4_000_000.0, target.clone()),
        ];
        let out = reproject_points(&points, &target).unwrap();
        // -123 is the zone 10 central meridian.
        assert!((out[0].x - 500_000.0).abs() < 1.0, "easting {}", out[0].x);
        assert!((4_970_000.0..4_990_000.0).contains(&out[0].y), "northing {}", out[0].y);
        assert_eq!(out[0].crs, target);
        assert_eq!(out[0].attributes.year, Some(2007));
        assert_eq!((out[1].x, out[1].y), (500_000.0, 4_000_000.0));
    }

    #[cfg(feature = "reproject")]
    #[test]
    fn unknown_code_is_a_reprojection_error() {
        let points = [SitePoint::new(0.0, 0.0, Crs::new("EPSG:999999"))];
        let err = reproject_points(&points, &Crs::epsg(26910)).unwrap_err();
        assert!(matches!(err, crate::ScarpError::Reprojection { .. }));
    }
}
