//! GeoJSON point, polygon and line layers.
//!
//! Layers are FeatureCollections. The legacy top-level `crs` member
//! (`{"type": "name", "properties": {"name": "EPSG:26910"}}`) names the
//! layer CRS; without it the CRS is unknown.

use std::fs;
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, JsonValue, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScarpError};
use crate::grid::Crs;
use crate::point::{PointAttributes, SitePoint};

/// Property names holding inventory attributes on point features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PointFields {
    pub year: String,
    pub date_range: String,
}

impl Default for PointFields {
    fn default() -> Self {
        Self { year: "YEAR".into(), date_range: "DATE_RANGE".into() }
    }
}

/// Classified polygons, e.g. geology units.
#[derive(Debug, Clone, Default)]
pub struct PolygonLayer {
    pub crs: Crs,
    pub polygons: Vec<(MultiPolygon<f64>, String)>,
}

/// Line features, e.g. roads.
#[derive(Debug, Clone, Default)]
pub struct LineLayer {
    pub crs: Crs,
    pub lines: Vec<LineString<f64>>,
}

fn invalid(path: &Path, reason: impl Into<String>) -> ScarpError {
    ScarpError::InvalidVector { path: path.to_path_buf(), reason: reason.into() }
}

fn parse_collection(text: &str, path: &Path) -> Result<(Vec<Feature>, Crs)> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => {
            let crs = fc
                .foreign_members
                .as_ref()
                .and_then(|m| m.get("crs"))
                .and_then(crs_from_member)
                .unwrap_or_default();
            Ok((fc.features, crs))
        }
        _ => Err(invalid(path, "expected a FeatureCollection")),
    }
}

/// `EPSG:26910`, `urn:ogc:def:crs:EPSG::26910` and CRS84 names.
fn crs_from_member(member: &JsonValue) -> Option<Crs> {
    let name = member.get("properties")?.get("name")?.as_str()?;
    if name.ends_with("CRS84") {
        return Some(Crs::epsg(4326));
    }
    if !name.to_ascii_uppercase().contains("EPSG") {
        return Some(Crs::new(name));
    }
    name.rsplit(':').next()?.parse::<u32>().ok().map(Crs::epsg)
}

fn coord(position: &[f64]) -> Option<Coord<f64>> {
    match position {
        [x, y, ..] => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

fn line_string(positions: &[Vec<f64>]) -> LineString<f64> {
    LineString::new(positions.iter().filter_map(|p| coord(p)).collect())
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        line_string(exterior),
        interiors.iter().map(|r| line_string(r)).collect(),
    ))
}

fn year_value(v: &JsonValue) -> Option<i32> {
    let year = match v {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    // 0 is the inventory's "unknown year" sentinel.
    i32::try_from(year).ok().filter(|&y| y != 0)
}

fn text_value(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn read_points(path: &Path, fields: &PointFields) -> Result<Vec<SitePoint>> {
    parse_points(&fs::read_to_string(path)?, path, fields)
}

/// Point and MultiPoint features with their inventory attributes.
pub fn parse_points(text: &str, path: &Path, fields: &PointFields) -> Result<Vec<SitePoint>> {
    let (features, crs) = parse_collection(text, path)?;
    let mut points = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let attributes = PointAttributes {
            year: feature.property(&fields.year).and_then(year_value),
            date_range: feature.property(&fields.date_range).and_then(text_value),
        };
        let positions: Vec<&Vec<f64>> = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::Point(p)) => vec![p],
            Some(Value::MultiPoint(ps)) => ps.iter().collect(),
            Some(_) => return Err(invalid(path, format!("feature {i} is not a point"))),
            None => {
                debug!(path = %path.display(), feature = i, "skipping feature without geometry");
                continue;
            }
        };
        for p in positions {
            let c = coord(p).ok_or_else(|| invalid(path, format!("feature {i} has a short position")))?;
            points.push(SitePoint { x: c.x, y: c.y, crs: crs.clone(), attributes: attributes.clone() });
        }
    }
    Ok(points)
}

pub fn read_polygons(path: &Path, class_field: &str) -> Result<PolygonLayer> {
    parse_polygons(&fs::read_to_string(path)?, path, class_field)
}

/// Polygon and MultiPolygon features labeled by `class_field`.
///
/// Features without a class are skipped with a warning.
pub fn parse_polygons(text: &str, path: &Path, class_field: &str) -> Result<PolygonLayer> {
    let (features, crs) = parse_collection(text, path)?;
    let mut polygons = Vec::with_capacity(features.len());
    let mut unlabeled = 0usize;
    for (i, feature) in features.iter().enumerate() {
        let shape = match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::Polygon(rings)) => MultiPolygon::new(polygon(rings).into_iter().collect()),
            Some(Value::MultiPolygon(parts)) => {
                MultiPolygon::new(parts.iter().filter_map(|p| polygon(p)).collect())
            }
            Some(_) => return Err(invalid(path, format!("feature {i} is not a polygon"))),
            None => continue,
        };
        match feature.property(class_field).and_then(text_value) {
            Some(class) => polygons.push((shape, class)),
            None => unlabeled += 1,
        }
    }
    if unlabeled > 0 {
        warn!(path = %path.display(), field = class_field, unlabeled, "polygons without a class were skipped");
    }
    Ok(PolygonLayer { crs, polygons })
}

pub fn read_lines(path: &Path) -> Result<LineLayer> {
    parse_lines(&fs::read_to_string(path)?, path)
}

/// LineString and MultiLineString features.
pub fn parse_lines(text: &str, path: &Path) -> Result<LineLayer> {
    let (features, crs) = parse_collection(text, path)?;
    let mut lines = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        match feature.geometry.as_ref().map(|g| &g.value) {
            Some(Value::LineString(ps)) => lines.push(line_string(ps)),
            Some(Value::MultiLineString(parts)) => lines.extend(parts.iter().map(|p| line_string(p))),
            Some(_) => return Err(invalid(path, format!("feature {i} is not a line"))),
            None => continue,
        }
    }
    Ok(LineLayer { crs, lines })
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::26910" } },
        "features": [
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [500010.0, 4200020.0] },
              "properties": { "YEAR": 1996, "DATE_RANGE": null } },
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [500030.0, 4200040.0] },
              "properties": { "YEAR": 0, "DATE_RANGE": " 2005-2009 " } },
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [500050.0, 4200060.0] },
              "properties": { "YEAR": "2011" } }
        ]
    }"#;

    #[test]
    fn points_carry_crs_and_attributes() {
        let pts = parse_points(POINTS, Path::new("p.geojson"), &PointFields::default()).unwrap();
        assert_eq!(pts.len(), 3);
        assert!(pts.iter().all(|p| p.crs == Crs::epsg(26910)));
        assert_eq!(pts[0].xy(), [500010.0, 4200020.0]);
        assert_eq!(pts[0].attributes.year, Some(1996));
        assert_eq!(pts[0].attributes.date_range, None);
        assert_eq!(pts[1].attributes.year, None);
        assert_eq!(pts[1].attributes.date_range.as_deref(), Some("2005-2009"));
        assert_eq!(pts[2].attributes.year, Some(2011));
    }

    #[test]
    fn custom_field_names() {
        let text = POINTS.replace("\"YEAR\"", "\"yr\"");
        let fields = PointFields { year: "yr".into(), ..PointFields::default() };
        let pts = parse_points(&text, Path::new("p.geojson"), &fields).unwrap();
        assert_eq!(pts[0].attributes.year, Some(1996));
    }

    #[test]
    fn missing_crs_member_is_unknown() {
        let text = r#"{ "type": "FeatureCollection", "features": [] }"#;
        let pts = parse_points(text, Path::new("p.geojson"), &PointFields::default()).unwrap();
        assert!(pts.is_empty());
        let (_, crs) = parse_collection(text, Path::new("p.geojson")).unwrap();
        assert!(crs.is_unknown());
    }

    #[test]
    fn polygons_need_a_class() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "rock_class": "Tss" },
                  "geometry": { "type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]] } },
                { "type": "Feature", "properties": {},
                  "geometry": { "type": "Polygon", "coordinates": [[[20,0],[30,0],[30,10],[20,0]]] } }
            ]
        }"#;
        let layer = parse_polygons(text, Path::new("g.geojson"), "rock_class").unwrap();
        assert_eq!(layer.polygons.len(), 1);
        assert_eq!(layer.polygons[0].1, "Tss");
    }

    #[test]
    fn lines_flatten_multilines() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": null,
                  "geometry": { "type": "MultiLineString", "coordinates": [[[0,0],[1,1]], [[2,2],[3,3]]] } },
                { "type": "Feature", "properties": null,
                  "geometry": { "type": "LineString", "coordinates": [[5,5],[6,6]] } }
            ]
        }"#;
        let layer = parse_lines(text, Path::new("r.geojson")).unwrap();
        assert_eq!(layer.lines.len(), 3);
    }

    #[test]
    fn wrong_geometry_type_is_rejected() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": null,
                  "geometry": { "type": "LineString", "coordinates": [[5,5],[6,6]] } }
            ]
        }"#;
        let err = parse_points(text, Path::new("p.geojson"), &PointFields::default()).unwrap_err();
        assert!(matches!(err, ScarpError::InvalidVector { .. }));
    }
}
