//! Positive (mapped initiation) points and their inventory attributes.

use serde::{Deserialize, Serialize};

use crate::grid::Crs;

/// Inventory attributes carried by an initiation point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointAttributes {
    /// Exact year of occurrence, when known.
    pub year: Option<i32>,
    /// Human-curated occurrence window such as `"2005-2009"`.
    pub date_range: Option<String>,
}

/// A point location tagged with its CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePoint {
    pub x: f64,
    pub y: f64,
    pub crs: Crs,
    #[serde(default)]
    pub attributes: PointAttributes,
}

impl SitePoint {
    pub fn new(x: f64, y: f64, crs: Crs) -> Self {
        Self { x, y, crs, attributes: PointAttributes::default() }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.attributes.year = Some(year);
        self
    }

    pub fn with_date_range(mut self, range: impl Into<String>) -> Self {
        self.attributes.date_range = Some(range.into());
        self
    }

    #[inline]
    pub fn xy(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    pub fn has_finite_coords(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}
