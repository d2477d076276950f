//! Stand-age backdating.
//!
//! The stand-age raster is modeled for a single reference year and stored in
//! decal units (tenths of a year). For an event cohort the age at the time of
//! the event is `raw / scale - (reference_year - event_year)`. A negative
//! result means the stand postdates the event and its age then is unknown;
//! what happens to such points is an explicit [`AgePolicy`].

use serde::{Deserialize, Serialize};

/// Treatment of points whose backdated age is negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgePolicy {
    /// Drop the point from every output. Skews the retained sample toward
    /// older stands.
    #[default]
    DropNegative,
    /// Keep the point with age 0.
    ClampToZero,
    /// Keep the point with its negative age.
    Keep,
}

/// Reference year, unit scale and negative-age policy of a stand-age raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Backdater {
    pub reference_year: i32,
    pub scale: f64,
    pub policy: AgePolicy,
}

impl Default for Backdater {
    fn default() -> Self {
        Self { reference_year: 2017, scale: 10.0, policy: AgePolicy::DropNegative }
    }
}

impl Backdater {
    /// Age in years at `event_year` before the policy is applied.
    pub fn raw_age_at(&self, raw: f64, event_year: i32) -> f64 {
        raw / self.scale - f64::from(self.reference_year - event_year)
    }

    /// Age at `event_year`, or `None` when the point must be dropped.
    ///
    /// A missing or non-finite raster value is always dropped.
    pub fn age_at(&self, raw: Option<f64>, event_year: i32) -> Option<f64> {
        let raw = raw.filter(|v| v.is_finite())?;
        let age = self.raw_age_at(raw, event_year);
        if age >= 0.0 {
            return Some(age);
        }
        match self.policy {
            AgePolicy::DropNegative => None,
            AgePolicy::ClampToZero => Some(0.0),
            AgePolicy::Keep => Some(age),
        }
    }
}
