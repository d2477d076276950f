//! Global topographic envelope of the positive points.
//!
//! The range is estimated once over every basin's positives and then frozen:
//! `DomainRangeEstimator::finish` consumes the estimator and returns a
//! `DomainRange` with no mutating methods, which basin pipelines share
//! read-only behind an `Arc`.

use serde::Serialize;

use crate::covariates::BOUNDARY_COVARIATES;
use crate::error::{Result, ScarpError};

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn encloses(&self, other: &Interval) -> bool {
        self.min <= other.min && self.max >= other.max
    }

    /// Widen symmetrically by `(factor - 1) / 2 * width` on each side.
    fn expanded(&self, factor: f64) -> Interval {
        let pad = (factor - 1.0) / 2.0 * self.width();
        Interval { min: self.min - pad, max: self.max + pad }
    }
}

/// Frozen per-covariate `[min, max]` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainRange {
    bounds: Vec<(String, Interval)>,
    expansion_factor: f64,
    n_points: usize,
}

impl DomainRange {
    pub fn get(&self, name: &str) -> Option<Interval> {
        self.bounds.iter().find(|(n, _)| n == name).map(|(_, i)| *i)
    }

    pub fn covariates(&self) -> impl Iterator<Item = (&str, Interval)> {
        self.bounds.iter().map(|(n, i)| (n.as_str(), *i))
    }

    pub fn expansion_factor(&self) -> f64 {
        self.expansion_factor
    }

    /// Number of positive points the range was estimated from.
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// True when every interval of `other` lies inside the matching interval here.
    pub fn encloses(&self, other: &DomainRange) -> bool {
        other
            .bounds
            .iter()
            .all(|(n, inner)| self.get(n).is_some_and(|outer| outer.encloses(inner)))
    }
}

/// Accumulates per-covariate sample minima and maxima.
#[derive(Debug, Clone)]
pub struct DomainRangeEstimator {
    names: Vec<String>,
    mins: Vec<f64>,
    maxs: Vec<f64>,
    n_points: usize,
    n_excluded: usize,
}

impl DomainRangeEstimator {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            mins: vec![f64::INFINITY; names.len()],
            maxs: vec![f64::NEG_INFINITY; names.len()],
            n_points: 0,
            n_excluded: 0,
        }
    }

    /// Estimator over gradient and the three curvatures.
    pub fn boundary() -> Self {
        Self::new(&BOUNDARY_COVARIATES)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Record one point's covariates, ordered as `names()`.
    ///
    /// A point with any missing or non-finite value is excluded rather than
    /// coerced; returns whether the point was used.
    pub fn observe(&mut self, values: &[Option<f64>]) -> bool {
        let complete = values.len() == self.names.len()
            && values.iter().all(|v| v.is_some_and(f64::is_finite));
        if !complete {
            self.n_excluded += 1;
            return false;
        }
        for (i, v) in values.iter().flatten().enumerate() {
            self.mins[i] = self.mins[i].min(*v);
            self.maxs[i] = self.maxs[i].max(*v);
        }
        self.n_points += 1;
        true
    }

    /// Combine two estimators over disjoint point sets.
    pub fn merge(mut self, other: DomainRangeEstimator) -> Self {
        debug_assert_eq!(self.names, other.names);
        for i in 0..self.names.len() {
            self.mins[i] = self.mins[i].min(other.mins[i]);
            self.maxs[i] = self.maxs[i].max(other.maxs[i]);
        }
        self.n_points += other.n_points;
        self.n_excluded += other.n_excluded;
        self
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    pub fn n_excluded(&self) -> usize {
        self.n_excluded
    }

    /// Freeze the observed envelope, widened by `expansion_factor`.
    pub fn finish(self, expansion_factor: f64) -> Result<DomainRange> {
        if !expansion_factor.is_finite() || expansion_factor < 1.0 {
            return Err(ScarpError::InvalidExpansion { factor: expansion_factor });
        }
        if self.n_points == 0 {
            return Err(ScarpError::EmptyDomain);
        }
        let bounds = self
            .names
            .into_iter()
            .zip(self.mins.into_iter().zip(self.maxs))
            .map(|(name, (min, max))| (name, Interval { min, max }.expanded(expansion_factor)))
            .collect();
        Ok(DomainRange { bounds, expansion_factor, n_points: self.n_points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn observed() -> DomainRangeEstimator {
        let mut est = DomainRangeEstimator::boundary();
        est.observe(&[Some(0.2), Some(-0.01), Some(0.02), Some(0.0)]);
        est.observe(&[Some(0.8), Some(0.03), Some(-0.04), Some(0.01)]);
        est.observe(&[Some(0.5), Some(0.0), Some(0.0), Some(-0.02)]);
        est
    }

    #[test]
    fn factor_one_is_sample_min_max() {
        let range = observed().finish(1.0).unwrap();
        let g = range.get("gradient").unwrap();
        assert_relative_eq!(g.min, 0.2);
        assert_relative_eq!(g.max, 0.8);
        assert_eq!(range.n_points(), 3);
    }

    #[test]
    fn factor_widens_symmetrically() {
        let range = observed().finish(1.5).unwrap();
        let g = range.get("gradient").unwrap();
        // width 0.6, pad 0.25 * 0.6 = 0.15 each side.
        assert_relative_eq!(g.min, 0.05, epsilon = 1e-12);
        assert_relative_eq!(g.max, 0.95, epsilon = 1e-12);
    }

    #[test]
    fn widening_is_monotonic_in_factor() {
        let base = observed().finish(1.0).unwrap();
        let mut prev = base.clone();
        for f in [1.0, 1.1, 1.5, 2.0, 3.0, 10.0] {
            let r = observed().finish(f).unwrap();
            assert!(r.encloses(&base), "factor {f} must enclose factor 1");
            assert!(r.encloses(&prev), "factor {f} must enclose smaller factors");
            prev = r;
        }
    }

    #[test]
    fn factor_below_one_is_rejected() {
        let err = observed().finish(0.9).unwrap_err();
        assert!(matches!(err, ScarpError::InvalidExpansion { .. }));
        assert!(observed().finish(f64::NAN).is_err());
    }

    #[test]
    fn points_with_missing_covariates_are_excluded() {
        let mut est = observed();
        assert!(!est.observe(&[Some(5.0), None, Some(0.0), Some(0.0)]));
        assert!(!est.observe(&[Some(f64::NAN), Some(0.0), Some(0.0), Some(0.0)]));
        assert_eq!(est.n_excluded(), 2);
        let range = est.finish(1.0).unwrap();
        assert_relative_eq!(range.get("gradient").unwrap().max, 0.8);
    }

    #[test]
    fn empty_estimator_has_no_range() {
        let est = DomainRangeEstimator::boundary();
        assert!(matches!(est.finish(1.0), Err(ScarpError::EmptyDomain)));
    }

    #[test]
    fn merge_matches_sequential_observation() {
        let mut a = DomainRangeEstimator::boundary();
        a.observe(&[Some(0.2), Some(-0.01), Some(0.02), Some(0.0)]);
        let mut b = DomainRangeEstimator::boundary();
        b.observe(&[Some(0.8), Some(0.03), Some(-0.04), Some(0.01)]);
        b.observe(&[Some(0.5), Some(0.0), Some(0.0), Some(-0.02)]);
        let merged = b.merge(a).finish(1.0).unwrap();
        assert_eq!(merged, observed().finish(1.0).unwrap());
    }
}
