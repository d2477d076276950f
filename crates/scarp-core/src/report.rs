//! Per-basin and per-run counts, logged and persisted as `report.json`.

use serde::Serialize;
use tracing::{info, warn};

use crate::cohort::CohortId;
use crate::domain::DomainRange;

/// What happened to one cohort's points in one basin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortReport {
    pub cohort: CohortId,
    /// Positives classified into the cohort.
    pub positives: usize,
    /// Positives written after age and covariate filtering.
    pub positives_retained: usize,
    pub negatives_requested: usize,
    pub negatives_drawn: usize,
    pub negatives_retained: usize,
    /// Points of either label dropped for an unknown age at the event.
    pub dropped_age: usize,
    /// Points of either label dropped for a missing covariate.
    pub dropped_missing: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BasinReport {
    pub basin: String,
    pub positives: usize,
    /// Positives no cohort rule matched.
    pub unassigned: usize,
    /// Cells passing both the eligibility and buffer masks.
    pub eligible_cells: usize,
    /// False when no road intersects the basin.
    pub roads_present: bool,
    pub cohorts: Vec<CohortReport>,
    /// Set when the basin was skipped; it then contributes no rows.
    pub failure: Option<String>,
}

impl BasinReport {
    pub fn failed(basin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { basin: basin.into(), failure: Some(reason.into()), ..Self::default() }
    }

    pub fn log(&self) {
        if let Some(reason) = &self.failure {
            warn!(basin = %self.basin, %reason, "basin skipped");
            return;
        }
        for c in &self.cohorts {
            info!(
                basin = %self.basin,
                cohort = %c.cohort,
                positives = c.positives_retained,
                requested = c.negatives_requested,
                retained = c.negatives_retained,
                "cohort sampled"
            );
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub domain_range: DomainRange,
    pub basins: Vec<BasinReport>,
    pub failed_basins: usize,
    pub positives_written: usize,
    pub negatives_written: usize,
}

impl RunReport {
    pub fn new(seed: u64, domain_range: DomainRange, mut basins: Vec<BasinReport>) -> Self {
        basins.sort_by(|a, b| a.basin.cmp(&b.basin));
        let failed_basins = basins.iter().filter(|b| b.failure.is_some()).count();
        let cohorts = || basins.iter().flat_map(|b| b.cohorts.iter());
        let positives_written = cohorts().map(|c| c.positives_retained).sum();
        let negatives_written = cohorts().map(|c| c.negatives_retained).sum();
        Self { seed, domain_range, basins, failed_basins, positives_written, negatives_written }
    }
}
