//! Two-phase run over the basin manifest.
//!
//! Phase 1 estimates the global domain range from every basin's positives.
//! Phase 2 starts only once that range is frozen: each basin is then sampled
//! independently and the per-basin tables are merged.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::backdate::Backdater;
use crate::cohort::{Cohort, CohortId, CohortTable};
use crate::config::SamplerConfig;
use crate::covariates::{pca_name, CovariateStack, AGE, BOUNDARY_COVARIATES, DIST_TO_ROAD, ROCK_CLASS};
use crate::domain::{DomainRange, DomainRangeEstimator};
use crate::error::{Result, ScarpError};
use crate::grid::{Crs, Grid};
use crate::io::{read_grid, read_manifest, read_points, BasinEntry, PointFields};
use crate::mask::{buffer_mask, eligibility_mask, BufferSpec};
use crate::point::SitePoint;
use crate::provider::{TerrainDerivativeProvider, VectorOverlayProvider};
use crate::record::{CovariateValue, Dataset, Label, SampleRecord, Schema};
use crate::report::{BasinReport, CohortReport, RunReport};
use crate::sampling::{target_count, StratifiedSampler};

/// Validated, resolved parameters shared by every basin.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub length_scale: f64,
    pub conductivity: f64,
    pub durations: Vec<f64>,
    pub buffer: BufferSpec,
    pub oversample: f64,
    pub expansion_factor: f64,
    pub backdater: Backdater,
    pub cohorts: CohortTable,
    pub sampler: StratifiedSampler,
    pub fields: PointFields,
}

impl RunSettings {
    pub fn from_config(config: &SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            length_scale: config.length_scale,
            conductivity: config.conductivity,
            durations: config.durations()?,
            buffer: config.buffer()?,
            oversample: config.oversample,
            expansion_factor: config.expansion_factor,
            backdater: config.age,
            cohorts: config.cohorts.clone(),
            sampler: StratifiedSampler::new(config.seed, config.seed_strategy),
            fields: config.fields.clone(),
        })
    }

    pub fn schema(&self) -> Schema {
        Schema::for_durations(&self.durations)
    }
}

/// Rows and counts produced by one basin.
#[derive(Debug, Clone)]
pub struct BasinOutcome {
    pub dataset: Dataset,
    pub report: BasinReport,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub range: DomainRange,
    pub dataset: Dataset,
    pub report: RunReport,
}

/// Where each schema column comes from.
enum Source {
    Layer(usize),
    RockClass,
    Age,
}

enum Extraction {
    Complete(Vec<CovariateValue>),
    NoAge,
    Missing,
}

/// Per-basin work, parameterised over the terrain and overlay providers.
pub struct BasinPipeline<'a> {
    settings: &'a RunSettings,
    terrain: &'a dyn TerrainDerivativeProvider,
    overlay: &'a dyn VectorOverlayProvider,
    stand_age: &'a Grid,
}

impl<'a> BasinPipeline<'a> {
    pub fn new(
        settings: &'a RunSettings,
        terrain: &'a dyn TerrainDerivativeProvider,
        overlay: &'a dyn VectorOverlayProvider,
        stand_age: &'a Grid,
    ) -> Self {
        Self { settings, terrain, overlay, stand_age }
    }

    fn load(&self, entry: &BasinEntry) -> Result<(Grid, Vec<SitePoint>)> {
        let elevation = read_grid(&entry.elevation)?;
        let points = read_points(&entry.points, &self.settings.fields)?;
        debug!(basin = %entry.id, width = elevation.width, height = elevation.height, points = points.len(), "basin loaded");
        Ok((elevation, points))
    }

    // ── Phase 1 ──

    /// Boundary covariates at one basin's positives.
    pub fn observe_loaded(&self, elevation: &Grid, points: &[SitePoint]) -> Result<DomainRangeEstimator> {
        let points = self.overlay.reproject(points, &elevation.crs)?;
        let stack = self.terrain.derivatives(elevation, self.settings.length_scale)?.into_stack()?;
        let columns: Vec<usize> = BOUNDARY_COVARIATES
            .iter()
            .map(|name| layer_position(&stack, name))
            .collect::<Result<_>>()?;
        let coords: Vec<[f64; 2]> = points.iter().map(SitePoint::xy).collect();

        let mut estimator = DomainRangeEstimator::boundary();
        for row in self.overlay.sample_stack(&stack, &coords) {
            let values: Vec<Option<f64>> = columns.iter().map(|&i| row[i]).collect();
            estimator.observe(&values);
        }
        Ok(estimator)
    }

    pub fn estimate(&self, entry: &BasinEntry) -> Result<DomainRangeEstimator> {
        let _span = info_span!("estimate", basin = %entry.id).entered();
        let (elevation, points) = self.load(entry)?;
        self.observe_loaded(&elevation, &points)
    }

    /// Merge every basin's observations into the frozen domain range.
    ///
    /// Basins that fail here are reported and left out of phase 2.
    pub fn estimate_domain(&self, basins: &[BasinEntry]) -> Result<(DomainRange, Vec<BasinReport>)> {
        let results: Vec<(&BasinEntry, std::result::Result<DomainRangeEstimator, String>)> = basins
            .par_iter()
            .map(|b| (b, self.estimate(b).map_err(|e| e.to_string())))
            .collect();

        let mut merged = DomainRangeEstimator::boundary();
        let mut failures = Vec::new();
        for (basin, result) in results {
            match result {
                Ok(est) => merged = merged.merge(est),
                Err(reason) => {
                    warn!(basin = %basin.id, %reason, "domain estimation failed");
                    failures.push(BasinReport::failed(&basin.id, reason));
                }
            }
        }
        info!(points = merged.n_points(), excluded = merged.n_excluded(), "domain observations merged");
        let range = merged.finish(self.settings.expansion_factor)?;
        for (name, interval) in range.covariates() {
            debug!(covariate = name, min = interval.min, max = interval.max, "domain bound");
        }
        Ok((range, failures))
    }

    // ── Phase 2 ──

    /// Full covariate stack of one basin, co-registered with its elevation.
    fn covariate_stack(&self, basin: &str, elevation: &Grid) -> Result<(CovariateStack, bool)> {
        let s = self.settings;
        let mut stack = self.terrain.derivatives(elevation, s.length_scale)?.into_stack()?;
        if let Some(reference) = stack.reference() {
            if !reference.same_geometry(elevation) {
                return Err(ScarpError::NotCoRegistered {
                    name: "terrain derivatives".into(),
                    reason: "geometry differs from the elevation grid".into(),
                });
            }
        }

        let roads = self.overlay.distance_to_road(elevation)?;
        let roads_present = roads.valid_count() > 0;
        if !roads_present {
            warn!(basin, "no road distance available; every point of this basin will be dropped");
        }
        stack.insert(DIST_TO_ROAD, roads)?;

        for &hours in &s.durations {
            let pca = self.terrain.partial_contributing_area(elevation, hours, s.conductivity)?;
            stack.insert(pca_name(hours), pca)?;
        }
        Ok((stack, roads_present))
    }

    /// Schema values at `coords`, or why the point is dropped.
    fn extract(
        &self,
        stack: &CovariateStack,
        crs: &Crs,
        coords: &[[f64; 2]],
        event_year: i32,
    ) -> Result<Vec<Extraction>> {
        let schema = self.settings.schema();
        let sources: Vec<Source> = schema
            .columns()
            .iter()
            .map(|c| match c.as_str() {
                ROCK_CLASS => Ok(Source::RockClass),
                AGE => Ok(Source::Age),
                name => layer_position(stack, name).map(Source::Layer),
            })
            .collect::<Result<_>>()?;
        let layers = self.overlay.sample_stack(stack, coords);
        let classes = self.overlay.rock_class(crs, coords)?;

        let rows = coords
            .iter()
            .zip(layers)
            .zip(classes)
            .map(|((&[x, y], layer_values), class)| {
                let raw_age = self.stand_age.sample(x, y);
                let Some(age) = self.settings.backdater.age_at(raw_age, event_year) else {
                    return Extraction::NoAge;
                };
                let values: Option<Vec<CovariateValue>> = sources
                    .iter()
                    .map(|source| match source {
                        Source::Layer(i) => {
                            layer_values[*i].filter(|v| v.is_finite()).map(CovariateValue::Number)
                        }
                        Source::RockClass => class.clone().map(CovariateValue::Class),
                        Source::Age => Some(CovariateValue::Number(age)),
                    })
                    .collect();
                values.map_or(Extraction::Missing, Extraction::Complete)
            })
            .collect();
        Ok(rows)
    }

    /// Push complete rows and count the dropped ones.
    #[allow(clippy::too_many_arguments)]
    fn keep_rows(
        &self,
        dataset: &mut Dataset,
        tally: &mut CohortReport,
        basin: &str,
        cohort: &CohortId,
        label: Label,
        coords: &[[f64; 2]],
        rows: Vec<Extraction>,
    ) -> Result<usize> {
        let mut kept = 0;
        for (&[x, y], row) in coords.iter().zip(rows) {
            match row {
                Extraction::Complete(values) => {
                    dataset.push(SampleRecord {
                        basin: basin.to_string(),
                        cohort: cohort.clone(),
                        x,
                        y,
                        values,
                        label,
                    })?;
                    kept += 1;
                }
                Extraction::NoAge => tally.dropped_age += 1,
                Extraction::Missing => tally.dropped_missing += 1,
            }
        }
        Ok(kept)
    }

    /// Sample one loaded basin against a frozen domain range.
    pub fn run_loaded(
        &self,
        basin: &str,
        elevation: &Grid,
        points: &[SitePoint],
        range: &DomainRange,
    ) -> Result<BasinOutcome> {
        let s = self.settings;
        let points = self.overlay.reproject(points, &elevation.crs)?;
        let age_crs = &self.stand_age.crs;
        if !(age_crs.is_unknown() || elevation.crs.is_unknown() || *age_crs == elevation.crs) {
            return Err(ScarpError::LayerCrsMismatch {
                layer: "stand age",
                layer_crs: age_crs.to_string(),
                grid: elevation.crs.to_string(),
            });
        }

        let (stack, roads_present) = self.covariate_stack(basin, elevation)?;
        let mask = eligibility_mask(&stack, range)?.and(&buffer_mask(&points, elevation, &s.buffer))?;

        let mut report = BasinReport {
            basin: basin.to_string(),
            positives: points.len(),
            eligible_cells: mask.count(),
            roads_present,
            ..BasinReport::default()
        };
        let mut by_cohort: BTreeMap<CohortId, (&Cohort, Vec<[f64; 2]>)> = BTreeMap::new();
        for p in &points {
            match s.cohorts.classify(&p.attributes) {
                Some(c) => by_cohort.entry(c.id.clone()).or_insert_with(|| (c, Vec::new())).1.push(p.xy()),
                None => report.unassigned += 1,
            }
        }
        if report.unassigned > 0 {
            debug!(basin, unassigned = report.unassigned, "positives matched no cohort rule");
        }

        let mut dataset = Dataset::new(s.schema());
        for (id, (cohort, positives)) in by_cohort {
            let mut tally = CohortReport { cohort: id.clone(), positives: positives.len(), ..CohortReport::default() };

            let rows = self.extract(&stack, &elevation.crs, &positives, cohort.event_year)?;
            tally.positives_retained =
                self.keep_rows(&mut dataset, &mut tally, basin, &id, Label::Positive, &positives, rows)?;
            if tally.positives_retained == 0 {
                debug!(basin, cohort = %id, "no retained positives; no negatives drawn");
                report.cohorts.push(tally);
                continue;
            }

            let n = target_count(tally.positives_retained, s.oversample);
            let draw = s.sampler.draw(&mask, n, s.sampler.seed_for(basin, id.as_str()));
            if draw.coords.len() < n {
                debug!(basin, cohort = %id, requested = n, eligible = draw.eligible, "fewer eligible cells than requested");
            }
            let negatives: Vec<[f64; 2]> = draw.coords.iter().map(|&(x, y)| [x, y]).collect();
            tally.negatives_requested = n;
            tally.negatives_drawn = negatives.len();

            let rows = self.extract(&stack, &elevation.crs, &negatives, cohort.event_year)?;
            tally.negatives_retained =
                self.keep_rows(&mut dataset, &mut tally, basin, &id, Label::Negative, &negatives, rows)?;
            report.cohorts.push(tally);
        }
        Ok(BasinOutcome { dataset, report })
    }

    pub fn run(&self, entry: &BasinEntry, range: &DomainRange) -> Result<BasinOutcome> {
        let _span = info_span!("sample", basin = %entry.id).entered();
        let (elevation, points) = self.load(entry)?;
        self.run_loaded(&entry.id, &elevation, &points, range)
    }

    /// Sample every basin in parallel and merge the tables.
    ///
    /// A failing basin contributes no rows and a failed report.
    pub fn sample_basins(&self, basins: &[&BasinEntry], range: &DomainRange) -> Result<(Dataset, Vec<BasinReport>)> {
        let outcomes: Vec<(&str, std::result::Result<BasinOutcome, String>)> = basins
            .par_iter()
            .map(|b| (b.id.as_str(), self.run(b, range).map_err(|e| e.to_string())))
            .collect();

        let mut dataset = Dataset::new(self.settings.schema());
        let mut reports = Vec::with_capacity(outcomes.len());
        for (basin, outcome) in outcomes {
            let report = match outcome {
                Ok(o) => {
                    dataset = dataset.merge(o.dataset)?;
                    o.report
                }
                Err(reason) => BasinReport::failed(basin, reason),
            };
            report.log();
            reports.push(report);
        }
        dataset.sort_rows();
        Ok((dataset, reports))
    }

    /// Both phases over `basins`, phase 2 starting after phase 1 returns.
    pub fn run_all(&self, basins: &[BasinEntry], seed: u64) -> Result<RunOutput> {
        let (range, mut reports) = self.estimate_domain(basins)?;
        let survivors: Vec<&BasinEntry> = basins
            .iter()
            .filter(|b| !reports.iter().any(|r| r.basin == b.id))
            .collect();
        info!(basins = survivors.len(), skipped = reports.len(), "sampling basins");

        let (dataset, sampled) = self.sample_basins(&survivors, &range)?;
        reports.extend(sampled);
        let report = RunReport::new(seed, range.clone(), reports);
        info!(
            positives = report.positives_written,
            negatives = report.negatives_written,
            failed = report.failed_basins,
            "run finished"
        );
        Ok(RunOutput { range, dataset, report })
    }
}

fn layer_position(stack: &CovariateStack, name: &str) -> Result<usize> {
    stack
        .names()
        .position(|n| n == name)
        .ok_or_else(|| ScarpError::MissingCovariate(name.to_string()))
}

/// Load the manifest and shared layers, then run both phases on a pool of
/// `config.workers` threads.
pub fn run(
    config: &SamplerConfig,
    terrain: &dyn TerrainDerivativeProvider,
    overlay: &dyn VectorOverlayProvider,
) -> Result<RunOutput> {
    let settings = RunSettings::from_config(config)?;
    let basins = read_manifest(&config.manifest, &config.data_dir)?;
    info!(basins = basins.len(), manifest = %config.manifest.display(), "manifest read");
    let stand_age = read_grid(&config.stand_age_path())?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| ScarpError::InvalidConfig { key: "workers", reason: e.to_string() })?;
    let pipeline = BasinPipeline::new(&settings, terrain, overlay, &stand_age);
    pool.install(|| pipeline.run_all(&basins, config.seed))
}
