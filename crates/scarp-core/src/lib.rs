//! Positive/negative sample tables for landslide-initiation modelling.
//!
//! Mapped landslide points are the positives. Negatives are drawn per basin
//! and per temporal cohort from cells that lie inside the global covariate
//! domain of the positives and inside an annulus around them. Both labels
//! carry the same covariate columns, with stand age backdated to the
//! cohort's event year.

pub mod backdate;
pub mod cohort;
pub mod config;
pub mod covariates;
pub mod domain;
pub mod error;
pub mod grid;
pub mod io;
pub mod logging;
pub mod mask;
pub mod overlay;
pub mod pipeline;
pub mod point;
pub mod provider;
pub mod record;
pub mod report;
pub mod reproject;
pub mod sampling;
pub mod terrain;

pub use backdate::{AgePolicy, Backdater};
pub use cohort::{Cohort, CohortId, CohortTable, Predicate};
pub use config::SamplerConfig;
pub use covariates::CovariateStack;
pub use domain::{DomainRange, DomainRangeEstimator, Interval};
pub use error::{Result, ScarpError};
pub use grid::{Crs, GeoTransform, Grid, Mask};
pub use mask::BufferSpec;
pub use overlay::GeoJsonOverlay;
pub use pipeline::{BasinPipeline, RunOutput, RunSettings};
pub use point::{PointAttributes, SitePoint};
pub use provider::{SurfaceDerivatives, TerrainDerivativeProvider, VectorOverlayProvider};
pub use record::{CovariateValue, Dataset, Label, SampleRecord, Schema};
pub use report::{BasinReport, CohortReport, RunReport};
pub use sampling::{SeedStrategy, StratifiedSampler};
pub use terrain::HornTerrain;
