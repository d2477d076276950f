//! Run configuration, read from TOML.
//!
//! ```toml
//! manifest = "basins.csv"
//! data_dir = "data"
//! output_dir = "output"
//! inner_buffer = 30.0
//! outer_buffer = 1000.0
//! oversample = 10.0
//!
//! [age]
//! reference_year = 2017
//! policy = "drop-negative"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backdate::Backdater;
use crate::cohort::CohortTable;
use crate::error::{Result, ScarpError};
use crate::io::manifest::{read_durations, DEFAULT_DURATIONS};
use crate::io::vector::PointFields;
use crate::mask::BufferSpec;
use crate::sampling::SeedStrategy;

/// Shared input layers, relative to `data_dir` unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerConfig {
    pub stand_age: PathBuf,
    pub geology: PathBuf,
    pub roads: PathBuf,
    /// Geology attribute holding the rock class.
    pub rock_class_field: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            stand_age: PathBuf::from("stand_age.tif"),
            geology: PathBuf::from("geology.geojson"),
            roads: PathBuf::from("roads.geojson"),
            rock_class_field: "rock_class".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerConfig {
    /// Basin manifest (`elevation,points` rows).
    pub manifest: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Terrain derivative window in map units.
    #[serde(default = "default_length_scale")]
    pub length_scale: f64,
    #[serde(default = "default_inner_buffer")]
    pub inner_buffer: f64,
    #[serde(default = "default_outer_buffer")]
    pub outer_buffer: f64,
    #[serde(default = "default_one")]
    pub expansion_factor: f64,
    /// Negatives requested per retained positive.
    #[serde(default = "default_one")]
    pub oversample: f64,
    /// Storm duration list; the default durations apply when absent.
    #[serde(default)]
    pub durations: Option<PathBuf>,
    /// Lateral hydraulic conductivity (m/s) for partial contributing area.
    #[serde(default = "default_conductivity")]
    pub conductivity: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub seed_strategy: SeedStrategy,
    /// Worker threads; 0 uses one per core.
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub age: Backdater,
    #[serde(default)]
    pub layers: LayerConfig,
    #[serde(default)]
    pub fields: PointFields,
    #[serde(default)]
    pub cohorts: CohortTable,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_length_scale() -> f64 {
    15.0
}
fn default_inner_buffer() -> f64 {
    30.0
}
fn default_outer_buffer() -> f64 {
    1000.0
}
fn default_one() -> f64 {
    1.0
}
fn default_conductivity() -> f64 {
    1e-3
}
fn default_seed() -> u64 {
    42
}

impl SamplerConfig {
    /// Defaults for everything but the manifest.
    pub fn new(manifest: impl Into<PathBuf>) -> Self {
        Self {
            manifest: manifest.into(),
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            length_scale: default_length_scale(),
            inner_buffer: default_inner_buffer(),
            outer_buffer: default_outer_buffer(),
            expansion_factor: default_one(),
            oversample: default_one(),
            durations: None,
            conductivity: default_conductivity(),
            seed: default_seed(),
            seed_strategy: SeedStrategy::default(),
            workers: 0,
            age: Backdater::default(),
            layers: LayerConfig::default(),
            fields: PointFields::default(),
            cohorts: CohortTable::default(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Reject values the pipeline cannot run with. Called before any basin
    /// is touched.
    pub fn validate(&self) -> Result<()> {
        fn positive(key: &'static str, v: f64) -> Result<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ScarpError::InvalidConfig { key, reason: format!("must be positive, got {v}") })
            }
        }

        positive("length_scale", self.length_scale)?;
        self.buffer()?;
        if !(self.expansion_factor.is_finite() && self.expansion_factor >= 1.0) {
            return Err(ScarpError::InvalidExpansion { factor: self.expansion_factor });
        }
        if !(self.oversample.is_finite() && self.oversample >= 0.0) {
            return Err(ScarpError::InvalidConfig {
                key: "oversample",
                reason: format!("must be >= 0, got {}", self.oversample),
            });
        }
        positive("conductivity", self.conductivity)?;
        positive("age.scale", self.age.scale)?;
        if self.layers.rock_class_field.is_empty() {
            return Err(ScarpError::InvalidConfig {
                key: "layers.rock_class_field",
                reason: "must not be empty".into(),
            });
        }
        self.cohorts.validate()
    }

    pub fn buffer(&self) -> Result<BufferSpec> {
        BufferSpec::new(self.inner_buffer, self.outer_buffer)
    }

    /// Storm durations in hours, from the configured list or the defaults.
    pub fn durations(&self) -> Result<Vec<f64>> {
        match &self.durations {
            Some(path) => read_durations(path),
            None => Ok(DEFAULT_DURATIONS.to_vec()),
        }
    }

    fn data_path(&self, p: &Path) -> PathBuf {
        self.data_dir.join(p)
    }

    pub fn stand_age_path(&self) -> PathBuf {
        self.data_path(&self.layers.stand_age)
    }

    pub fn geology_path(&self) -> PathBuf {
        self.data_path(&self.layers.geology)
    }

    pub fn roads_path(&self) -> PathBuf {
        self.data_path(&self.layers.roads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backdate::AgePolicy;

    #[test]
    fn minimal_config_takes_defaults() {
        let cfg = SamplerConfig::from_toml_str(r#"manifest = "basins.csv""#).unwrap();
        assert_eq!(cfg, SamplerConfig::new("basins.csv"));
        assert_eq!(cfg.inner_buffer, 30.0);
        assert_eq!(cfg.outer_buffer, 1000.0);
        assert_eq!(cfg.seed_strategy, SeedStrategy::PerBasin);
        assert_eq!(cfg.durations().unwrap(), vec![6.0, 12.0, 24.0, 48.0]);
        cfg.validate().unwrap();
    }

    #[test]
    fn nested_tables_are_partial() {
        let cfg = SamplerConfig::from_toml_str(
            r#"
            manifest = "m.csv"
            seed_strategy = "shared"
            [age]
            policy = "clamp-to-zero"
            [layers]
            roads = "osm_roads.geojson"
            [fields]
            year = "yr"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.seed_strategy, SeedStrategy::Shared);
        assert_eq!(cfg.age.policy, AgePolicy::ClampToZero);
        assert_eq!(cfg.age.reference_year, 2017);
        assert_eq!(cfg.roads_path(), PathBuf::from("data/osm_roads.geojson"));
        assert_eq!(cfg.geology_path(), PathBuf::from("data/geology.geojson"));
        assert_eq!(cfg.fields.year, "yr");
        assert_eq!(cfg.fields.date_range, "DATE_RANGE");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(SamplerConfig::from_toml_str("manifest = \"m.csv\"\nbuffer = 3\n").is_err());
        assert!(SamplerConfig::from_toml_str("manifest = \"m.csv\"\n[age]\nyear = 3\n").is_err());
    }

    #[test]
    fn manifest_is_required() {
        assert!(SamplerConfig::from_toml_str("seed = 1\n").is_err());
    }

    #[test]
    fn invalid_values_fail_validation() {
        let base = SamplerConfig::new("m.csv");

        let cfg = SamplerConfig { outer_buffer: 30.0, ..base.clone() };
        assert!(matches!(cfg.validate(), Err(ScarpError::InvalidConfig { key: "outer_buffer", .. })));

        let cfg = SamplerConfig { oversample: -1.0, ..base.clone() };
        assert!(matches!(cfg.validate(), Err(ScarpError::InvalidConfig { key: "oversample", .. })));

        let cfg = SamplerConfig { expansion_factor: 0.9, ..base.clone() };
        assert!(matches!(cfg.validate(), Err(ScarpError::InvalidExpansion { .. })));

        let cfg = SamplerConfig { length_scale: 0.0, ..base.clone() };
        assert!(matches!(cfg.validate(), Err(ScarpError::InvalidConfig { key: "length_scale", .. })));

        let cfg = SamplerConfig { inner_buffer: -5.0, ..base.clone() };
        assert!(matches!(cfg.validate(), Err(ScarpError::InvalidConfig { key: "inner_buffer", .. })));

        let cfg = SamplerConfig { oversample: 0.0, ..base };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn durations_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durations.txt");
        fs::write(&path, "3\n9\n").unwrap();
        let cfg = SamplerConfig { durations: Some(path), ..SamplerConfig::new("m.csv") };
        assert_eq!(cfg.durations().unwrap(), vec![3.0, 9.0]);
    }
}
