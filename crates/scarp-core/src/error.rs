//! Error type shared by every fallible operation in the core crate.

use std::path::PathBuf;

/// Error type for the sampling pipeline and its file formats.
#[derive(Debug, thiserror::Error)]
pub enum ScarpError {
    /// A configuration value failed validation.
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    /// Domain expansion factor below 1.
    #[error("expansion factor must be >= 1, got {factor}")]
    InvalidExpansion { factor: f64 },

    /// No positive point had a complete set of boundary covariates.
    #[error("no positive point with complete boundary covariates; domain range is undefined")]
    EmptyDomain,

    /// Two grids that must be co-registered are not.
    #[error("grid '{name}' is not co-registered with the stack ({reason})")]
    NotCoRegistered { name: String, reason: String },

    /// A covariate required by an operation is absent from the stack.
    #[error("covariate '{0}' is missing from the stack")]
    MissingCovariate(String),

    /// Points and grid use different coordinate systems.
    #[error("CRS mismatch: points are in {points}, grid is in {grid}")]
    CrsMismatch { points: String, grid: String },

    /// Points could not be transformed between two coordinate systems.
    #[error("cannot reproject from {from} to {to}: {reason}")]
    Reprojection { from: String, to: String, reason: String },

    /// A shared layer uses a different coordinate system than the basin grid.
    #[error("CRS mismatch: {layer} layer is in {layer_crs}, grid is in {grid}")]
    LayerCrsMismatch {
        layer: &'static str,
        layer_crs: String,
        grid: String,
    },

    /// Two sample tables with different column layouts were merged.
    #[error("schema mismatch while merging sample tables: {left:?} vs {right:?}")]
    SchemaMismatch { left: Vec<String>, right: Vec<String> },

    /// Grid dimensions are zero or do not match the data length.
    #[error("invalid grid shape {width}x{height} with {len} values")]
    GridShape { width: usize, height: usize, len: usize },

    /// A raster file could not be interpreted.
    #[error("unsupported raster {path}: {reason}")]
    UnsupportedRaster { path: PathBuf, reason: String },

    /// A vector file could not be interpreted.
    #[error("invalid vector layer {path}: {reason}")]
    InvalidVector { path: PathBuf, reason: String },

    /// A manifest or duration list could not be parsed.
    #[error("{path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ScarpError>;
