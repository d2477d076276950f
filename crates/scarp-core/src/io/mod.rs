//! File formats at the edges of a run.

pub mod manifest;
pub mod raster;
pub mod table;
pub mod vector;

pub use manifest::{read_durations, read_manifest, BasinEntry, DEFAULT_DURATIONS};
pub use raster::{read_grid, write_grid_json};
pub use table::{write_dataset, write_json};
pub use vector::{read_lines, read_points, read_polygons, LineLayer, PointFields, PolygonLayer};
