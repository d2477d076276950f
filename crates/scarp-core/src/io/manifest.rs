//! Plain-text run inputs: the basin manifest and the storm duration list.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::covariates::pca_name;
use crate::error::{Result, ScarpError};

/// Storm durations (hours) used when no duration list is configured.
pub const DEFAULT_DURATIONS: [f64; 4] = [6.0, 12.0, 24.0, 48.0];

/// One row of the basin manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BasinEntry {
    /// Elevation file stem.
    pub id: String,
    pub elevation: PathBuf,
    pub points: PathBuf,
}

pub fn read_manifest(path: &Path, base: &Path) -> Result<Vec<BasinEntry>> {
    parse_manifest(&fs::read_to_string(path)?, path, base)
}

/// Split one comma-separated row. Fields may be double-quoted to hold
/// commas; `""` inside quotes is a literal quote.
fn split_row(row: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = row.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => quoted = false,
            ('"', false) if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            (',', false) => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    if quoted {
        return Err("unterminated quoted field".into());
    }
    fields.push(field.trim().to_string());
    Ok(fields)
}

/// Parse `elevation,points` rows after a header row.
///
/// Fields may be double-quoted. Relative paths are joined onto `base`.
/// Basin ids come from the elevation file stem and must be unique.
pub fn parse_manifest(text: &str, path: &Path, base: &Path) -> Result<Vec<BasinEntry>> {
    let err = |line: usize, reason: String| ScarpError::Parse { path: path.to_path_buf(), line, reason };
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for (i, raw) in text.lines().enumerate().skip(1) {
        let line = i + 1;
        let row = raw.trim();
        if row.is_empty() {
            continue;
        }
        let cols = split_row(row).map_err(|reason| err(line, reason))?;
        let [elevation, points] = cols.as_slice() else {
            return Err(err(line, format!("expected 2 columns, found {}", cols.len())));
        };
        let elevation = base.join(elevation);
        let points = base.join(points);
        let id = elevation
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| err(line, "elevation path has no file name".into()))?
            .to_string();
        if !seen.insert(id.clone()) {
            return Err(err(line, format!("duplicate basin id '{id}'")));
        }
        entries.push(BasinEntry { id, elevation, points });
    }
    Ok(entries)
}

pub fn read_durations(path: &Path) -> Result<Vec<f64>> {
    parse_durations(&fs::read_to_string(path)?, path)
}

/// Positive, distinct durations in hours, separated by commas or whitespace.
/// `#` starts a comment.
pub fn parse_durations(text: &str, path: &Path) -> Result<Vec<f64>> {
    let mut durations = Vec::new();
    let mut columns = HashSet::new();
    for (i, raw) in text.lines().enumerate() {
        let body = raw.split('#').next().unwrap_or_default();
        for token in body.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
            let d: f64 = token.parse().map_err(|_| ScarpError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                reason: format!("'{token}' is not a number"),
            })?;
            if !(d.is_finite() && d > 0.0) {
                return Err(ScarpError::Parse {
                    path: path.to_path_buf(),
                    line: i + 1,
                    reason: format!("duration must be positive, got {d}"),
                });
            }
            if !columns.insert(pca_name(d)) {
                return Err(ScarpError::Parse {
                    path: path.to_path_buf(),
                    line: i + 1,
                    reason: format!("duration {d} is listed twice"),
                });
            }
            durations.push(d);
        }
    }
    if durations.is_empty() {
        return Err(ScarpError::Parse {
            path: path.to_path_buf(),
            line: 0,
            reason: "no durations listed".into(),
        });
    }
    Ok(durations)
}
