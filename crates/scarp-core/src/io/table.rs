//! Persisted outputs: per-cohort CSV tables and JSON documents.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::record::{Dataset, SampleRecord};

/// Quote a CSV field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_row<W: Write>(out: &mut W, fields: impl IntoIterator<Item = String>) -> Result<()> {
    let line: Vec<String> = fields.into_iter().map(|f| csv_field(&f)).collect();
    writeln!(out, "{}", line.join(","))?;
    Ok(())
}

/// Write one table with header `basin,x,y,<covariates>,label`.
pub fn write_table<W: Write>(out: &mut W, columns: &[String], rows: &[SampleRecord]) -> Result<()> {
    let header = ["basin", "x", "y"]
        .iter()
        .map(|s| s.to_string())
        .chain(columns.iter().cloned())
        .chain(std::iter::once("label".to_string()));
    write_row(out, header)?;
    for r in rows {
        let fields = [r.basin.clone(), r.x.to_string(), r.y.to_string()]
            .into_iter()
            .chain(r.values.iter().map(|v| v.to_string()))
            .chain(std::iter::once(r.label.to_string()));
        write_row(out, fields)?;
    }
    Ok(())
}

/// Write `dir/<cohort>/<label>.csv` for every non-empty table.
///
/// Rows are written in the dataset's current order; call
/// [`Dataset::sort_rows`] first for a deterministic file.
pub fn write_dataset(dir: &Path, dataset: &Dataset) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (cohort, label, rows) in dataset.tables() {
        let cohort_dir = dir.join(cohort.as_str());
        fs::create_dir_all(&cohort_dir)?;
        let path = cohort_dir.join(format!("{label}.csv"));
        let mut out = BufWriter::new(File::create(&path)?);
        write_table(&mut out, dataset.schema().columns(), rows)?;
        out.flush()?;
        written.push(path);
    }
    Ok(written)
}

/// Pretty-printed JSON document.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::CohortId;
    use crate::record::{CovariateValue, Label, Schema};

    fn record(basin: &str, x: f64, label: Label, class: &str) -> SampleRecord {
        let schema = Schema::for_durations(&[24.0]);
        let values = schema
            .columns()
            .iter()
            .map(|c| {
                if c == "rock_class" {
                    CovariateValue::Class(class.into())
                } else {
                    CovariateValue::Number(1.5)
                }
            })
            .collect();
        SampleRecord { basin: basin.into(), cohort: CohortId::new("2007"), x, y: 2.0, values, label }
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        assert_eq!(csv_field("Tss"), "Tss");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn table_has_header_and_rows_in_column_order() {
        let schema = Schema::for_durations(&[24.0]);
        let mut buf = Vec::new();
        write_table(&mut buf, schema.columns(), &[record("b1", 10.0, Label::Positive, "Tss")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "basin,x,y,gradient,tancurv,profcurv,meancurv,rock_class,dist_to_road,total_accum,pca_24,age,label"
        );
        assert_eq!(lines[1], "b1,10,2,1.5,1.5,1.5,1.5,Tss,1.5,1.5,1.5,1.5,positive");
    }

    #[test]
    fn dataset_writes_one_file_per_cohort_and_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut ds = Dataset::new(Schema::for_durations(&[24.0]));
        ds.push(record("b1", 1.0, Label::Positive, "Tss")).unwrap();
        ds.push(record("b1", 2.0, Label::Negative, "Tss")).unwrap();
        ds.push(record("b2", 3.0, Label::Negative, "Kgr")).unwrap();
        let paths = write_dataset(dir.path(), &ds).unwrap();
        assert_eq!(paths.len(), 2);
        let neg = fs::read_to_string(dir.path().join("2007").join("negative.csv")).unwrap();
        assert_eq!(neg.lines().count(), 3);
        assert!(dir.path().join("2007").join("positive.csv").exists());
    }
}
