//! Labeled sample records and the append-only per-cohort tables they form.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cohort::CohortId;
use crate::covariates::{
    pca_name, AGE, DIST_TO_ROAD, GRADIENT, MEANCURV, PROFCURV, ROCK_CLASS, TANCURV, TOTAL_ACCUM,
};
use crate::error::{Result, ScarpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Positive,
    Negative,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Positive => "positive",
            Label::Negative => "negative",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One covariate cell of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CovariateValue {
    Number(f64),
    Class(String),
}

impl CovariateValue {
    pub fn is_present(&self) -> bool {
        match self {
            CovariateValue::Number(v) => v.is_finite(),
            CovariateValue::Class(s) => !s.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CovariateValue::Number(v) => Some(*v),
            CovariateValue::Class(_) => None,
        }
    }
}

impl fmt::Display for CovariateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CovariateValue::Number(v) => write!(f, "{v}"),
            CovariateValue::Class(s) => f.write_str(s),
        }
    }
}

/// Ordered covariate columns shared by every table of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// gradient, tancurv, profcurv, meancurv, rock_class, dist_to_road,
    /// total_accum, one pca column per duration, age.
    pub fn for_durations(durations: &[f64]) -> Self {
        let mut columns: Vec<String> = [
            GRADIENT, TANCURV, PROFCURV, MEANCURV, ROCK_CLASS, DIST_TO_ROAD, TOTAL_ACCUM,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        columns.extend(durations.iter().map(|&d| pca_name(d)));
        columns.push(AGE.to_string());
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    pub basin: String,
    pub cohort: CohortId,
    pub x: f64,
    pub y: f64,
    /// Aligned with the table's [`Schema`].
    pub values: Vec<CovariateValue>,
    pub label: Label,
}

/// Positive and negative tables for every cohort.
///
/// Tables only grow. `merge` is associative and commutative up to row order,
/// and `sort_rows` fixes the order before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: Schema,
    tables: BTreeMap<(CohortId, Label), Vec<SampleRecord>>,
}

impl Dataset {
    pub fn new(schema: Schema) -> Self {
        Self { schema, tables: BTreeMap::new() }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Append a record. Records with a missing covariate are rejected.
    pub fn push(&mut self, record: SampleRecord) -> Result<()> {
        if record.values.len() != self.schema.len() {
            return Err(ScarpError::SchemaMismatch {
                left: self.schema.columns.clone(),
                right: vec![format!("{} values", record.values.len())],
            });
        }
        if let Some(i) = record.values.iter().position(|v| !v.is_present()) {
            return Err(ScarpError::MissingCovariate(self.schema.columns[i].clone()));
        }
        self.tables
            .entry((record.cohort.clone(), record.label))
            .or_default()
            .push(record);
        Ok(())
    }

    /// Append every table of `other`. Both datasets must share a schema.
    pub fn merge(mut self, other: Dataset) -> Result<Dataset> {
        if self.schema != other.schema {
            return Err(ScarpError::SchemaMismatch {
                left: self.schema.columns,
                right: other.schema.columns,
            });
        }
        for (key, mut rows) in other.tables {
            self.tables.entry(key).or_default().append(&mut rows);
        }
        Ok(self)
    }

    pub fn table(&self, cohort: &CohortId, label: Label) -> &[SampleRecord] {
        self.tables
            .get(&(cohort.clone(), label))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-empty tables in (cohort, label) order.
    pub fn tables(&self) -> impl Iterator<Item = (&CohortId, Label, &[SampleRecord])> {
        self.tables
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|((c, l), rows)| (c, *l, rows.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sort every table by (basin, x, y).
    pub fn sort_rows(&mut self) {
        for rows in self.tables.values_mut() {
            rows.sort_by(|a, b| {
                a.basin
                    .cmp(&b.basin)
                    .then(a.x.total_cmp(&b.x))
                    .then(a.y.total_cmp(&b.y))
            });
        }
    }
}
