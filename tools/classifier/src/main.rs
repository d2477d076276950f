/// Cohort classification report: applies the configured cohort rules to one
/// or more point inventories and prints per-cohort and per-rule counts as JSON.
/// Useful for checking a rule table before a full sampling run.
use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use scarp_core::io::{read_points, PointFields};
use scarp_core::{logging, CohortTable, SamplerConfig, SitePoint};

#[derive(Parser, Debug)]
#[command(name = "classifier", about = "Count inventory points per temporal cohort")]
struct Args {
    /// Point inventories (GeoJSON); repeat for several files
    #[arg(short, long, required = true, num_args = 1..)]
    points: Vec<PathBuf>,

    /// TOML run configuration supplying cohort rules and field names
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize, PartialEq)]
struct RuleCount {
    rule: String,
    cohort: String,
    points: usize,
}

#[derive(Debug, Serialize, PartialEq)]
struct Summary {
    points: usize,
    unassigned: usize,
    cohorts: BTreeMap<String, usize>,
    rules: Vec<RuleCount>,
    /// Distinct attribute values no rule matched.
    unmatched_values: Vec<String>,
}

fn summarize(table: &CohortTable, points: &[SitePoint]) -> Summary {
    let mut per_rule = vec![0usize; table.rules.len()];
    let mut cohorts: BTreeMap<String, usize> =
        table.cohorts.iter().map(|c| (c.id.to_string(), 0)).collect();
    let mut unmatched = std::collections::BTreeSet::new();
    let mut unassigned = 0;

    for p in points {
        match table.classify_with_rule(&p.attributes) {
            Some((rule, cohort)) => {
                per_rule[rule] += 1;
                *cohorts.entry(cohort.id.to_string()).or_default() += 1;
            }
            None => {
                unassigned += 1;
                let a = &p.attributes;
                let year = a.year.map_or_else(|| "-".to_string(), |y| y.to_string());
                unmatched.insert(format!("year={year} date_range={}", a.date_range.as_deref().unwrap_or("-")));
            }
        }
    }

    let rules = table
        .rules
        .iter()
        .zip(per_rule)
        .map(|(r, points)| RuleCount { rule: r.when.to_string(), cohort: r.cohort.to_string(), points })
        .collect();
    Summary {
        points: points.len(),
        unassigned,
        cohorts,
        rules,
        unmatched_values: unmatched.into_iter().collect(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let (table, fields) = match &args.config {
        Some(path) => {
            let cfg = SamplerConfig::load(path).with_context(|| format!("reading config {}", path.display()))?;
            (cfg.cohorts, cfg.fields)
        }
        None => (CohortTable::standard(), PointFields::default()),
    };
    table.validate().context("invalid cohort table")?;

    let mut points = Vec::new();
    for path in &args.points {
        let batch = read_points(path, &fields).with_context(|| format!("reading {}", path.display()))?;
        debug!(path = %path.display(), points = batch.len(), "inventory read");
        points.extend(batch);
    }

    let summary = summarize(&table, &points);
    info!(points = summary.points, unassigned = summary.unassigned, "classification done");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scarp_core::Crs;

    fn point(year: Option<i32>, range: Option<&str>) -> SitePoint {
        let mut p = SitePoint::new(0.0, 0.0, Crs::default());
        p.attributes.year = year;
        p.attributes.date_range = range.map(str::to_string);
        p
    }

    #[test]
    fn points_flag_takes_several_files() {
        let args = Args::try_parse_from(["classifier", "--points", "a.geojson", "b.geojson", "-v"]).unwrap();
        assert_eq!(args.points.len(), 2);
        assert_eq!(args.verbose, 1);
        assert!(Args::try_parse_from(["classifier"]).is_err());
    }

    #[test]
    fn counts_per_cohort_and_rule() {
        let table = CohortTable::standard();
        let points = [
            point(Some(2006), None),
            point(Some(2007), None),
            point(None, Some("2009-2011")),
            point(Some(1980), None),
            point(None, None),
        ];
        let s = summarize(&table, &points);
        assert_eq!(s.points, 5);
        assert_eq!(s.unassigned, 2);
        assert_eq!(s.cohorts["2007"], 2);
        assert_eq!(s.cohorts["2011"], 1);
        assert_eq!(s.cohorts["1996"], 0);
        assert_eq!(s.rules.iter().map(|r| r.points).sum::<usize>(), 3);
        assert_eq!(s.unmatched_values, vec!["year=- date_range=-", "year=1980 date_range=-"]);
    }
}
