/// Landslide sample builder: estimates the global covariate domain from every
/// basin's positives, then draws per-basin, per-cohort negatives and writes
/// one CSV table per cohort and label.
///
/// Outputs under `output_dir`:
///   <cohort>/positive.csv, <cohort>/negative.csv
///   domain_range.json, report.json
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use scarp_core::io::{write_dataset, write_json};
use scarp_core::{logging, pipeline, GeoJsonOverlay, HornTerrain, SamplerConfig};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sampler", about = "Build positive/negative landslide sample tables per basin and cohort")]
struct Args {
    /// TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Basin manifest; overrides the configured one
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Input data directory; overrides the configured one
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output directory (created if absent)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Negatives per retained positive
    #[arg(long)]
    oversample: Option<f64>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ── Configuration ────────────────────────────────────────────────────────────

fn resolve_config(args: &Args) -> Result<SamplerConfig> {
    let mut config = match (&args.config, &args.manifest) {
        (Some(path), _) => SamplerConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        (None, Some(manifest)) => SamplerConfig::new(manifest.clone()),
        (None, None) => bail!("either --config or --manifest is required"),
    };
    if let Some(m) = &args.manifest {
        config.manifest = m.clone();
    }
    if let Some(d) = &args.data_dir {
        config.data_dir = d.clone();
    }
    if let Some(o) = &args.output {
        config.output_dir = o.clone();
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(k) = args.oversample {
        config.oversample = k;
    }
    if let Some(w) = args.workers {
        config.workers = w;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);
    let config = resolve_config(&args)?;

    let overlay = GeoJsonOverlay::load(
        &config.geology_path(),
        &config.roads_path(),
        &config.layers.rock_class_field,
    )
    .context("loading geology and road layers")?;
    info!(road_segments = overlay.road_segments(), "vector layers loaded");

    let output = pipeline::run(&config, &HornTerrain, &overlay).context("sampling run failed")?;

    let out_dir = &config.output_dir;
    let tables = write_dataset(out_dir, &output.dataset)
        .with_context(|| format!("writing tables under {}", out_dir.display()))?;
    write_json(&out_dir.join("domain_range.json"), &output.range)?;
    write_json(&out_dir.join("report.json"), &output.report)?;
    for path in &tables {
        info!(path = %path.display(), "table written");
    }

    eprintln!(
        "[sampler] {} positives, {} negatives in {} tables; {} of {} basins failed",
        output.report.positives_written,
        output.report.negatives_written,
        tables.len(),
        output.report.failed_basins,
        output.report.basins.len(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let argv = std::iter::once("sampler").chain(extra.iter().copied());
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn manifest_alone_is_enough() {
        let cfg = resolve_config(&args(&["--manifest", "basins.csv", "--seed", "7", "-j", "3"])).unwrap();
        assert_eq!(cfg.manifest, PathBuf::from("basins.csv"));
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.workers, 3);
    }

    #[test]
    fn config_or_manifest_is_required() {
        assert!(resolve_config(&args(&[])).is_err());
    }

    #[test]
    fn overrides_are_validated() {
        assert!(resolve_config(&args(&["--manifest", "m.csv", "--oversample=-1"])).is_err());
    }

    #[test]
    fn verbosity_counts_flags() {
        assert_eq!(args(&["-vv"]).verbose, 2);
    }
}
