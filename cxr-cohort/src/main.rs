//! cxr-cohort - representative cohort builder
//!
//! Selects a stratified subject subset from a labeled image manifest and
//! writes a seed directory that `cxr-review --seed-dir` loads.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cxr_cohort::export::ExportOptions;
use cxr_cohort::{build_cohort, CohortConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for cxr-cohort
#[derive(Parser, Debug)]
#[command(name = "cxr-cohort")]
#[command(about = "Build a labeled cohort and export it as seed data")]
#[command(version)]
struct Args {
    /// JSON manifest with one record per source image
    #[arg(long, env = "CXR_COHORT_MANIFEST")]
    manifest: PathBuf,

    /// Root directory searched recursively for image files
    #[arg(long, env = "CXR_COHORT_IMAGES")]
    images: PathBuf,

    /// Seed directory to write
    #[arg(short, long, env = "CXR_COHORT_OUTPUT")]
    output: PathBuf,

    /// Number of subjects to select
    #[arg(long, default_value_t = 500)]
    target_count: usize,

    /// Random seed for selection and review stamping
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fraction of annotated images exported as already reviewed
    #[arg(long, default_value_t = 0.95)]
    reviewed_fraction: f64,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "CXR_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| args.log_level.clone().into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cxr-cohort v{}", env!("CARGO_PKG_VERSION"));

    let mut export = ExportOptions::new(&args.output);
    export.reviewed_fraction = args.reviewed_fraction;
    export.seed = args.seed;

    let config = CohortConfig {
        manifest: args.manifest,
        images: args.images,
        target_count: args.target_count,
        seed: args.seed,
        export,
    };

    // Scorer kernels are linked by the review service, not this tool
    let report = build_cohort(&config, None)
        .await
        .context("Cohort build failed")?;

    if report.selection.shortfall {
        warn!(
            eligible = report.selection.eligible,
            target = report.selection.target,
            "Cohort is smaller than requested"
        );
    }
    info!(
        subjects = report.summary.subjects,
        artifacts = report.summary.artifacts,
        annotations = report.summary.annotations,
        "Seed data written to {}",
        args.output.display()
    );
    Ok(())
}
