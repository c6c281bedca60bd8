//! cxr-cohort library interface
//!
//! Offline cohort builder: reads a population manifest, keeps the records
//! whose images are available, selects a stratified subject subset and
//! exports it as a seed directory for `cxr-review`.

pub mod export;
pub mod population;
pub mod sampler;
pub mod stats;

use cxr_common::seeds::SeedSummary;
use cxr_common::Result;
use cxr_review::inference::DualModelInference;
use std::path::PathBuf;
use tracing::info;

use crate::export::{ExportOptions, SeedExporter};
use crate::population::{ImageIndex, Population};
use crate::sampler::{CohortSampler, SelectionOutcome};
use crate::stats::{DistributionReport, PopulationStats};

/// Inputs of one cohort build
#[derive(Debug, Clone)]
pub struct CohortConfig {
    pub manifest: PathBuf,
    pub images: PathBuf,
    pub target_count: usize,
    pub seed: u64,
    pub export: ExportOptions,
}

#[derive(Debug, Clone)]
pub struct CohortReport {
    pub original: PopulationStats,
    pub selection: SelectionOutcome,
    pub distribution: DistributionReport,
    pub summary: SeedSummary,
}

/// Load, filter, sample and export
///
/// Predictions are exported only when `inference` is supplied.
pub async fn build_cohort(
    config: &CohortConfig,
    inference: Option<DualModelInference>,
) -> Result<CohortReport> {
    let manifest = Population::load_manifest(&config.manifest)?;
    let index = ImageIndex::scan(&config.images)?;
    let eligible = manifest.restrict_to(&index);

    let original = PopulationStats::from_population(&eligible);
    original.log("Eligible population");

    let sampler = CohortSampler::new(config.target_count, config.seed);
    let selection = sampler.select(&eligible.subject_findings());
    let cohort = eligible.subset(&selection.selected);

    let distribution =
        DistributionReport::compare(&original, &PopulationStats::from_population(&cohort));
    distribution.log();

    let mut exporter = SeedExporter::new(&index, config.export.clone());
    if let Some(inference) = inference {
        exporter = exporter.with_inference(inference);
    } else {
        info!("No scorers supplied; exporting without predictions");
    }
    let summary = exporter.export(&cohort).await?;

    Ok(CohortReport {
        original,
        selection,
        distribution,
        summary,
    })
}
