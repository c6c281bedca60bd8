//! Finding distribution statistics
//!
//! Percentages are per image: an image listing two findings counts once
//! towards each of them.

use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::population::Population;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingShare {
    pub code: String,
    pub images: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationStats {
    pub total_images: usize,
    pub total_subjects: usize,
    /// Ordered by image count descending, then code
    pub findings: Vec<FindingShare>,
}

impl PopulationStats {
    pub fn from_population(population: &Population) -> Self {
        let total_images = population.records().len();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in population.records() {
            for code in record.findings() {
                *counts.entry(code).or_insert(0) += 1;
            }
        }

        let mut findings: Vec<FindingShare> = counts
            .into_iter()
            .map(|(code, images)| FindingShare {
                code: code.to_string(),
                images,
                percent: percent(images, total_images),
            })
            .collect();
        findings.sort_by(|a, b| {
            b.images
                .cmp(&a.images)
                .then_with(|| a.code.cmp(&b.code))
        });

        Self {
            total_images,
            total_subjects: population.subject_count(),
            findings,
        }
    }

    /// Share of images listing `code`, 0 when absent
    pub fn percent(&self, code: &str) -> f64 {
        self.findings
            .iter()
            .find(|f| f.code == code)
            .map(|f| f.percent)
            .unwrap_or(0.0)
    }

    pub fn log(&self, title: &str) {
        info!(
            images = self.total_images,
            subjects = self.total_subjects,
            findings = self.findings.len(),
            "{}",
            title
        );
        for finding in &self.findings {
            info!(
                "  {:20} {:6} ({:5.2}%)",
                finding.code, finding.images, finding.percent
            );
        }
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// One finding's share in the full population against the selected subset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRow {
    pub code: String,
    pub original_percent: f64,
    pub subset_percent: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionReport {
    pub subset_images: usize,
    pub subset_subjects: usize,
    /// In the original population's order
    pub rows: Vec<DistributionRow>,
}

impl DistributionReport {
    pub fn compare(original: &PopulationStats, subset: &PopulationStats) -> Self {
        let rows = original
            .findings
            .iter()
            .map(|finding| {
                let subset_percent = subset.percent(&finding.code);
                DistributionRow {
                    code: finding.code.clone(),
                    original_percent: finding.percent,
                    subset_percent,
                    delta: subset_percent - finding.percent,
                }
            })
            .collect();
        Self {
            subset_images: subset.total_images,
            subset_subjects: subset.total_subjects,
            rows,
        }
    }

    /// Largest absolute percentage-point difference
    pub fn max_abs_delta(&self) -> f64 {
        self.rows.iter().map(|r| r.delta.abs()).fold(0.0, f64::max)
    }

    pub fn log(&self) {
        info!(
            images = self.subset_images,
            subjects = self.subset_subjects,
            max_delta = self.max_abs_delta(),
            "Subset distribution"
        );
        info!(
            "  {:20} {:>10} {:>10} {:>8}",
            "Finding", "Original", "Subset", "Diff"
        );
        for row in &self.rows {
            info!(
                "  {:20} {:9.2}% {:9.2}% {:+7.2}%",
                row.code, row.original_percent, row.subset_percent, row.delta
            );
        }
    }
}
