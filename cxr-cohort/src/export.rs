//! Seed export
//!
//! Writes the selected cohort as a seed directory that `cxr-review` reloads:
//! one JSON collection per table, `summary.json`, and the image files under
//! `images/`.

use chrono::{Datelike, Duration};
use cxr_common::config::{validate_threshold, DEFAULT_MODEL_RUN, DEFAULT_THRESHOLD};
use cxr_common::labels::{LabelCatalog, ANY_FINDING_CODE, NO_FINDING_CODE};
use cxr_common::seeds::{
    write_collection, AnnotationSeed, ArtifactSeed, CaseSeed, ModelRunSeed, PredictionSeed,
    SeedSummary, SubjectSeed, ANNOTATIONS_FILE, ARTIFACTS_FILE, CASES_FILE, IMAGES_DIR,
    MODEL_RUNS_FILE, PREDICTIONS_FILE, SUBJECTS_FILE, SUMMARY_FILE,
};
use cxr_common::{time, Error, Result};
use cxr_review::inference::{DualModelInference, InferenceResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::population::{ImageIndex, ImageRecord, Population};

/// Reviewer email attached to ground-truth annotations
pub const SEED_REVIEWER: &str = "seed@cohort.local";

/// Reason recorded on every exported case
pub const CASE_REASON: &str = "Follow-up series";

pub const GROUND_TRUTH_COMMENT: &str = "Ground truth from source dataset";

/// Id of the single exported model run
const MODEL_RUN_ID: i64 = 1;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Fraction of annotated artifacts stamped as already reviewed
    pub reviewed_fraction: f64,
    pub seed: u64,
    /// Year ages are counted back from
    pub export_year: i32,
    pub threshold: f64,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            reviewed_fraction: 0.95,
            seed: 42,
            export_year: time::now().year(),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reviewed_fraction) {
            return Err(Error::InvalidInput(format!(
                "reviewed_fraction must be in [0, 1], got {}",
                self.reviewed_fraction
            )));
        }
        validate_threshold(self.threshold)
    }
}

/// Collections accumulated before writing
#[derive(Debug, Default)]
struct SeedSet {
    subjects: Vec<SubjectSeed>,
    cases: Vec<CaseSeed>,
    artifacts: Vec<ArtifactSeed>,
    predictions: Vec<PredictionSeed>,
    annotations: Vec<AnnotationSeed>,
    images_copied: usize,
    images_missing: usize,
}

pub struct SeedExporter<'a> {
    images: &'a ImageIndex,
    inference: Option<DualModelInference>,
    options: ExportOptions,
}

impl<'a> SeedExporter<'a> {
    pub fn new(images: &'a ImageIndex, options: ExportOptions) -> Self {
        Self {
            images,
            inference: None,
            options,
        }
    }

    /// Score every exported image with the given scorers
    pub fn with_inference(mut self, inference: DualModelInference) -> Self {
        self.inference = Some(inference);
        self
    }

    /// Export every subject of `cohort`, in ascending subject id order
    pub async fn export(&self, cohort: &Population) -> Result<SeedSummary> {
        self.options.validate()?;

        let output = &self.options.output_dir;
        let images_dir = output.join(IMAGES_DIR);
        std::fs::create_dir_all(&images_dir)?;
        info!("Exporting seed data to {}", output.display());

        let mut rng = ChaCha20Rng::seed_from_u64(self.options.seed);
        let mut seeds = SeedSet::default();

        let mut subject_ids: Vec<i64> = cohort
            .subject_findings()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        subject_ids.sort_unstable();

        for (position, subject_id) in subject_ids.iter().enumerate() {
            let records = cohort.records_for(*subject_id);
            let Some(first) = records.first() else {
                continue;
            };

            seeds.subjects.push(SubjectSeed {
                id: *subject_id,
                external_id: Some(format!("NIH_{}", subject_id)),
                birth_year: first.age.map(|age| self.options.export_year - age),
                sex: first.sex.clone(),
            });
            seeds.cases.push(CaseSeed {
                id: *subject_id,
                subject_id: *subject_id,
                reason: Some(CASE_REASON.to_string()),
                taken_at: None,
            });

            for record in records {
                self.export_image(record, *subject_id, &images_dir, &mut rng, &mut seeds)
                    .await?;
            }

            if (position + 1) % 50 == 0 {
                info!("Processed {}/{} subjects", position + 1, subject_ids.len());
            }
        }

        let model_runs = vec![self.model_run()];
        write_collection(output, SUBJECTS_FILE, &seeds.subjects)?;
        write_collection(output, CASES_FILE, &seeds.cases)?;
        write_collection(output, ARTIFACTS_FILE, &seeds.artifacts)?;
        write_collection(output, MODEL_RUNS_FILE, &model_runs)?;
        write_collection(output, PREDICTIONS_FILE, &seeds.predictions)?;
        write_collection(output, ANNOTATIONS_FILE, &seeds.annotations)?;

        let summary = SeedSummary {
            subjects: seeds.subjects.len(),
            cases: seeds.cases.len(),
            artifacts: seeds.artifacts.len(),
            images_copied: seeds.images_copied,
            images_missing: seeds.images_missing,
            predictions: seeds.predictions.len(),
            annotations: seeds.annotations.len(),
            model_runs: model_runs.into_iter().map(|m| m.name).collect(),
        };
        let summary_json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(output.join(SUMMARY_FILE), summary_json)?;

        if seeds.images_missing > 0 {
            warn!(
                missing = seeds.images_missing,
                "Some cohort images were not found"
            );
        }
        info!(
            subjects = summary.subjects,
            artifacts = summary.artifacts,
            predictions = summary.predictions,
            annotations = summary.annotations,
            "Seed export complete"
        );
        Ok(summary)
    }

    async fn export_image(
        &self,
        record: &ImageRecord,
        case_id: i64,
        images_dir: &Path,
        rng: &mut ChaCha20Rng,
        seeds: &mut SeedSet,
    ) -> Result<()> {
        let Some(source) = self.images.path(&record.image_index) else {
            warn!(image = record.image_index.as_str(), "Missing image");
            seeds.images_missing += 1;
            return Ok(());
        };

        let destination = images_dir.join(&record.image_index);
        std::fs::copy(source, &destination)?;
        seeds.images_copied += 1;

        let artifact_id = seeds.artifacts.len() as i64 + 1;

        if let Some(inference) = &self.inference {
            let bytes = std::fs::read(&destination)?;
            match inference.infer(&bytes, self.options.threshold).await {
                Ok(result) => {
                    let rows = prediction_seeds(artifact_id, &result);
                    seeds.predictions.extend(rows);
                }
                Err(e) => warn!(
                    image = record.image_index.as_str(),
                    error = %e,
                    "Failed to score image; exporting without predictions"
                ),
            }
        }

        let annotations = ground_truth(artifact_id, record);
        let reviewed = rng.gen::<f64>() < self.options.reviewed_fraction;
        let reviewed_at = if reviewed && !annotations.is_empty() {
            let days = rng.gen_range(1..=30);
            let hours = rng.gen_range(0..=23);
            let at = time::now() - Duration::days(days) - Duration::hours(hours);
            Some(time::to_db(&at))
        } else {
            None
        };
        seeds.annotations.extend(annotations);

        debug!(
            artifact_id,
            image = record.image_index.as_str(),
            reviewed = reviewed_at.is_some(),
            "Exported image"
        );
        seeds.artifacts.push(ArtifactSeed {
            id: artifact_id,
            case_id,
            filename: record.image_index.clone(),
            content_type: content_type_for(&record.image_index).to_string(),
            view_position: record.view_position.clone(),
            follow_up: record.follow_up.unwrap_or(0),
            reviewed_at,
        });
        Ok(())
    }

    fn model_run(&self) -> ModelRunSeed {
        let description = match &self.inference {
            Some(inference) => {
                let (multilabel, binary) = inference.scorer_names();
                format!(
                    "Dual-model scoring ({} + {}) with ground-truth labels",
                    multilabel, binary
                )
            }
            None => "Ground-truth labels from source dataset".to_string(),
        };
        ModelRunSeed {
            id: MODEL_RUN_ID,
            name: DEFAULT_MODEL_RUN.to_string(),
            description: Some(description),
            artifact_path: None,
        }
    }
}

/// Same rows the prediction store writes: binary under ANY_FINDING, then each
/// multi-label entry known to the catalog
fn prediction_seeds(artifact_id: i64, result: &InferenceResult) -> Vec<PredictionSeed> {
    let mut seeds = vec![PredictionSeed {
        artifact_id,
        model_run_id: MODEL_RUN_ID,
        label_code: ANY_FINDING_CODE.to_string(),
        probability: result.binary.probability,
        decision: result.binary.decision,
    }];
    for label in &result.labels {
        if LabelCatalog::by_code(&label.code).is_none() {
            warn!(
                artifact_id,
                label = label.code.as_str(),
                "Skipping unknown label"
            );
            continue;
        }
        seeds.push(PredictionSeed {
            artifact_id,
            model_run_id: MODEL_RUN_ID,
            label_code: label.code.clone(),
            probability: label.probability,
            decision: label.decision,
        });
    }
    seeds
}

/// Ground-truth annotations: "No Finding" alone when listed, else each finding
fn ground_truth(artifact_id: i64, record: &ImageRecord) -> Vec<AnnotationSeed> {
    let findings = record.findings();
    let codes: Vec<&str> = if findings.contains(&NO_FINDING_CODE) {
        vec![NO_FINDING_CODE]
    } else {
        findings
    };

    codes
        .into_iter()
        .filter(|code| {
            let known = LabelCatalog::by_code(code).is_some();
            if !known {
                warn!(
                    image = record.image_index.as_str(),
                    label = *code,
                    "Skipping unknown ground-truth label"
                );
            }
            known
        })
        .map(|code| AnnotationSeed {
            artifact_id,
            model_run_id: MODEL_RUN_ID,
            label_code: code.to_string(),
            is_present: true,
            comment: Some(GROUND_TRUTH_COMMENT.to_string()),
            reviewer: SEED_REVIEWER.to_string(),
        })
        .collect()
}

/// Content type from the file extension
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("dcm") => "application/dicom",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(labels: &str) -> ImageRecord {
        ImageRecord {
            image_index: "00000001_000.png".to_string(),
            subject_id: 1,
            finding_labels: Some(labels.to_string()),
            follow_up: Some(0),
            age: Some(58),
            sex: Some("M".to_string()),
            view_position: Some("PA".to_string()),
        }
    }

    #[test]
    fn test_no_finding_annotated_alone() {
        let annotations = ground_truth(3, &record("No Finding|Mass"));
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].label_code, NO_FINDING_CODE);
        assert_eq!(annotations[0].reviewer, SEED_REVIEWER);
    }

    #[test]
    fn test_each_finding_annotated() {
        let annotations = ground_truth(3, &record("Mass|Edema|Bogus"));
        let codes: Vec<_> = annotations.iter().map(|a| a.label_code.as_str()).collect();
        assert_eq!(codes, vec!["Mass", "Edema"]);
        let ground_truth_rows = |a: &AnnotationSeed| a.is_present && a.artifact_id == 3;
        assert!(annotations.iter().all(ground_truth_rows));
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("scan.dcm"), "application/dicom");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_reviewed_fraction_validated() {
        let mut options = ExportOptions::new("/tmp/out");
        options.reviewed_fraction = 1.5;
        assert!(options.validate().is_err());
        options.reviewed_fraction = 0.0;
        assert!(options.validate().is_ok());
    }
}
