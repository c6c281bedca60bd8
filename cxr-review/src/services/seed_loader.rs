//! Seed reload
//!
//! Loads a seed directory written by the cohort builder. Records whose key
//! already exists are skipped, so reloading the same directory is a no-op.
//! Records referring to missing parents, unknown labels or missing image
//! files are skipped with a warning. Everything commits in one unit of work.

use cxr_common::db::{begin_unit_of_work, find_or_create};
use cxr_common::seeds::{
    read_collection, AnnotationSeed, ArtifactSeed, CaseSeed, ModelRunSeed, PredictionSeed,
    SubjectSeed, ANNOTATIONS_FILE, ARTIFACTS_FILE, CASES_FILE, IMAGES_DIR, MODEL_RUNS_FILE,
    PREDICTIONS_FILE, SUBJECTS_FILE,
};
use cxr_common::{time, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::db::annotations::annotation_exists;
use crate::db::artifacts::{artifact_exists, insert_artifact};
use crate::db::cases::{case_exists, insert_case};
use crate::db::labels::find_label_by_code;
use crate::db::model_runs::{insert_model_run, model_run_exists};
use crate::db::predictions::prediction_exists;
use crate::db::subjects::{insert_subject, subject_exists};
use crate::db::{
    AnnotationUpsert, ModelRun, NewArtifact, PredictionUpsert, ReviewerByEmail, Subject,
};

/// Loaded vs skipped counts for one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub loaded: usize,
    pub skipped: usize,
}

impl CollectionReport {
    fn record(&mut self, loaded: bool) {
        if loaded {
            self.loaded += 1;
        } else {
            self.skipped += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub model_runs: CollectionReport,
    pub subjects: CollectionReport,
    pub cases: CollectionReport,
    pub artifacts: CollectionReport,
    pub predictions: CollectionReport,
    pub annotations: CollectionReport,
}

/// Display name given to reviewers first seen in a seed file
const SEED_REVIEWER_NAME: &str = "Seed Reviewer";

pub async fn load_seed_dir(db: &SqlitePool, dir: &Path) -> Result<SeedReport> {
    let model_runs: Vec<ModelRunSeed> = read_collection(dir, MODEL_RUNS_FILE)?;
    let subjects: Vec<SubjectSeed> = read_collection(dir, SUBJECTS_FILE)?;
    let cases: Vec<CaseSeed> = read_collection(dir, CASES_FILE)?;
    let artifacts: Vec<ArtifactSeed> = read_collection(dir, ARTIFACTS_FILE)?;
    let predictions: Vec<PredictionSeed> = read_collection(dir, PREDICTIONS_FILE)?;
    let annotations: Vec<AnnotationSeed> = read_collection(dir, ANNOTATIONS_FILE)?;

    info!(
        dir = %dir.display(),
        subjects = subjects.len(),
        artifacts = artifacts.len(),
        "Loading seed data"
    );

    let mut report = SeedReport::default();
    let mut uow = begin_unit_of_work(db, "seed_loader::load_seed_dir").await?;
    let conn = uow.conn();

    for seed in &model_runs {
        report.model_runs.record(load_model_run(conn, seed).await?);
    }
    for seed in &subjects {
        report.subjects.record(load_subject(conn, seed).await?);
    }
    for seed in &cases {
        report.cases.record(load_case(conn, seed).await?);
    }
    let images = dir.join(IMAGES_DIR);
    for seed in &artifacts {
        let outcome = load_artifact(conn, &images, seed).await?;
        report.artifacts.record(outcome);
    }
    let mut labels = LabelCache::default();
    for seed in &predictions {
        let outcome = load_prediction(conn, &mut labels, seed).await?;
        report.predictions.record(outcome);
    }
    for seed in &annotations {
        let outcome = load_annotation(conn, &mut labels, seed).await?;
        report.annotations.record(outcome);
    }

    uow.commit().await?;

    info!(
        subjects = ?report.subjects,
        cases = ?report.cases,
        artifacts = ?report.artifacts,
        predictions = ?report.predictions,
        annotations = ?report.annotations,
        model_runs = ?report.model_runs,
        "Seed data loaded"
    );
    Ok(report)
}

async fn load_model_run(conn: &mut SqliteConnection, seed: &ModelRunSeed) -> Result<bool> {
    if model_run_exists(&mut *conn, seed.id).await? {
        return Ok(false);
    }
    let run = ModelRun {
        id: seed.id,
        name: seed.name.clone(),
        description: seed.description.clone(),
        artifact_path: seed.artifact_path.clone(),
    };
    match insert_model_run(&mut *conn, &run).await {
        Ok(()) => Ok(true),
        // Same name already registered under another id
        Err(err) if err.is_unique_violation() => {
            warn!(
                model_run = seed.name.as_str(),
                id = seed.id,
                "Model run name taken, skipping"
            );
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

async fn load_subject(conn: &mut SqliteConnection, seed: &SubjectSeed) -> Result<bool> {
    if subject_exists(&mut *conn, seed.id).await? {
        return Ok(false);
    }
    let subject = Subject {
        id: seed.id,
        external_id: seed.external_id.clone(),
        birth_year: seed.birth_year,
        sex: seed.sex.clone(),
    };
    insert_subject(&mut *conn, &subject).await?;
    Ok(true)
}

async fn load_case(conn: &mut SqliteConnection, seed: &CaseSeed) -> Result<bool> {
    if case_exists(&mut *conn, seed.id).await? {
        return Ok(false);
    }
    if !subject_exists(&mut *conn, seed.subject_id).await? {
        warn!(
            case_id = seed.id,
            subject_id = seed.subject_id,
            "Case refers to missing subject, skipping"
        );
        return Ok(false);
    }
    let taken_at = time::from_db_opt(seed.taken_at.clone())?
        .unwrap_or_else(time::now);
    insert_case(
        &mut *conn,
        Some(seed.id),
        seed.subject_id,
        &taken_at,
        seed.reason.as_deref(),
    )
    .await?;
    Ok(true)
}

async fn load_artifact(
    conn: &mut SqliteConnection,
    images: &Path,
    seed: &ArtifactSeed,
) -> Result<bool> {
    if artifact_exists(&mut *conn, seed.id).await? {
        return Ok(false);
    }
    if !case_exists(&mut *conn, seed.case_id).await? {
        warn!(
            artifact_id = seed.id,
            case_id = seed.case_id,
            "Artifact refers to missing case, skipping"
        );
        return Ok(false);
    }

    let path = images.join(&seed.filename);
    let content = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                artifact_id = seed.id,
                path = %path.display(),
                error = %err,
                "Image file unreadable, skipping"
            );
            return Ok(false);
        }
    };

    let reviewed_at = time::from_db_opt(seed.reviewed_at.clone())?;
    insert_artifact(
        &mut *conn,
        &NewArtifact {
            id: Some(seed.id),
            case_id: seed.case_id,
            filename: &seed.filename,
            content: &content,
            content_type: &seed.content_type,
            view_position: seed.view_position.as_deref(),
            follow_up: seed.follow_up,
            reviewed_at,
        },
    )
    .await?;
    Ok(true)
}

/// Label code → id, with misses remembered so each unknown code warns once
#[derive(Default)]
struct LabelCache {
    ids: HashMap<String, Option<i64>>,
}

impl LabelCache {
    async fn lookup(&mut self, conn: &mut SqliteConnection, code: &str) -> Result<Option<i64>> {
        if let Some(cached) = self.ids.get(code) {
            return Ok(*cached);
        }
        let id = find_label_by_code(conn, code).await?.map(|l| l.id);
        if id.is_none() {
            warn!(
                label = code,
                "Unknown label code in seed data, skipping its records"
            );
        }
        self.ids.insert(code.to_string(), id);
        Ok(id)
    }
}

async fn parents_exist(
    conn: &mut SqliteConnection,
    artifact_id: i64,
    model_run_id: i64,
) -> Result<bool> {
    if !artifact_exists(&mut *conn, artifact_id).await? {
        return Ok(false);
    }
    model_run_exists(&mut *conn, model_run_id).await
}

async fn load_prediction(
    conn: &mut SqliteConnection,
    labels: &mut LabelCache,
    seed: &PredictionSeed,
) -> Result<bool> {
    let Some(label_id) = labels.lookup(&mut *conn, &seed.label_code).await? else {
        return Ok(false);
    };
    let (artifact_id, model_run_id) = (seed.artifact_id, seed.model_run_id);
    if !parents_exist(&mut *conn, artifact_id, model_run_id).await? {
        return Ok(false);
    }
    let duplicate = prediction_exists(&mut *conn, artifact_id, model_run_id, label_id)
        .await?;
    if duplicate {
        return Ok(false);
    }
    if !(0.0..=1.0).contains(&seed.probability) {
        warn!(
            artifact_id,
            probability = seed.probability,
            "Probability out of range, skipping"
        );
        return Ok(false);
    }

    find_or_create(
        &mut *conn,
        &PredictionUpsert {
            artifact_id,
            model_run_id,
            label_id,
            probability: seed.probability,
            decision: seed.decision,
        },
    )
    .await?;
    Ok(true)
}

async fn load_annotation(
    conn: &mut SqliteConnection,
    labels: &mut LabelCache,
    seed: &AnnotationSeed,
) -> Result<bool> {
    let Some(label_id) = labels.lookup(&mut *conn, &seed.label_code).await? else {
        return Ok(false);
    };
    let (artifact_id, model_run_id) = (seed.artifact_id, seed.model_run_id);
    if !parents_exist(&mut *conn, artifact_id, model_run_id).await? {
        return Ok(false);
    }

    let reviewer = find_or_create(
        &mut *conn,
        &ReviewerByEmail {
            email: &seed.reviewer,
            full_name: SEED_REVIEWER_NAME,
        },
    )
    .await?;
    if annotation_exists(
        &mut *conn,
        artifact_id,
        model_run_id,
        label_id,
        reviewer.guid,
    )
    .await?
    {
        return Ok(false);
    }

    find_or_create(
        &mut *conn,
        &AnnotationUpsert {
            artifact_id,
            model_run_id,
            label_id,
            reviewer_id: reviewer.guid,
            is_present: seed.is_present,
            comment: seed.comment.as_deref(),
            labeled_at: time::now(),
        },
    )
    .await?;
    Ok(true)
}
