//! Seed reload: idempotence and skip accounting

mod helpers;

use cxr_common::db::init_database;
use cxr_common::seeds::*;
use cxr_review::services::load_seed_dir;
use helpers::{count, PNG_BYTES};
use std::path::Path;
use tempfile::TempDir;

fn write_seed_dir(dir: &Path) {
    let images = dir.join(IMAGES_DIR);
    std::fs::create_dir_all(&images).unwrap();
    for name in ["00000001_000.png", "00000001_001.png"] {
        std::fs::write(images.join(name), PNG_BYTES).unwrap();
    }

    write_collection(
        dir,
        MODEL_RUNS_FILE,
        &[ModelRunSeed {
            id: 1,
            name: "multilabel_v1".to_string(),
            description: Some("Ground truth".to_string()),
            artifact_path: None,
        }],
    )
    .unwrap();
    write_collection(
        dir,
        SUBJECTS_FILE,
        &[SubjectSeed {
            id: 1,
            external_id: Some("NIH_1".to_string()),
            birth_year: Some(1958),
            sex: Some("M".to_string()),
        }],
    )
    .unwrap();
    write_collection(
        dir,
        CASES_FILE,
        &[
            CaseSeed {
                id: 1,
                subject_id: 1,
                reason: Some("Follow-up series".to_string()),
                taken_at: None,
            },
            CaseSeed {
                id: 2,
                subject_id: 77,
                reason: None,
                taken_at: None,
            },
        ],
    )
    .unwrap();
    write_collection(
        dir,
        ARTIFACTS_FILE,
        &[
            ArtifactSeed {
                id: 1,
                case_id: 1,
                filename: "00000001_000.png".to_string(),
                content_type: "image/png".to_string(),
                view_position: Some("PA".to_string()),
                follow_up: 0,
                reviewed_at: Some("2025-05-01T10:00:00+00:00".to_string()),
            },
            ArtifactSeed {
                id: 2,
                case_id: 1,
                filename: "00000001_001.png".to_string(),
                content_type: "image/png".to_string(),
                view_position: Some("AP".to_string()),
                follow_up: 1,
                reviewed_at: None,
            },
            ArtifactSeed {
                id: 3,
                case_id: 1,
                filename: "missing.png".to_string(),
                content_type: "image/png".to_string(),
                view_position: None,
                follow_up: 2,
                reviewed_at: None,
            },
        ],
    )
    .unwrap();
    write_collection(
        dir,
        PREDICTIONS_FILE,
        &[
            PredictionSeed {
                artifact_id: 1,
                model_run_id: 1,
                label_code: "ANY_FINDING".to_string(),
                probability: 0.7,
                decision: true,
            },
            PredictionSeed {
                artifact_id: 1,
                model_run_id: 1,
                label_code: "Not A Label".to_string(),
                probability: 0.7,
                decision: true,
            },
        ],
    )
    .unwrap();
    write_collection(
        dir,
        ANNOTATIONS_FILE,
        &[AnnotationSeed {
            artifact_id: 1,
            model_run_id: 1,
            label_code: "Effusion".to_string(),
            is_present: true,
            comment: Some("Ground truth from source dataset".to_string()),
            reviewer: "seed".to_string(),
        }],
    )
    .unwrap();
}

#[tokio::test]
async fn test_first_load_counts_loaded_and_skipped() {
    let dir = TempDir::new().unwrap();
    let seeds = dir.path().join("seeds");
    write_seed_dir(&seeds);
    let pool = init_database(&dir.path().join("review.db")).await.unwrap();

    let report = load_seed_dir(&pool, &seeds).await.unwrap();

    assert_eq!(report.model_runs.loaded, 1);
    assert_eq!(report.subjects.loaded, 1);
    assert_eq!((report.cases.loaded, report.cases.skipped), (1, 1));
    assert_eq!((report.artifacts.loaded, report.artifacts.skipped), (2, 1));
    let predictions = &report.predictions;
    assert_eq!((predictions.loaded, predictions.skipped), (1, 1));
    assert_eq!(report.annotations.loaded, 1);

    let reviewed_at: Option<String> =
        sqlx::query_scalar("SELECT reviewed_at FROM artifacts WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(reviewed_at.is_some());
    let content: Vec<u8> = sqlx::query_scalar("SELECT content FROM artifacts WHERE id = 2")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(content, PNG_BYTES);
}

#[tokio::test]
async fn test_reload_skips_everything() {
    let dir = TempDir::new().unwrap();
    let seeds = dir.path().join("seeds");
    write_seed_dir(&seeds);
    let pool = init_database(&dir.path().join("review.db")).await.unwrap();

    load_seed_dir(&pool, &seeds).await.unwrap();
    let report = load_seed_dir(&pool, &seeds).await.unwrap();

    for collection in [
        report.model_runs,
        report.subjects,
        report.cases,
        report.artifacts,
        report.predictions,
        report.annotations,
    ] {
        assert_eq!(collection.loaded, 0);
    }
    assert_eq!(report.subjects.skipped, 1);
    assert_eq!(report.annotations.skipped, 1);
    assert_eq!(count(&pool, "artifacts").await, 2);
    assert_eq!(count(&pool, "annotations").await, 1);
}

#[tokio::test]
async fn test_empty_directory_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("review.db")).await.unwrap();
    let report = load_seed_dir(&pool, dir.path()).await.unwrap();
    assert_eq!(report, Default::default());
}
