//! Ingestion, re-scoring and review-status transitions

mod helpers;

use cxr_common::labels::ANY_FINDING_CODE;
use cxr_common::Error;
use cxr_review::db::artifacts::load_artifact;
use cxr_review::db::predictions::list_predictions_for_artifact;
use cxr_review::services::{
    AnnotationService, AnnotationSubmission, IngestService, ReviewerIdentity, UploadOptions,
};
use helpers::{count, fixture, unavailable_inference, PNG_BYTES};
use std::collections::BTreeMap;

fn upload() -> UploadOptions {
    UploadOptions {
        filename: "chest.png".to_string(),
        reason: Some("Follow-up".to_string()),
        view_position: Some("PA".to_string()),
        ..Default::default()
    }
}

fn reviewer() -> ReviewerIdentity {
    ReviewerIdentity {
        email: "reviewer@example.com".to_string(),
        full_name: "Reviewer".to_string(),
    }
}

#[tokio::test]
async fn test_threshold_boundary_persisted_per_decision_rule() {
    let fx = fixture().await;
    fx.binary.set(0.5);
    fx.multilabel.set(&[("Cardiomegaly", 0.5)]);
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");

    let created = ingest
        .create_case_with_image(1, PNG_BYTES, upload(), 0.5)
        .await
        .unwrap();

    let rows = list_predictions_for_artifact(&fx.pool, created.artifact_id)
        .await
        .unwrap();
    let binary = rows
        .iter()
        .find(|p| p.label_code == ANY_FINDING_CODE)
        .unwrap();
    let cardio = rows
        .iter()
        .find(|p| p.label_code == "Cardiomegaly")
        .unwrap();
    assert!(binary.decision);
    assert!(!cardio.decision);
    assert_eq!(created.predictions.binary.label, "Finding");
}

#[tokio::test]
async fn test_create_case_writes_case_artifact_and_predictions() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");

    let created = ingest
        .create_case_with_image(1, PNG_BYTES, upload(), 0.5)
        .await
        .unwrap();

    assert_eq!(created.content_type, "image/png");
    // ANY_FINDING plus three multi-label rows
    assert_eq!(created.prediction_ids.len(), 4);
    assert_eq!(count(&fx.pool, "cases").await, 1);
    assert_eq!(count(&fx.pool, "predictions").await, 4);

    let artifact = load_artifact(&fx.pool, created.artifact_id)
        .await
        .unwrap()
        .unwrap();
    assert!(artifact.reviewed_at.is_none());
    assert_eq!(artifact.view_position.as_deref(), Some("PA"));
}

#[tokio::test]
async fn test_rescore_updates_rows_in_place() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");
    let created = ingest
        .create_case_with_image(1, PNG_BYTES, upload(), 0.5)
        .await
        .unwrap();

    fx.binary.set(0.1);
    let rescored = [("Cardiomegaly", 0.3), ("Edema", 0.95), ("Hernia", 0.5)];
    fx.multilabel.set(&rescored);
    let scored = ingest
        .score_artifact(created.artifact_id, 0.5, None)
        .await
        .unwrap();
    let again = ingest
        .score_artifact(created.artifact_id, 0.5, None)
        .await
        .unwrap();

    let mut first_ids = created.prediction_ids.clone();
    let mut second_ids = scored.prediction_ids.clone();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);
    assert_eq!(scored.prediction_ids, again.prediction_ids);
    assert_eq!(count(&fx.pool, "predictions").await, 4);

    let rows = list_predictions_for_artifact(&fx.pool, created.artifact_id)
        .await
        .unwrap();
    let edema = rows.iter().find(|p| p.label_code == "Edema").unwrap();
    assert_eq!(edema.probability, 0.95);
    assert!(edema.decision);
    let binary = rows
        .iter()
        .find(|p| p.label_code == ANY_FINDING_CODE)
        .unwrap();
    assert!(!binary.decision);
}

#[tokio::test]
async fn test_rescore_under_new_model_run_adds_rows() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");
    let created = ingest
        .create_case_with_image(1, PNG_BYTES, upload(), 0.5)
        .await
        .unwrap();

    let scored = ingest
        .score_artifact(created.artifact_id, 0.5, Some("dual_v2"))
        .await
        .unwrap();
    assert_eq!(scored.model_run, "dual_v2");
    assert_eq!(count(&fx.pool, "predictions").await, 8);
    assert_eq!(count(&fx.pool, "model_runs").await, 2);
}

#[tokio::test]
async fn test_unknown_scorer_label_skipped() {
    let fx = fixture().await;
    let scores = [("Cardiomegaly", 0.8), ("Lung Opacity", 0.7)];
    fx.multilabel.set(&scores);
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");

    let created = ingest
        .create_case_with_image(1, PNG_BYTES, upload(), 0.5)
        .await
        .unwrap();

    assert_eq!(created.prediction_ids.len(), 2);
    assert_eq!(created.predictions.labels.len(), 2);
}

#[tokio::test]
async fn test_model_unavailable_writes_nothing() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), unavailable_inference(), "dual_v1");

    let err = ingest
        .create_case_with_image(1, PNG_BYTES, upload(), 0.5)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ModelUnavailable { .. }));
    assert_eq!(count(&fx.pool, "cases").await, 0);
    assert_eq!(count(&fx.pool, "artifacts").await, 0);
    assert_eq!(count(&fx.pool, "predictions").await, 0);
}

#[tokio::test]
async fn test_missing_subject_checked_before_image() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");

    let err = ingest
        .create_case_with_image(42, b"not an image", upload(), 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SubjectNotFound(42)));

    let err = ingest
        .create_case_with_image(1, b"not an image", upload(), 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidImage(_)));
}

#[tokio::test]
async fn test_predict_upload_persists_nothing() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");

    let result = ingest.predict_upload(PNG_BYTES, 0.5).await.unwrap();
    assert_eq!(result.labels.len(), 3);
    assert_eq!(count(&fx.pool, "predictions").await, 0);
    assert_eq!(count(&fx.pool, "model_runs").await, 0);
}

#[tokio::test]
async fn test_review_cycle_annotation_then_rescore() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");
    let annotations = AnnotationService::new(fx.pool.clone(), "dual_v1");
    let created = ingest
        .create_case_with_image(1, PNG_BYTES, upload(), 0.5)
        .await
        .unwrap();

    let mut labels = BTreeMap::new();
    labels.insert("Cardiomegaly".to_string(), true);
    let outcome = annotations
        .submit(
            created.artifact_id,
            &reviewer(),
            &AnnotationSubmission {
                labels,
                comment: None,
            },
        )
        .await
        .unwrap();
    assert!(outcome.reviewed_at.is_some());

    let artifact = load_artifact(&fx.pool, created.artifact_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.reviewed_at, outcome.reviewed_at);

    let scored = ingest

        .score_artifact(created.artifact_id, 0.5, None)
        .await
        .unwrap();
    assert!(scored.status.is_pending());
    let artifact = load_artifact(&fx.pool, created.artifact_id)
        .await
        .unwrap()
        .unwrap();
    assert!(artifact.reviewed_at.is_none());
}

#[tokio::test]
async fn test_score_missing_artifact() {
    let fx = fixture().await;
    let ingest = IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1");
    let err = ingest.score_artifact(99, 0.5, None).await.unwrap_err();
    assert!(matches!(err, Error::ArtifactNotFound(99)));
}
