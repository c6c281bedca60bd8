//! AnnotationService: upsert, all-or-nothing batches, review transitions

mod helpers;

use cxr_common::Error;
use cxr_review::db::artifacts::load_artifact;
use cxr_review::services::{
    AnnotationService, AnnotationSubmission, IngestService, ReviewerIdentity, UploadOptions,
};
use helpers::{count, fixture, Fixture, PNG_BYTES};
use std::collections::BTreeMap;

fn reviewer(email: &str) -> ReviewerIdentity {
    ReviewerIdentity {
        email: email.to_string(),
        full_name: "Reviewer".to_string(),
    }
}

fn submission(pairs: &[(&str, bool)], comment: Option<&str>) -> AnnotationSubmission {
    AnnotationSubmission {
        labels: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>(),
        comment: comment.map(str::to_string),
    }
}

async fn artifact(fx: &Fixture) -> i64 {
    IngestService::new(fx.pool.clone(), fx.inference(), "dual_v1")
        .create_case_with_image(
            1,
            PNG_BYTES,
            UploadOptions {
                filename: "a.png".to_string(),
                ..Default::default()
            },
            0.5,
        )
        .await
        .unwrap()
        .artifact_id
}

#[tokio::test]
async fn test_resubmission_updates_single_row() {
    let fx = fixture().await;
    let artifact_id = artifact(&fx).await;
    let service = AnnotationService::new(fx.pool.clone(), "dual_v1");
    let who = reviewer("a@example.com");

    let present = submission(&[("Cardiomegaly", true)], None);
    let first = service.submit(artifact_id, &who, &present).await.unwrap();
    let revised = submission(&[("Cardiomegaly", false)], Some("on reflection"));
    let second = service.submit(artifact_id, &who, &revised).await.unwrap();

    assert_eq!(count(&fx.pool, "annotations").await, 1);
    assert_eq!(second.annotations.len(), 1);
    let row = &second.annotations[0];
    assert_eq!(row.id, first.annotations[0].id);
    assert!(!row.is_present);
    assert_eq!(row.comment.as_deref(), Some("on reflection"));
    assert!(row.labeled_at >= first.annotations[0].labeled_at);
}

#[tokio::test]
async fn test_reviewers_keep_separate_rows() {
    let fx = fixture().await;
    let artifact_id = artifact(&fx).await;
    let service = AnnotationService::new(fx.pool.clone(), "dual_v1");

    let present = submission(&[("Mass", true)], None);
    let absent = submission(&[("Mass", false)], None);
    service
        .submit(artifact_id, &reviewer("a@example.com"), &present)
        .await
        .unwrap();
    let outcome = service
        .submit(artifact_id, &reviewer("b@example.com"), &absent)
        .await
        .unwrap();

    assert_eq!(outcome.annotations.len(), 2);
    assert_eq!(count(&fx.pool, "reviewers").await, 2);
}

#[tokio::test]
async fn test_display_name_resolves_label() {
    let fx = fixture().await;
    let artifact_id = artifact(&fx).await;
    let service = AnnotationService::new(fx.pool.clone(), "dual_v1");

    let outcome = service
        .submit(
            artifact_id,
            &reviewer("a@example.com"),
            &submission(&[("Pleural Thickening", true)], None),
        )
        .await
        .unwrap();
    assert_eq!(outcome.annotations[0].label_code, "Pleural_Thickening");
}

#[tokio::test]
async fn test_unknown_label_rolls_back_whole_batch() {
    let fx = fixture().await;
    let artifact_id = artifact(&fx).await;
    let service = AnnotationService::new(fx.pool.clone(), "dual_v1");

    // "Atelectasis" sorts before the unknown label and is written first
    let err = service
        .submit(
            artifact_id,
            &reviewer("a@example.com"),
            &submission(&[("Atelectasis", true), ("Broken Rib", true)], None),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownLabel(ref l) if l == "Broken Rib"));
    assert_eq!(count(&fx.pool, "annotations").await, 0);
    let stored = load_artifact(&fx.pool, artifact_id).await.unwrap().unwrap();
    assert!(stored.reviewed_at.is_none());
}

#[tokio::test]
async fn test_failed_batch_keeps_prior_review() {
    let fx = fixture().await;
    let artifact_id = artifact(&fx).await;
    let service = AnnotationService::new(fx.pool.clone(), "dual_v1");
    let who = reviewer("a@example.com");

    let accepted = service
        .submit(artifact_id, &who, &submission(&[("Edema", true)], None))
        .await
        .unwrap();
    let with_unknown = submission(&[("Edema", false), ("Nope", true)], None);
    service
        .submit(artifact_id, &who, &with_unknown)
        .await
        .unwrap_err();

    let stored = load_artifact(&fx.pool, artifact_id).await.unwrap().unwrap();
    assert_eq!(stored.reviewed_at, accepted.reviewed_at);
    let is_present: bool = sqlx::query_scalar("SELECT is_present FROM annotations")
        .fetch_one(&fx.pool)
        .await
        .unwrap();
    assert!(is_present);
}

#[tokio::test]
async fn test_submission_marks_reviewed() {
    let fx = fixture().await;
    let artifact_id = artifact(&fx).await;
    let service = AnnotationService::new(fx.pool.clone(), "dual_v1");

    let before = load_artifact(&fx.pool, artifact_id).await.unwrap().unwrap();
    assert!(before.reviewed_at.is_none());

    let absent = submission(&[("Hernia", false)], None);
    let outcome = service
        .submit(artifact_id, &reviewer("a@example.com"), &absent)
        .await
        .unwrap();

    let after = load_artifact(&fx.pool, artifact_id).await.unwrap().unwrap();
    assert!(after.reviewed_at.is_some());
    assert_eq!(after.reviewed_at, outcome.reviewed_at);
}

#[tokio::test]
async fn test_missing_artifact_rejected_before_any_write() {
    let fx = fixture().await;
    let service = AnnotationService::new(fx.pool.clone(), "dual_v1");

    let present = submission(&[("Mass", true)], None);
    let err = service
        .submit(404, &reviewer("a@example.com"), &present)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ArtifactNotFound(404)));
    assert_eq!(count(&fx.pool, "reviewers").await, 0);
}
