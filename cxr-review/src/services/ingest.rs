//! Ingestion and scoring
//!
//! Inference always runs before the unit of work opens, so a scorer failure
//! leaves the database untouched and the write lock is never held while a
//! kernel is running. All writes of one call commit together.

use chrono::{DateTime, Utc};
use cxr_common::db::{begin_unit_of_work, find_or_create, retry_on_lock};
use cxr_common::{time, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::artifacts::{insert_artifact, load_artifact_content};
use crate::db::cases::insert_case;
use crate::db::subjects::subject_exists;
use crate::db::{ModelRunByName, NewArtifact};
use crate::inference::{DualModelInference, InferenceResult};
use crate::services::prediction_store;
use crate::services::review_state::{self, ReviewEvent, ReviewStatus};

/// Accepted upload formats, as reported by magic-byte sniffing
const ACCEPTED_TYPES: &[&str] = &["image/png", "image/jpeg", "application/dicom"];

/// Check magic bytes; returns the detected content type
pub fn validate_image(bytes: &[u8]) -> Result<&'static str> {
    if bytes.is_empty() {
        return Err(Error::InvalidImage("empty upload".to_string()));
    }
    match infer::get(bytes) {
        Some(kind) if ACCEPTED_TYPES.contains(&kind.mime_type()) => Ok(kind.mime_type()),
        Some(kind) => Err(Error::InvalidImage(format!(
            "unsupported format: {}",
            kind.mime_type()
        ))),
        None => Err(Error::InvalidImage("unrecognized file format".to_string())),
    }
}

/// Case and artifact created by an upload
#[derive(Debug, Clone, Serialize)]
pub struct CreatedCase {
    pub case_id: i64,
    pub artifact_id: i64,
    pub taken_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub view_position: Option<String>,
    pub model_run: String,
    pub prediction_ids: Vec<i64>,
    pub predictions: InferenceResult,
}

/// Stored artifact after (re)scoring
#[derive(Debug, Clone, Serialize)]
pub struct ScoredArtifact {
    pub artifact_id: i64,
    pub model_run: String,
    pub prediction_ids: Vec<i64>,
    pub status: ReviewStatus,
    pub predictions: InferenceResult,
}

/// Upload parameters other than the image bytes
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub filename: String,
    pub taken_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub view_position: Option<String>,
}

#[derive(Clone)]
pub struct IngestService {
    db: SqlitePool,
    inference: DualModelInference,
    model_run: String,
}

impl IngestService {
    pub fn new(
        db: SqlitePool,
        inference: DualModelInference,
        model_run: impl Into<String>,
    ) -> Self {
        Self {
            db,
            inference,
            model_run: model_run.into(),
        }
    }

    /// Score an upload without persisting anything
    pub async fn predict_upload(&self, bytes: &[u8], threshold: f64) -> Result<InferenceResult> {
        validate_image(bytes)?;
        self.inference.infer(bytes, threshold).await
    }

    /// New case for `subject_id` holding one pending, scored artifact
    pub async fn create_case_with_image(
        &self,
        subject_id: i64,
        bytes: &[u8],
        options: UploadOptions,
        threshold: f64,
    ) -> Result<CreatedCase> {
        if !subject_exists(&self.db, subject_id).await? {
            return Err(Error::SubjectNotFound(subject_id));
        }
        let content_type = validate_image(bytes)?;
        let predictions = self.inference.infer(bytes, threshold).await?;

        let model_run = {
            let mut conn = self.db.acquire().await?;
            let model_run = ModelRunByName::named(&self.model_run);
            find_or_create(&mut conn, &model_run).await?
        };

        let taken_at = options.taken_at.unwrap_or_else(time::now);
        let (db, upload, predicted, run_id) = (&self.db, &options, &predictions, model_run.id);
        let (case_id, artifact_id, prediction_ids) =
            retry_on_lock("ingest::create_case_with_image", || async move {
                let mut uow = begin_unit_of_work(db, "ingest::create_case_with_image")
                    .await?;
                let case_id = insert_case(
                    uow.conn(),
                    None,
                    subject_id,
                    &taken_at,
                    upload.reason.as_deref(),
                )
                .await?;
                let artifact_id = insert_artifact(
                    uow.conn(),
                    &NewArtifact {
                        id: None,
                        case_id,
                        filename: &upload.filename,
                        content: bytes,
                        content_type,
                        view_position: upload.view_position.as_deref(),
                        follow_up: 0,
                        reviewed_at: None,
                    },
                )
                .await?;
                let ids = prediction_store::persist(uow.conn(), artifact_id, run_id, predicted)
                    .await?;
                uow.commit().await?;
                Ok((case_id, artifact_id, ids))
            })
            .await?;

        info!(
            subject_id,
            case_id,
            artifact_id,
            model_run = model_run.name.as_str(),
            binary = predictions.binary.label.as_str(),
            "Case created with scored image"
        );

        Ok(CreatedCase {
            case_id,
            artifact_id,
            taken_at,
            reason: options.reason,
            filename: options.filename,
            content_type: content_type.to_string(),
            view_position: options.view_position,
            model_run: model_run.name,
            prediction_ids,
            predictions,
        })
    }

    /// Re-score a stored artifact; reopens its review
    pub async fn score_artifact(
        &self,
        artifact_id: i64,
        threshold: f64,
        model_run: Option<&str>,
    ) -> Result<ScoredArtifact> {
        let (bytes, _content_type) = load_artifact_content(&self.db, artifact_id)
            .await?
            .ok_or(Error::ArtifactNotFound(artifact_id))?;
        let predictions = self.inference.infer(&bytes, threshold).await?;

        let run_name = model_run.unwrap_or(&self.model_run);
        let model_run = {
            let mut conn = self.db.acquire().await?;
            let model_run = ModelRunByName::named(run_name);
            find_or_create(&mut conn, &model_run).await?
        };

        let (db, predicted, run_id) = (&self.db, &predictions, model_run.id);
        let (prediction_ids, status) = retry_on_lock("ingest::score_artifact", || async move {
            let mut uow = begin_unit_of_work(db, "ingest::score_artifact").await?;
            let ids = prediction_store::persist(uow.conn(), artifact_id, run_id, predicted)
                .await?;
            let event = ReviewEvent::Rescored;
            let status = review_state::transition(uow.conn(), artifact_id, event)
                .await?;
            uow.commit().await?;
            Ok((ids, status))
        })
        .await?;

        info!(
            artifact_id,
            model_run = model_run.name.as_str(),
            rows = prediction_ids.len(),
            "Artifact scored"
        );

        Ok(ScoredArtifact {
            artifact_id,
            model_run: model_run.name,
            prediction_ids,
            status,
            predictions,
        })
    }
}
