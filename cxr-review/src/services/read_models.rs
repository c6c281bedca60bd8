//! Read models for the review UI

use chrono::{DateTime, Datelike, Utc};
use cxr_common::labels::ANY_FINDING_CODE;
use cxr_common::{time, Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::db::annotations::list_annotations_for_artifact;
use crate::db::artifacts::{list_artifacts_for_case, load_artifact_content};
use crate::db::cases::list_cases_for_subject;
use crate::db::predictions::list_predictions_for_artifact;
use crate::db::subjects::load_subject;
use crate::db::{Annotation, Artifact, Case, Prediction};
use crate::services::review_state::ReviewStatus;

/// One row of the worklist
#[derive(Debug, Clone, Serialize)]
pub struct SubjectSummary {
    pub id: i64,
    pub external_id: Option<String>,
    pub age: Option<i32>,
    pub sex: Option<String>,
    pub needs_review: bool,
    pub pending_reviews: i64,
    pub last_case_at: Option<DateTime<Utc>>,
}

/// Subjects with pending artifacts first, then by most recent case
pub async fn list_subjects(db: &SqlitePool) -> Result<Vec<SubjectSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.external_id, s.birth_year, s.sex,
               (SELECT COUNT(*) FROM artifacts a JOIN cases c ON c.id = a.case_id
                 WHERE c.subject_id = s.id AND a.reviewed_at IS NULL) AS pending,
               (SELECT MAX(c.taken_at) FROM cases c WHERE c.subject_id = s.id) AS last_case_at
        FROM subjects s
        "#,
    )
    .fetch_all(db)
    .await?;

    let year = time::now().year();
    let mut summaries = rows
        .iter()
        .map(|row| {
            let pending: i64 = row.get("pending");
            let birth_year: Option<i32> = row.get("birth_year");
            Ok(SubjectSummary {
                id: row.get("id"),
                external_id: row.get("external_id"),
                age: birth_year.map(|b| year - b),
                sex: row.get("sex"),
                needs_review: pending > 0,
                pending_reviews: pending,
                last_case_at: time::from_db_opt(row.get("last_case_at"))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    summaries.sort_by(|a, b| {
        b.needs_review
            .cmp(&a.needs_review)
            .then_with(|| b.last_case_at.cmp(&a.last_case_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(summaries)
}

/// Predictions of one artifact split into the binary row and the rest
#[derive(Debug, Clone, Default, Serialize)]
pub struct PredictionView {
    pub binary: Option<Prediction>,
    pub labels: Vec<Prediction>,
}

impl From<Vec<Prediction>> for PredictionView {
    fn from(predictions: Vec<Prediction>) -> Self {
        let mut view = PredictionView::default();
        for prediction in predictions {
            if prediction.label_code == ANY_FINDING_CODE {
                view.binary = Some(prediction);
            } else {
                view.labels.push(prediction);
            }
        }
        view
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactDetail {
    #[serde(flatten)]
    pub artifact: Artifact,
    pub status: ReviewStatus,
    pub predictions: PredictionView,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    #[serde(flatten)]
    pub case: Case,
    pub artifacts: Vec<ArtifactDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectDetail {
    pub id: i64,
    pub external_id: Option<String>,
    pub birth_year: Option<i32>,
    pub age: Option<i32>,
    pub sex: Option<String>,
    pub cases: Vec<CaseDetail>,
}

pub async fn subject_detail(db: &SqlitePool, subject_id: i64) -> Result<SubjectDetail> {
    let subject = load_subject(db, subject_id)
        .await?
        .ok_or(Error::SubjectNotFound(subject_id))?;

    let mut cases = Vec::new();
    for case in list_cases_for_subject(db, subject_id).await? {
        let mut artifacts = Vec::new();
        for artifact in list_artifacts_for_case(db, case.id).await? {
            let predictions = list_predictions_for_artifact(db, artifact.id).await?;
            let annotations = list_annotations_for_artifact(db, artifact.id).await?;
            artifacts.push(ArtifactDetail {
                status: ReviewStatus::from_reviewed_at(artifact.reviewed_at),
                artifact,
                predictions: predictions.into(),
                annotations,
            });
        }
        cases.push(CaseDetail { case, artifacts });
    }

    Ok(SubjectDetail {
        id: subject.id,
        age: subject.age_in(time::now().year()),
        external_id: subject.external_id,
        birth_year: subject.birth_year,
        sex: subject.sex,
        cases,
    })
}

/// Raw image bytes and content type
pub async fn artifact_image(db: &SqlitePool, artifact_id: i64) -> Result<(Vec<u8>, String)> {
    load_artifact_content(db, artifact_id)
        .await?
        .ok_or(Error::ArtifactNotFound(artifact_id))
}
