//! AnnotationService: record human review decisions
//!
//! A submission is all-or-nothing. Labels are resolved inside the unit of
//! work; the first unresolvable label aborts the batch and the dropped
//! transaction discards every annotation written so far, leaving review
//! status untouched.

use chrono::{DateTime, Utc};
use cxr_common::db::{begin_unit_of_work, find_or_create, retry_on_lock};
use cxr_common::{time, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

use crate::db::annotations::list_annotations_for_artifact;
use crate::db::artifacts::artifact_exists;
use crate::db::labels::resolve_label;
use crate::db::{Annotation, AnnotationUpsert, ModelRunByName, ReviewerByEmail};
use crate::services::review_state::{self, ReviewEvent};

/// Who is submitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerIdentity {
    pub email: String,
    pub full_name: String,
}

/// Label code (or display name) → presence, plus one comment for the batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationSubmission {
    pub labels: BTreeMap<String, bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotationOutcome {
    pub artifact_id: i64,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Every current annotation of the artifact, all reviewers and model runs
    pub annotations: Vec<Annotation>,
}

#[derive(Clone)]
pub struct AnnotationService {
    db: SqlitePool,
    model_run: String,
}

impl AnnotationService {
    /// Annotations are filed under `model_run`
    pub fn new(db: SqlitePool, model_run: impl Into<String>) -> Self {
        Self {
            db,
            model_run: model_run.into(),
        }
    }

    pub async fn submit(
        &self,
        artifact_id: i64,
        reviewer: &ReviewerIdentity,
        submission: &AnnotationSubmission,
    ) -> Result<AnnotationOutcome> {
        if !artifact_exists(&self.db, artifact_id).await? {
            return Err(Error::ArtifactNotFound(artifact_id));
        }

        // Reference rows are shared across calls and committed on their own
        let (reviewer_row, model_run) = {
            let mut conn = self.db.acquire().await?;
            let reviewer_row = find_or_create(
                &mut conn,
                &ReviewerByEmail {
                    email: &reviewer.email,
                    full_name: &reviewer.full_name,
                },
            )
            .await?;
            let model_run = ModelRunByName::named(&self.model_run);
            let model_run = find_or_create(&mut conn, &model_run).await?;
            (reviewer_row, model_run)
        };

        let now = time::now();
        let (db, reviewer_id, model_run_id) = (&self.db, reviewer_row.guid, model_run.id);
        let status = retry_on_lock("annotation_service::submit", || async move {
            let mut uow = begin_unit_of_work(db, "annotation_service::submit").await?;

            for (code_or_name, &is_present) in &submission.labels {
                let label = resolve_label(uow.conn(), code_or_name)
                    .await?
                    .ok_or_else(|| Error::UnknownLabel(code_or_name.clone()))?;

                find_or_create(
                    uow.conn(),
                    &AnnotationUpsert {
                        artifact_id,
                        model_run_id,
                        label_id: label.id,
                        reviewer_id,
                        is_present,
                        comment: submission.comment.as_deref(),
                        labeled_at: now,
                    },
                )
                .await?;
            }

            let event = ReviewEvent::AnnotationSubmitted { at: now };
            let status = review_state::transition(uow.conn(), artifact_id, event)
                .await?;
            uow.commit().await?;
            Ok(status)
        })
        .await?;

        info!(
            artifact_id,
            reviewer = reviewer.email.as_str(),
            model_run = self.model_run.as_str(),
            labels = submission.labels.len(),
            "Annotations recorded"
        );

        Ok(AnnotationOutcome {
            artifact_id,
            reviewed_at: status.reviewed_at(),
            annotations: list_annotations_for_artifact(&self.db, artifact_id).await?,
        })
    }
}
