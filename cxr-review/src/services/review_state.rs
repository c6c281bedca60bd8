//! ReviewStateMachine
//!
//! Two states derived from `artifacts.reviewed_at`: pending (NULL) and
//! reviewed (set). New model output always reopens review; an annotation
//! submission closes it.

use chrono::{DateTime, Utc};
use cxr_common::{Error, Result};
use serde::Serialize;
use sqlx::SqliteConnection;

use crate::db::artifacts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Reviewed { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    /// Artifact inserted
    Created,
    /// Predictions written for the artifact
    Rescored,
    /// Annotation batch committed
    AnnotationSubmitted { at: DateTime<Utc> },
}

impl ReviewStatus {
    pub fn from_reviewed_at(reviewed_at: Option<DateTime<Utc>>) -> Self {
        match reviewed_at {
            Some(at) => ReviewStatus::Reviewed { at },
            None => ReviewStatus::Pending,
        }
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReviewStatus::Pending => None,
            ReviewStatus::Reviewed { at } => Some(*at),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ReviewStatus::Pending)
    }

    /// Next state; every event is accepted in every state
    pub fn apply(self, event: ReviewEvent) -> ReviewStatus {
        match event {
            ReviewEvent::Created | ReviewEvent::Rescored => ReviewStatus::Pending,
            ReviewEvent::AnnotationSubmitted { at } => ReviewStatus::Reviewed { at },
        }
    }
}

/// Apply `event` to a stored artifact and persist the resulting state
pub async fn transition(
    conn: &mut SqliteConnection,
    artifact_id: i64,
    event: ReviewEvent,
) -> Result<ReviewStatus> {
    let current = artifacts::load_artifact(&mut *conn, artifact_id)
        .await?
        .ok_or(Error::ArtifactNotFound(artifact_id))?;

    let from = ReviewStatus::from_reviewed_at(current.reviewed_at);
    let to = from.apply(event);

    if from != to {
        let reviewed_at = to.reviewed_at();
        artifacts::set_reviewed_at(&mut *conn, artifact_id, reviewed_at.as_ref())
            .await?;
        tracing::debug!(artifact_id, ?from, ?to, "Review status changed");
    }

    Ok(to)
}
