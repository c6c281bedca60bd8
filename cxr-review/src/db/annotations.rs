//! Annotation rows (human review decisions)
//!
//! At most one row per (artifact, model run, label, reviewer).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cxr_common::db::FindOrCreate;
use cxr_common::{time, Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: i64,
    pub artifact_id: i64,
    pub model_run_id: i64,
    pub label_id: i64,
    pub label_code: String,
    pub reviewer_id: Uuid,
    pub is_present: bool,
    pub comment: Option<String>,
    pub labeled_at: DateTime<Utc>,
}

impl Annotation {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let reviewer: String = row.get("reviewer_id");
        let labeled_at: String = row.get("labeled_at");
        Ok(Self {
            id: row.get("id"),
            artifact_id: row.get("artifact_id"),
            model_run_id: row.get("model_run_id"),
            label_id: row.get("label_id"),
            label_code: row.get("code"),
            reviewer_id: Uuid::parse_str(&reviewer).map_err(|e| {
                Error::Internal(format!("Invalid reviewer guid '{}': {}", reviewer, e))
            })?,
            is_present: row.get("is_present"),
            comment: row.get("comment"),
            labeled_at: time::from_db(&labeled_at)?,
        })
    }
}

/// Upsert keyed by (artifact, model run, label, reviewer); always refreshes `labeled_at`
#[derive(Debug, Clone)]
pub struct AnnotationUpsert<'a> {
    pub artifact_id: i64,
    pub model_run_id: i64,
    pub label_id: i64,
    pub reviewer_id: Uuid,
    pub is_present: bool,
    pub comment: Option<&'a str>,
    pub labeled_at: DateTime<Utc>,
}

#[async_trait]
impl<'a> FindOrCreate for AnnotationUpsert<'a> {
    type Output = i64;

    fn describe(&self) -> String {
        format!(
            "annotation=({}, {}, {}, {})",
            self.artifact_id, self.model_run_id, self.label_id, self.reviewer_id
        )
    }

    async fn find_existing(&self, conn: &mut SqliteConnection) -> Result<Option<i64>> {
        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM annotations
            WHERE artifact_id = ? AND model_run_id = ? AND label_id = ? AND reviewer_id = ?
            "#,
        )
        .bind(self.artifact_id)
        .bind(self.model_run_id)
        .bind(self.label_id)
        .bind(self.reviewer_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(id) = existing else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE annotations
            SET is_present = ?, comment = ?, labeled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(self.is_present)
        .bind(self.comment)
        .bind(time::to_db(&self.labeled_at))
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(Some(id))
    }

    async fn insert_new(&self, conn: &mut SqliteConnection) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO annotations (artifact_id, model_run_id, label_id, reviewer_id, is_present, comment, labeled_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.artifact_id)
        .bind(self.model_run_id)
        .bind(self.label_id)
        .bind(self.reviewer_id.to_string())
        .bind(self.is_present)
        .bind(self.comment)
        .bind(time::to_db(&self.labeled_at))
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

pub async fn annotation_exists<'e>(
    executor: impl SqliteExecutor<'e>,
    artifact_id: i64,
    model_run_id: i64,
    label_id: i64,
    reviewer_id: Uuid,
) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM annotations
        WHERE artifact_id = ? AND model_run_id = ? AND label_id = ? AND reviewer_id = ?
        "#,
    )
    .bind(artifact_id)
    .bind(model_run_id)
    .bind(label_id)
    .bind(reviewer_id.to_string())
    .fetch_optional(executor)
    .await?;
    Ok(found.is_some())
}

pub async fn list_annotations_for_artifact<'e>(
    executor: impl SqliteExecutor<'e>,
    artifact_id: i64,
) -> Result<Vec<Annotation>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.artifact_id, a.model_run_id, a.label_id, l.code, a.reviewer_id,
               a.is_present, a.comment, a.labeled_at
        FROM annotations a
        JOIN labels l ON l.id = a.label_id
        WHERE a.artifact_id = ?
        ORDER BY l.code, a.reviewer_id
        "#,
    )
    .bind(artifact_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(Annotation::from_row).collect()
}
