//! Prediction rows
//!
//! At most one row per (artifact, model run, label). Writes go through
//! [`PredictionUpsert`], which refreshes an existing row in place.

use async_trait::async_trait;
use cxr_common::db::FindOrCreate;
use cxr_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};

/// Stored prediction joined with its label code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub id: i64,
    pub artifact_id: i64,
    pub model_run_id: i64,
    pub label_id: i64,
    pub label_code: String,
    pub probability: f64,
    pub decision: bool,
}

impl Prediction {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            artifact_id: row.get("artifact_id"),
            model_run_id: row.get("model_run_id"),
            label_id: row.get("label_id"),
            label_code: row.get("code"),
            probability: row.get("probability"),
            decision: row.get("decision"),
        }
    }
}

/// Last-write-wins upsert keyed by (artifact, model run, label)
#[derive(Debug, Clone, Copy)]
pub struct PredictionUpsert {
    pub artifact_id: i64,
    pub model_run_id: i64,
    pub label_id: i64,
    pub probability: f64,
    pub decision: bool,
}

#[async_trait]
impl FindOrCreate for PredictionUpsert {
    type Output = i64;

    fn describe(&self) -> String {
        format!(
            "prediction=({}, {}, {})",
            self.artifact_id, self.model_run_id, self.label_id
        )
    }

    async fn find_existing(&self, conn: &mut SqliteConnection) -> Result<Option<i64>> {
        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM predictions
            WHERE artifact_id = ? AND model_run_id = ? AND label_id = ?
            "#,
        )
        .bind(self.artifact_id)
        .bind(self.model_run_id)
        .bind(self.label_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(id) = existing else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE predictions
            SET probability = ?, decision = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(self.probability)
        .bind(self.decision)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(Some(id))
    }

    async fn insert_new(&self, conn: &mut SqliteConnection) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO predictions (artifact_id, model_run_id, label_id, probability, decision)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.artifact_id)
        .bind(self.model_run_id)
        .bind(self.label_id)
        .bind(self.probability)
        .bind(self.decision)
        .execute(conn)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

pub async fn prediction_exists<'e>(
    executor: impl SqliteExecutor<'e>,
    artifact_id: i64,
    model_run_id: i64,
    label_id: i64,
) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM predictions WHERE artifact_id = ? AND model_run_id = ? AND label_id = ?",
    )
    .bind(artifact_id)
    .bind(model_run_id)
    .bind(label_id)
    .fetch_optional(executor)
    .await?;
    Ok(found.is_some())
}

pub async fn list_predictions_for_artifact<'e>(
    executor: impl SqliteExecutor<'e>,
    artifact_id: i64,
) -> Result<Vec<Prediction>> {
    let rows = sqlx::query(
        r#"
        SELECT p.id, p.artifact_id, p.model_run_id, p.label_id, l.code, p.probability, p.decision
        FROM predictions p
        JOIN labels l ON l.id = p.label_id
        WHERE p.artifact_id = ?
        ORDER BY p.model_run_id, l.code
        "#,
    )
    .bind(artifact_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.iter().map(Prediction::from_row).collect())
}
