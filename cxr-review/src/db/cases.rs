//! Case (imaging encounter) records

use chrono::{DateTime, Utc};
use cxr_common::{time, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    pub id: i64,
    pub subject_id: i64,
    pub taken_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl Case {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let taken_at: String = row.get("taken_at");
        Ok(Self {
            id: row.get("id"),
            subject_id: row.get("subject_id"),
            taken_at: time::from_db(&taken_at)?,
            reason: row.get("reason"),
        })
    }
}

/// Insert a case; `id = None` lets SQLite assign the next rowid
pub async fn insert_case<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Option<i64>,
    subject_id: i64,
    taken_at: &DateTime<Utc>,
    reason: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO cases (id, subject_id, taken_at, reason)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(subject_id)
    .bind(time::to_db(taken_at))
    .bind(reason)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn case_exists<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM cases WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

/// Cases of one subject, most recent first
pub async fn list_cases_for_subject<'e>(
    executor: impl SqliteExecutor<'e>,
    subject_id: i64,
) -> Result<Vec<Case>> {
    let rows = sqlx::query(
        r#"
        SELECT id, subject_id, taken_at, reason
        FROM cases
        WHERE subject_id = ?
        ORDER BY taken_at DESC, id DESC
        "#,
    )
    .bind(subject_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(Case::from_row).collect()
}
