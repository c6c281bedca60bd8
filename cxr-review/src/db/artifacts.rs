//! Artifact (image) records
//!
//! Image bytes are only read through [`load_artifact_content`]; every other
//! query leaves the BLOB column alone.

use chrono::{DateTime, Utc};
use cxr_common::{time, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

/// Artifact metadata; `reviewed_at == None` means review is pending
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub id: i64,
    pub case_id: i64,
    pub filename: String,
    pub content_type: String,
    pub view_position: Option<String>,
    pub follow_up: i64,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Artifact {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.get("id"),
            case_id: row.get("case_id"),
            filename: row.get("filename"),
            content_type: row.get("content_type"),
            view_position: row.get("view_position"),
            follow_up: row.get("follow_up"),
            reviewed_at: time::from_db_opt(row.get("reviewed_at"))?,
        })
    }
}

/// Insert payload
#[derive(Debug, Clone)]
pub struct NewArtifact<'a> {
    /// Caller-assigned id, or `None` for the next rowid
    pub id: Option<i64>,
    pub case_id: i64,
    pub filename: &'a str,
    pub content: &'a [u8],
    pub content_type: &'a str,
    pub view_position: Option<&'a str>,
    pub follow_up: i64,
    pub reviewed_at: Option<DateTime<Utc>>,
}

const ARTIFACT_COLUMNS: &str =
    "id, case_id, filename, content_type, view_position, follow_up, reviewed_at";

pub async fn insert_artifact<'e>(
    executor: impl SqliteExecutor<'e>,
    artifact: &NewArtifact<'_>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO artifacts (id, case_id, filename, content, content_type, view_position, follow_up, reviewed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(artifact.id)
    .bind(artifact.case_id)
    .bind(artifact.filename)
    .bind(artifact.content)
    .bind(artifact.content_type)
    .bind(artifact.view_position)
    .bind(artifact.follow_up)
    .bind(artifact.reviewed_at.as_ref().map(time::to_db))
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn load_artifact<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<Artifact>> {
    let sql = format!("SELECT {} FROM artifacts WHERE id = ?", ARTIFACT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(Artifact::from_row).transpose()
}

/// Raw bytes and content type
pub async fn load_artifact_content<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<(Vec<u8>, String)>> {
    let row = sqlx::query("SELECT content, content_type FROM artifacts WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|r| (r.get("content"), r.get("content_type"))))
}

pub async fn artifact_exists<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM artifacts WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

/// Artifacts of one case in follow-up order
pub async fn list_artifacts_for_case<'e>(
    executor: impl SqliteExecutor<'e>,
    case_id: i64,
) -> Result<Vec<Artifact>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM artifacts WHERE case_id = ? ORDER BY follow_up, id",
        ARTIFACT_COLUMNS
    ))
    .bind(case_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(Artifact::from_row).collect()
}

/// Write the review timestamp; returns false when the artifact does not exist
pub async fn set_reviewed_at<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
    reviewed_at: Option<&DateTime<Utc>>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE artifacts SET reviewed_at = ? WHERE id = ?")
        .bind(reviewed_at.map(time::to_db))
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}
