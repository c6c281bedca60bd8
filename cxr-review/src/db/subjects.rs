//! Subject records

use cxr_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

/// A person whose imaging is tracked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    pub id: i64,
    pub external_id: Option<String>,
    pub birth_year: Option<i32>,
    pub sex: Option<String>,
}

impl Subject {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            external_id: row.get("external_id"),
            birth_year: row.get("birth_year"),
            sex: row.get("sex"),
        }
    }

    /// Age in years relative to `year`, when the birth year is known
    pub fn age_in(&self, year: i32) -> Option<i32> {
        self.birth_year.map(|born| year - born)
    }
}

/// Insert a subject with a caller-assigned id
pub async fn insert_subject<'e>(
    executor: impl SqliteExecutor<'e>,
    subject: &Subject,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO subjects (id, external_id, birth_year, sex)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(subject.id)
    .bind(&subject.external_id)
    .bind(subject.birth_year)
    .bind(&subject.sex)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn load_subject<'e>(
    executor: impl SqliteExecutor<'e>,
    id: i64,
) -> Result<Option<Subject>> {
    let row = sqlx::query(
        r#"
        SELECT id, external_id, birth_year, sex
        FROM subjects
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.as_ref().map(Subject::from_row))
}

pub async fn subject_exists<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM subjects WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

pub async fn list_subjects<'e>(executor: impl SqliteExecutor<'e>) -> Result<Vec<Subject>> {
    let rows = sqlx::query("SELECT id, external_id, birth_year, sex FROM subjects ORDER BY id")
        .fetch_all(executor)
        .await?;

    Ok(rows.iter().map(Subject::from_row).collect())
}
