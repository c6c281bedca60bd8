//! Label rows
//!
//! Rows are seeded from the catalog at startup and never modified. The
//! designated any-finding label is additionally created on demand through
//! [`EnsureLabel`] so a database seeded by an older catalog still accepts
//! binary predictions.

use async_trait::async_trait;
use cxr_common::db::FindOrCreate;
use cxr_common::labels::LabelInfo;
use cxr_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub id: i64,
    pub code: String,
    pub display_name: String,
    pub description: Option<String>,
}

impl Label {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            code: row.get("code"),
            display_name: row.get("display_name"),
            description: row.get("description"),
        }
    }
}

pub async fn find_label_by_code<'e>(
    executor: impl SqliteExecutor<'e>,
    code: &str,
) -> Result<Option<Label>> {
    let row = sqlx::query("SELECT id, code, display_name, description FROM labels WHERE code = ?")
        .bind(code)
        .fetch_optional(executor)
        .await?;
    Ok(row.as_ref().map(Label::from_row))
}

pub async fn find_label_by_display_name<'e>(
    executor: impl SqliteExecutor<'e>,
    display_name: &str,
) -> Result<Option<Label>> {
    let row = sqlx::query(
        r#"
        SELECT id, code, display_name, description
        FROM labels
        WHERE display_name = ?
        ORDER BY id LIMIT 1
        "#,
    )
    .bind(display_name)
    .fetch_optional(executor)
    .await?;
    Ok(row.as_ref().map(Label::from_row))
}

/// Two-step resolution: exact code first, display name second
pub async fn resolve_label(
    conn: &mut SqliteConnection,
    code_or_name: &str,
) -> Result<Option<Label>> {
    if let Some(label) = find_label_by_code(&mut *conn, code_or_name).await? {
        return Ok(Some(label));
    }
    find_label_by_display_name(&mut *conn, code_or_name).await
}

pub async fn list_labels<'e>(executor: impl SqliteExecutor<'e>) -> Result<Vec<Label>> {
    let rows = sqlx::query("SELECT id, code, display_name, description FROM labels ORDER BY code")
        .fetch_all(executor)
        .await?;
    Ok(rows.iter().map(Label::from_row).collect())
}

/// Find-or-create a catalog label by code
pub struct EnsureLabel(pub &'static LabelInfo);

#[async_trait]
impl FindOrCreate for EnsureLabel {
    type Output = Label;

    fn describe(&self) -> String {
        format!("label={}", self.0.code)
    }

    async fn find_existing(&self, conn: &mut SqliteConnection) -> Result<Option<Label>> {
        find_label_by_code(conn, self.0.code).await
    }

    async fn insert_new(&self, conn: &mut SqliteConnection) -> Result<Label> {
        let result = sqlx::query(
            r#"
            INSERT INTO labels (code, display_name, description)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(self.0.code)
        .bind(self.0.display_name)
        .bind(self.0.description)
        .execute(conn)
        .await?;

        Ok(Label {
            id: result.last_insert_rowid(),
            code: self.0.code.to_string(),
            display_name: self.0.display_name.to_string(),
            description: Some(self.0.description.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxr_common::db::{find_or_create, init_database};
    use cxr_common::labels::LabelCatalog;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_label_falls_back_to_display_name() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("labels.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let by_code = resolve_label(&mut conn, "Pleural_Thickening")
            .await
            .unwrap()
            .unwrap();
        let by_name = resolve_label(&mut conn, "Pleural Thickening")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.id, by_name.id);
        let missing = resolve_label(&mut conn, "Broken Bone").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_ensure_label_recreates_missing_any_finding() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("labels.db")).await.unwrap();
        sqlx::query("DELETE FROM labels WHERE code = 'ANY_FINDING'")
            .execute(&pool)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let label = find_or_create(&mut conn, &EnsureLabel(LabelCatalog::any_finding()))
            .await
            .unwrap();
        let again = find_or_create(&mut conn, &EnsureLabel(LabelCatalog::any_finding()))
            .await
            .unwrap();
        assert_eq!(label.id, again.id);
        assert_eq!(label.display_name, "Any Finding");
    }
}
