//! Model-run records
//!
//! A model run names one scorer configuration. Rows are created lazily on
//! first use of a name.

use async_trait::async_trait;
use cxr_common::db::FindOrCreate;
use cxr_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRun {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub artifact_path: Option<String>,
}

impl ModelRun {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            artifact_path: row.get("artifact_path"),
        }
    }
}

/// Find-or-create key for a model run
#[derive(Debug, Clone)]
pub struct ModelRunByName<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub artifact_path: Option<&'a str>,
}

impl<'a> ModelRunByName<'a> {
    pub fn named(name: &'a str) -> Self {
        Self {
            name,
            description: None,
            artifact_path: None,
        }
    }
}

#[async_trait]
impl<'a> FindOrCreate for ModelRunByName<'a> {
    type Output = ModelRun;

    fn describe(&self) -> String {
        format!("model_run={}", self.name)
    }

    async fn find_existing(&self, conn: &mut SqliteConnection) -> Result<Option<ModelRun>> {
        find_model_run_by_name(conn, self.name).await
    }

    async fn insert_new(&self, conn: &mut SqliteConnection) -> Result<ModelRun> {
        let result = sqlx::query(
            r#"
            INSERT INTO model_runs (name, description, artifact_path)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(self.name)
        .bind(self.description)
        .bind(self.artifact_path)
        .execute(conn)
        .await?;

        tracing::info!(model_run = self.name, "Registered new model run");

        Ok(ModelRun {
            id: result.last_insert_rowid(),
            name: self.name.to_string(),
            description: self.description.map(str::to_string),
            artifact_path: self.artifact_path.map(str::to_string),
        })
    }
}

pub async fn find_model_run_by_name<'e>(
    executor: impl SqliteExecutor<'e>,
    name: &str,
) -> Result<Option<ModelRun>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, description, artifact_path
        FROM model_runs
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(executor)
    .await?;
    Ok(row.as_ref().map(ModelRun::from_row))
}

pub async fn model_run_exists<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM model_runs WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(found.is_some())
}

/// Insert with a caller-assigned id (seed reload)
pub async fn insert_model_run<'e>(executor: impl SqliteExecutor<'e>, run: &ModelRun) -> Result<()> {
    sqlx::query("INSERT INTO model_runs (id, name, description, artifact_path) VALUES (?, ?, ?, ?)")
        .bind(run.id)
        .bind(&run.name)
        .bind(&run.description)
        .bind(&run.artifact_path)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn list_model_runs<'e>(executor: impl SqliteExecutor<'e>) -> Result<Vec<ModelRun>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, description, artifact_path
        FROM model_runs
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(ModelRun::from_row).collect())
}
