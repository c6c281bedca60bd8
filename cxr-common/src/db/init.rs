//! Database initialization
//!
//! Creates the database file on first run and applies the schema. Every
//! statement is `CREATE ... IF NOT EXISTS`, so opening an existing database
//! is idempotent.

use crate::labels::LabelCatalog;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout; lock waits beyond this surface as `database is locked`
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Per-connection pragmas go through the connect options so that every
    // pooled connection enforces foreign keys, not just the first one
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    seed_labels(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_subjects_table(pool).await?;
    create_cases_table(pool).await?;
    create_artifacts_table(pool).await?;
    create_labels_table(pool).await?;
    create_model_runs_table(pool).await?;
    create_reviewers_table(pool).await?;
    create_predictions_table(pool).await?;
    create_annotations_table(pool).await?;
    Ok(())
}

pub async fn create_subjects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subjects (
            id INTEGER PRIMARY KEY,
            external_id TEXT,
            birth_year INTEGER,
            sex TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_cases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY,
            subject_id INTEGER NOT NULL REFERENCES subjects(id),
            taken_at TEXT NOT NULL,
            reason TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cases_subject ON cases(subject_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Artifacts carry the raw image bytes; `reviewed_at IS NULL` means pending
pub async fn create_artifacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id INTEGER PRIMARY KEY,
            case_id INTEGER NOT NULL REFERENCES cases(id),
            filename TEXT NOT NULL,
            content BLOB NOT NULL,
            content_type TEXT NOT NULL,
            view_position TEXT,
            follow_up INTEGER NOT NULL DEFAULT 0,
            reviewed_at TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_case ON artifacts(case_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_reviewed_at ON artifacts(reviewed_at)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_labels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS labels (
            id INTEGER PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_model_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_runs (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            artifact_path TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_reviewers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviewers (
            guid TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// At most one prediction per (artifact, model run, label)
pub async fn create_predictions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY,
            artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
            model_run_id INTEGER NOT NULL REFERENCES model_runs(id),
            label_id INTEGER NOT NULL REFERENCES labels(id),
            probability REAL NOT NULL CHECK (probability >= 0.0 AND probability <= 1.0),
            decision INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (artifact_id, model_run_id, label_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// At most one annotation per (artifact, model run, label, reviewer)
pub async fn create_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotations (
            id INTEGER PRIMARY KEY,
            artifact_id INTEGER NOT NULL REFERENCES artifacts(id),
            model_run_id INTEGER NOT NULL REFERENCES model_runs(id),
            label_id INTEGER NOT NULL REFERENCES labels(id),
            reviewer_id TEXT NOT NULL REFERENCES reviewers(guid),
            is_present INTEGER NOT NULL,
            comment TEXT,
            labeled_at TEXT NOT NULL,
            UNIQUE (artifact_id, model_run_id, label_id, reviewer_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_annotations_artifact ON annotations(artifact_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Insert catalog labels that are not present yet
pub async fn seed_labels(pool: &SqlitePool) -> Result<()> {
    let mut inserted = 0u64;
    for label in LabelCatalog::all() {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO labels (code, display_name, description) VALUES (?, ?, ?)",
        )
        .bind(label.code)
        .bind(label.display_name)
        .bind(label.description)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    if inserted > 0 {
        info!(inserted, "Label catalog seeded");
    }
    Ok(())
}
