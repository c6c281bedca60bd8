//! Common error types for the review workspace

use thiserror::Error;

/// Common result type for review operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the cohort builder and review service
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Seed or manifest (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Subject id does not exist
    #[error("Subject {0} not found")]
    SubjectNotFound(i64),

    /// Artifact (image) id does not exist
    #[error("Artifact {0} not found")]
    ArtifactNotFound(i64),

    /// A scorer could not produce a result; fatal for the call, never retried
    #[error("Model unavailable ({scorer}): {reason}")]
    ModelUnavailable { scorer: String, reason: String },

    /// Annotation referenced a label that matches neither a code nor a display name
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// Image bytes rejected before inference
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error is a UNIQUE constraint violation raised by SQLite
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    /// True when SQLite reported lock contention: `SQLITE_BUSY`,
    /// `SQLITE_BUSY_SNAPSHOT` or `SQLITE_LOCKED`
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("5" | "6" | "517"))
                    || db_err.message().contains("database is locked")
            }
            Error::Database(err) => err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}
