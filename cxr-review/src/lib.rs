//! cxr-review library interface
//!
//! Persistence, dual-model inference and the review workflow behind a thin
//! HTTP surface. The binary in `main.rs` wires configuration and scorers.

pub mod api;
pub mod db;
pub mod error;
pub mod inference;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use cxr_common::config::TomlConfig;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::inference::DualModelInference;
use crate::services::{AnnotationService, IngestService, ReviewerIdentity};

/// Largest accepted upload body
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Request defaults taken from configuration
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub threshold: f64,
    pub model_run: String,
    pub reviewer: ReviewerIdentity,
}

impl ReviewSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            threshold: config.inference.threshold,
            model_run: config.inference.model_run.clone(),
            reviewer: ReviewerIdentity {
                email: config.reviewer.email.clone(),
                full_name: config.reviewer.full_name.clone(),
            },
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub inference: DualModelInference,
    pub ingest: IngestService,
    pub annotations: AnnotationService,
    pub settings: ReviewSettings,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        inference: DualModelInference,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            ingest: IngestService::new(db.clone(), inference.clone(), settings.model_run.clone()),
            annotations: AnnotationService::new(db.clone(), settings.model_run.clone()),
            db,
            inference,
            settings,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::metadata_routes())
        .merge(api::subject_routes())
        .merge(api::prediction_routes())
        .merge(api::annotation_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
