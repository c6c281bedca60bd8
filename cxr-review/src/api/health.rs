//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database does not answer
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: bool,
    /// Wired scorer names (multi-label, binary)
    pub scorers: [String; 2],
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let database = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let (multilabel, binary) = state.inference.scorer_names();

    Json(HealthResponse {
        status: (if database { "ok" } else { "degraded" }).to_string(),
        module: "cxr-review".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        database,
        scorers: [multilabel.to_string(), binary.to_string()],
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
