//! Inference endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::inference::InferenceResult;
use crate::services::ingest::ScoredArtifact;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub threshold: Option<f64>,
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub filename: Option<String>,
    pub predictions: InferenceResult,
}

/// POST /predict
///
/// Scores the raw request body; nothing is stored.
pub async fn predict(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
    body: Bytes,
) -> ApiResult<Json<PredictResponse>> {
    let threshold = query.threshold.unwrap_or(state.settings.threshold);
    let predictions = state.ingest.predict_upload(&body, threshold).await?;
    Ok(Json(PredictResponse {
        filename: query.filename,
        predictions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScoreQuery {
    pub threshold: Option<f64>,
    pub model_run: Option<String>,
}

/// POST /artifacts/:id/predictions
pub async fn score_artifact(
    State(state): State<AppState>,
    Path(artifact_id): Path<i64>,
    Query(query): Query<ScoreQuery>,
) -> ApiResult<Json<ScoredArtifact>> {
    let threshold = query.threshold.unwrap_or(state.settings.threshold);
    let scored = state
        .ingest
        .score_artifact(artifact_id, threshold, query.model_run.as_deref())
        .await?;
    Ok(Json(scored))
}

pub fn prediction_routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        .route("/artifacts/:id/predictions", post(score_artifact))
}
