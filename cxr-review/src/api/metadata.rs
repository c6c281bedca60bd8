//! Label and model-run listings

use axum::{extract::State, routing::get, Json, Router};

use crate::db::labels::list_labels;
use crate::db::model_runs::list_model_runs;
use crate::db::{Label, ModelRun};
use crate::{ApiResult, AppState};

/// GET /labels
pub async fn get_labels(State(state): State<AppState>) -> ApiResult<Json<Vec<Label>>> {
    Ok(Json(list_labels(&state.db).await?))
}

/// GET /model-runs
pub async fn get_model_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<ModelRun>>> {
    Ok(Json(list_model_runs(&state.db).await?))
}

pub fn metadata_routes() -> Router<AppState> {
    Router::new()
        .route("/labels", get(get_labels))
        .route("/model-runs", get(get_model_runs))
}
