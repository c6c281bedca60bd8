//! Subject worklist, subject detail, case upload and image download

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::services::ingest::{CreatedCase, UploadOptions};
use crate::services::read_models::{self, SubjectDetail, SubjectSummary};
use crate::{ApiResult, AppState};

/// GET /subjects
pub async fn list_subjects(State(state): State<AppState>) -> ApiResult<Json<Vec<SubjectSummary>>> {
    Ok(Json(read_models::list_subjects(&state.db).await?))
}

/// GET /subjects/:id
pub async fn get_subject(
    State(state): State<AppState>,
    Path(subject_id): Path<i64>,
) -> ApiResult<Json<SubjectDetail>> {
    Ok(Json(read_models::subject_detail(&state.db, subject_id).await?))
}

/// Query parameters of a case upload; the body is the raw image
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    pub reason: Option<String>,
    pub view_position: Option<String>,
    pub taken_at: Option<DateTime<Utc>>,
    pub threshold: Option<f64>,
}

/// POST /subjects/:id/cases
pub async fn create_case(
    State(state): State<AppState>,
    Path(subject_id): Path<i64>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<Json<CreatedCase>> {
    let threshold = query.threshold.unwrap_or(state.settings.threshold);
    let options = UploadOptions {
        filename: query.filename.unwrap_or_else(|| "upload".to_string()),
        taken_at: query.taken_at,
        reason: query.reason,
        view_position: query.view_position,
    };

    let created = state
        .ingest
        .create_case_with_image(subject_id, &body, options, threshold)
        .await?;
    Ok(Json(created))
}

/// GET /artifacts/:id/image
pub async fn get_artifact_image(
    State(state): State<AppState>,
    Path(artifact_id): Path<i64>,
) -> ApiResult<Response> {
    let (bytes, content_type) = read_models::artifact_image(&state.db, artifact_id).await?;
    let headers = [(header::CONTENT_TYPE, content_type)];
    Ok((headers, bytes).into_response())
}

pub fn subject_routes() -> Router<AppState> {
    Router::new()
        .route("/subjects", get(list_subjects))
        .route("/subjects/:id", get(get_subject))
        .route("/subjects/:id/cases", post(create_case))
        .route("/artifacts/:id/image", get(get_artifact_image))
}
