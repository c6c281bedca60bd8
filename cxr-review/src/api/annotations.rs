//! Annotation submission

use axum::{
    extract::{Path, State},
    routing::put,
    Json, Router,
};
use serde::Deserialize;

use crate::services::annotation_service::{
    AnnotationOutcome, AnnotationSubmission, ReviewerIdentity,
};
use crate::{ApiError, ApiResult, AppState};

/// Body of PUT /artifacts/:id/annotations
///
/// The reviewer defaults to the configured identity when omitted.
#[derive(Debug, Deserialize)]
pub struct AnnotationRequest {
    #[serde(flatten)]
    pub submission: AnnotationSubmission,
    pub reviewer_email: Option<String>,
    pub reviewer_name: Option<String>,
}

/// PUT /artifacts/:id/annotations
pub async fn put_annotations(
    State(state): State<AppState>,
    Path(artifact_id): Path<i64>,
    Json(request): Json<AnnotationRequest>,
) -> ApiResult<Json<AnnotationOutcome>> {
    let default = &state.settings.reviewer;
    let reviewer = match request.reviewer_email {
        Some(email) if email.trim().is_empty() => {
            return Err(ApiError::BadRequest("reviewer_email must not be empty".to_string()));
        }
        Some(email) => ReviewerIdentity {
            full_name: request.reviewer_name.unwrap_or_else(|| email.clone()),
            email,
        },
        None => default.clone(),
    };

    let outcome = state
        .annotations
        .submit(artifact_id, &reviewer, &request.submission)
        .await?;
    Ok(Json(outcome))
}

pub fn annotation_routes() -> Router<AppState> {
    Router::new()
        .route("/artifacts/:id/annotations", put(put_annotations))
}
