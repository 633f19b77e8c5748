use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

use data_model_cbv::models::{HealthResponse, ListError};

use crate::routes::AppState;

// GET /health - Liveness plus the number of jobs still Pending or Processing
pub async fn get_health(State(state): State<AppState>) -> Result<impl IntoResponse, ListError> {
    let active_jobs = state.store().count_active_jobs().await?;
    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            active_jobs,
        }),
    ))
}
