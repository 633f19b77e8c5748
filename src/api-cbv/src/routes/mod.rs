use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use data_model_cbv::store::JobStore;
use worker_cbv::JobCoordinator;

pub mod health;
pub mod jobs;
pub mod logging_middleware;

/// Shared handler state: the coordinator and the store it writes to.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: JobCoordinator,
}

impl AppState {
    pub fn new(coordinator: JobCoordinator) -> Self {
        AppState { coordinator }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        self.coordinator.store()
    }
}

//
// Router
//

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::get_health))
        .route("/process", post(jobs::post_process))
        .route("/status/{job_id}", get(jobs::get_status))
        .route("/result/{job_id}", get(jobs::get_result))
        .route("/jobs", get(jobs::get_jobs))
        .route("/job/{job_id}", delete(jobs::delete_job))
        // Custom route access logging
        .layer(middleware::from_fn(logging_middleware::log_route_access))
        // Tracing middleware
        .layer(TraceLayer::new_for_http())
}
