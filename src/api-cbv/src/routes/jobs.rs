use axum::{
    extract::{Json, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use core_cbv::{attach_permalinks, build_hierarchy};
use data_model_cbv::models::{
    DeleteResponse, Job, JobError, JobListResponse, JobStatus, ListError, ResultError, ResultFormat, ResultQuery,
    ResultResponse, SubmitError, SubmitPayload, SubmitResponse,
};
use worker_cbv::{Error as WorkerError, SubmitRequest};

use crate::routes::AppState;

fn submit_error(error: WorkerError) -> SubmitError {
    match error {
        WorkerError::Validation(e) => SubmitError::Validation(e.to_string()),
        other => {
            tracing::error!("Submission failed: {}", other);
            SubmitError::Unknown(other.to_string())
        }
    }
}

// POST /process - Validate a source URL and schedule its ingestion
pub async fn post_process(
    State(state): State<AppState>,
    payload: Result<Json<SubmitPayload>, JsonRejection>,
) -> Result<impl IntoResponse, SubmitError> {
    let Json(payload) = payload.map_err(|rejection| SubmitError::Validation(rejection.body_text()))?;
    let source_url = payload
        .source_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| SubmitError::Validation("source_url is required".to_string()))?;

    let submitted = state
        .coordinator
        .submit(SubmitRequest {
            source_url,
            display_name: payload.display_name,
            branch: payload.branch,
        })
        .await
        .map_err(submit_error)?;
    let job = submitted.job;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            status_url: format!("/status/{}", job.id),
            source_url: job.source_url,
            display_name: job.display_name,
            status: job.status,
        }),
    ))
}

async fn find_job(state: &AppState, job_id: &str) -> Result<Job, JobError> {
    let job_id = Uuid::parse_str(job_id).map_err(|_| JobError::InvalidId)?;
    state.store().get_job(job_id).await?.ok_or(JobError::UnknownId)
}

// GET /status/{job_id} - Full job record
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, JobError> {
    let job = find_job(&state, &job_id).await?;
    Ok((StatusCode::OK, Json(job)))
}

// GET /result/{job_id}?format=flat|hierarchical - Nodes of a Completed job
pub async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> Result<impl IntoResponse, ResultError> {
    let job_id = Uuid::parse_str(&job_id).map_err(|_| ResultError::InvalidId)?;
    let format = match query.format.as_deref() {
        Some(format) => format.parse::<ResultFormat>()?,
        None => ResultFormat::default(),
    };

    let job = state.store().get_job(job_id).await?.ok_or(ResultError::UnknownId)?;
    if job.status != JobStatus::Completed {
        return Err(ResultError::NotCompleted { status: job.status });
    }

    let nodes = state.store().list_nodes(job.id).await?;
    let (nodes, hierarchy) = match format {
        ResultFormat::Flat => (Some(attach_permalinks(nodes, &job.source_url, &job.branch)), None),
        ResultFormat::Hierarchical => {
            let tree = build_hierarchy(&nodes, &job.source_url, &job.branch).map_err(|e| {
                tracing::error!("[job: {}] Stored nodes do not form a tree: {}", job.id, e);
                ResultError::CorruptHierarchy(e.to_string())
            })?;
            (None, Some(tree))
        }
    };

    Ok((
        StatusCode::OK,
        Json(ResultResponse {
            job_id: job.id,
            source_url: job.source_url,
            display_name: job.display_name,
            branch: job.branch,
            status: job.status,
            summary: job.summary,
            nodes,
            hierarchy,
        }),
    ))
}

// GET /jobs - All jobs, newest first
pub async fn get_jobs(State(state): State<AppState>) -> Result<impl IntoResponse, ListError> {
    let jobs = state.store().list_jobs().await?;
    Ok((
        StatusCode::OK,
        Json(JobListResponse {
            total: jobs.len(),
            jobs,
        }),
    ))
}

// DELETE /job/{job_id} - Remove a job together with its nodes
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, JobError> {
    let job_id = Uuid::parse_str(&job_id).map_err(|_| JobError::InvalidId)?;
    state.store().delete_job_cascade(job_id).await?;
    tracing::info!("[job: {}] Deleted", job_id);

    Ok((
        StatusCode::OK,
        Json(DeleteResponse {
            message: "Job deleted".to_string(),
            job_id,
        }),
    ))
}
