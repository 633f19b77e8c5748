use core_cbv::ValidationError;
use data_model_cbv::models::JobStatus;
use data_model_cbv::store::StoreError;
use tokio::sync::AcquireError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected at submission; no job was created.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A fetch, walk or workspace stage failed.
    #[error("{0}")]
    Pipeline(#[from] core_cbv::Error),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition { job_id: Uuid, from: JobStatus, to: JobStatus },

    #[error("Pipeline panicked: {0}")]
    Panicked(String),

    #[error("Failed to acquire semaphore permit: {0}")]
    SemaphorePermitError(#[from] AcquireError),
}

impl From<core_cbv::WorkspaceError> for Error {
    fn from(error: core_cbv::WorkspaceError) -> Self {
        Self::Pipeline(error.into())
    }
}

impl From<core_cbv::FetchError> for Error {
    fn from(error: core_cbv::FetchError) -> Self {
        Self::Pipeline(error.into())
    }
}

impl From<core_cbv::WalkError> for Error {
    fn from(error: core_cbv::WalkError) -> Self {
        Self::Pipeline(error.into())
    }
}
