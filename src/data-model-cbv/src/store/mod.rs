//! Durable record of jobs and their nodes.
//!
//! [`JobStore`] is the single source of truth shared by concurrent job executions and the API.
//! [`pg::PgJobStore`] is the production implementation; [`memory::MemoryJobStore`] keeps the same
//! contract in process memory for tests and local one-off runs.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::models::{Job, JobStatus, JobSummary, NewJob, Node};

pub use memory::MemoryJobStore;
pub use pg::PgJobStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),
    #[error("Database error: {0}")]
    Database(diesel::result::Error),
    #[error("Database pool error: {0}")]
    Pool(String),
    #[error("Stored job summary is not valid JSON: {0}")]
    Summary(#[from] serde_json::Error),
    /// A write violated a key or uniqueness constraint
    #[error("Conflicting write: {0}")]
    Conflict(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                Self::Conflict(info.message().to_string())
            }
            other => Self::Database(other),
        }
    }
}

// PoolError
impl<E: std::fmt::Debug> From<deadpool::managed::PoolError<E>> for StoreError {
    fn from(error: deadpool::managed::PoolError<E>) -> Self {
        Self::Pool(format!("{:?}", error))
    }
}

/// Storage operations for jobs and nodes.
///
/// Every method is safe to call concurrently from independent job executions.
/// A node batch becomes visible to readers only once `insert_nodes` has returned.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new Pending job.
    async fn create_job(&self, new_job: NewJob) -> Result<Job, StoreError>;

    /// Overwrites status, error message and summary and bumps `updated_at`.
    ///
    /// Last write wins: concurrent calls for one job are not merged.
    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        summary: Option<JobSummary>,
    ) -> Result<(), StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// All jobs, newest first.
    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;

    /// Jobs that are Pending or Processing, newest first.
    async fn list_active_jobs(&self) -> Result<Vec<Job>, StoreError>;

    async fn count_active_jobs(&self) -> Result<i64, StoreError>;

    /// Inserts the batch all-or-nothing.
    async fn insert_nodes(&self, batch: &[Node]) -> Result<(), StoreError>;

    /// The job's nodes ordered by `relative_path` (byte order).
    async fn list_nodes(&self, job_id: Uuid) -> Result<Vec<Node>, StoreError>;

    /// Removes the job and all of its nodes together, or nothing at all.
    async fn delete_job_cascade(&self, id: Uuid) -> Result<(), StoreError>;
}
