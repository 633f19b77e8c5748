use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

use crate::schema::sql_types::JobStatus as JobStatusSql;
use crate::store::StoreError;

/// Branch recorded on a job when the submitter does not name one.
pub const DEFAULT_BRANCH: &str = "main";

// JobStatus enum
/// Lifecycle state of an ingestion job.
///
/// Transitions only move forward: Pending -> Processing -> {Completed, Failed}.
/// A Pending job may also fail directly when its execution never got started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = JobStatusSql)]
pub enum JobStatus {
    /// Job row created, execution scheduled
    Pending,
    /// Execution claimed the job: fetching, walking or persisting
    Processing,
    /// All nodes persisted and summary recorded
    Completed,
    /// Some stage failed, error_message holds the cause
    Failed,
}

impl JobStatus {
    /// Statuses of jobs whose execution has not finished.
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Processing];

    /// True if job's status is Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Pending | Self::Processing => false,
            Self::Completed | Self::Failed => true,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// True if moving from `self` to `next` is a forward step of the state machine.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "Pending",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

impl ToSql<JobStatusSql, Pg> for JobStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_db_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<JobStatusSql, Pg> for JobStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"pending" => Ok(JobStatus::Pending),
            b"processing" => Ok(JobStatus::Processing),
            b"completed" => Ok(JobStatus::Completed),
            b"failed" => Ok(JobStatus::Failed),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

/// Aggregate counts computed once a job's nodes are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total_nodes: u64,
    pub total_directories: u64,
    pub total_files: u64,
    pub max_depth: i32,
    pub repo_name: String,
    /// Entries the walker could not read and left out.
    pub skipped_entries: u64,
    pub processed_at: DateTime<Utc>,
}

impl JobSummary {
    pub fn from_nodes(nodes: &[Node], repo_name: &str, skipped_entries: u64) -> Self {
        let total_directories = nodes.iter().filter(|n| n.is_directory).count() as u64;
        let total_nodes = nodes.len() as u64;
        JobSummary {
            total_nodes,
            total_directories,
            total_files: total_nodes - total_directories,
            max_depth: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
            repo_name: repo_name.to_string(),
            skipped_entries,
            processed_at: Utc::now(),
        }
    }
}

// jobs table model (database representation)
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JobRecord {
    pub id: Uuid,
    pub source_url: String,
    pub display_name: String,
    pub branch: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    /// JSON-serialized [`JobSummary`]
    pub summary: Option<String>,
}

/// Input for creating a job; the store mints the id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub source_url: String,
    pub display_name: String,
    pub branch: String,
}

/// One ingestion request and its lifecycle state, with the summary parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source_url: String,
    pub display_name: String,
    pub branch: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub summary: Option<JobSummary>,
}

impl Job {
    /// A freshly minted Pending job.
    pub fn pending(new_job: NewJob) -> Self {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            source_url: new_job.source_url,
            display_name: new_job.display_name,
            branch: new_job.branch,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            error_message: None,
            summary: None,
        }
    }

    /// Convert to the database representation, serializing the summary.
    pub fn to_record(&self) -> Result<JobRecord, serde_json::Error> {
        let summary = self.summary.as_ref().map(serde_json::to_string).transpose()?;
        Ok(JobRecord {
            id: self.id,
            source_url: self.source_url.clone(),
            display_name: self.display_name.clone(),
            branch: self.branch.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            error_message: self.error_message.clone(),
            summary,
        })
    }
}

impl TryFrom<JobRecord> for Job {
    type Error = serde_json::Error;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        let summary = record.summary.as_deref().map(serde_json::from_str).transpose()?;
        Ok(Job {
            id: record.id,
            source_url: record.source_url,
            display_name: record.display_name,
            branch: record.branch,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            error_message: record.error_message,
            summary,
        })
    }
}

// nodes table model
/// One file or directory found while walking a job's workspace.
///
/// `relative_path` uses forward slashes and is unique within the job.
/// `parent_id` is `None` only for top-level entries and otherwise names a directory node of the same job.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::nodes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Node {
    pub id: Uuid,
    pub job_id: Uuid,
    pub relative_path: String,
    pub name: String,
    pub extension: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_directory: bool,
    pub depth: i32,
    pub size_bytes: i64,
}

/// A node of the flat result, with its link into the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermalinkedNode {
    #[serde(flatten)]
    pub node: Node,
    pub permalink: String,
}

/// A node of the reconstructed hierarchy.
///
/// `children` is present (possibly empty) for directories and absent for files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// `None` only for the synthetic root.
    pub id: Option<Uuid>,
    pub name: String,
    pub path: String,
    pub extension: Option<String>,
    pub is_directory: bool,
    pub size: i64,
    pub depth: i32,
    pub permalink: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
    pub fn children(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or_default()
    }
}

// API Payload Types

/// Input payload for POST /process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub source_url: Option<String>,
    pub display_name: Option<String>,
    pub branch: Option<String>,
}

/// Response payload for POST /process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub source_url: String,
    pub display_name: String,
    pub status: JobStatus,
    pub status_url: String,
}

/// Query string for GET /result/{job_id}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultQuery {
    pub format: Option<String>,
}

/// Shape of the nodes returned by GET /result/{job_id}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    #[default]
    Flat,
    Hierarchical,
}

impl std::str::FromStr for ResultFormat {
    type Err = ResultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(ResultFormat::Flat),
            "hierarchical" => Ok(ResultFormat::Hierarchical),
            other => Err(ResultError::InvalidFormat(other.to_string())),
        }
    }
}

/// Response payload for GET /result/{job_id}
///
/// Exactly one of `nodes` (flat) or `hierarchy` (hierarchical) is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub job_id: Uuid,
    pub source_url: String,
    pub display_name: String,
    pub branch: String,
    pub status: JobStatus,
    pub summary: Option<JobSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<PermalinkedNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<TreeNode>,
}

/// Response payload for GET /jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
}

/// Response payload for DELETE /job/{job_id}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub job_id: Uuid,
}

/// Response payload for GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub active_jobs: i64,
}

// API Error Types

/// Error for POST /process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum SubmitError {
    /// Missing or disallowed source URL
    #[serde(rename = "validation")]
    Validation(String),
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for GET /status/{job_id} and DELETE /job/{job_id}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum JobError {
    /// The provided job_id is not a valid UUID
    #[serde(rename = "invalid_id")]
    InvalidId,
    /// The job_id was not found in the database
    #[serde(rename = "unknown_id")]
    UnknownId,
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for GET /result/{job_id}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ResultError {
    /// The provided job_id is not a valid UUID
    #[serde(rename = "invalid_id")]
    InvalidId,
    /// The job_id was not found in the database
    #[serde(rename = "unknown_id")]
    UnknownId,
    /// `format` is neither flat nor hierarchical
    #[serde(rename = "invalid_format")]
    InvalidFormat(String),
    /// The job has not reached Completed
    #[serde(rename = "not_completed")]
    NotCompleted { status: JobStatus },
    /// Persisted nodes do not form a tree
    #[serde(rename = "corrupt_hierarchy")]
    CorruptHierarchy(String),
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

/// Error for GET /jobs and GET /health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details")]
pub enum ListError {
    /// Unknown error occurred
    #[serde(rename = "unknown")]
    Unknown(String),
}

macro_rules! from_store_error {
    ($err_type:tt) => {
        /// Converts a `StoreError::JobNotFound` into an `$err_type::UnknownId`
        /// otherwise it's a `$err_type::Unknown(StoreError)`.
        impl From<StoreError> for $err_type {
            fn from(e: StoreError) -> Self {
                match e {
                    StoreError::JobNotFound(_) => $err_type::UnknownId,
                    _ => $err_type::Unknown(e.to_string()),
                }
            }
        }
    };
}

// SubmitError

impl IntoResponse for SubmitError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            SubmitError::Validation(_) => StatusCode::BAD_REQUEST,
            SubmitError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

// JobError

impl IntoResponse for JobError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            JobError::InvalidId => StatusCode::BAD_REQUEST,
            JobError::UnknownId => StatusCode::NOT_FOUND,
            JobError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

from_store_error!(JobError);

// ResultError

impl IntoResponse for ResultError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            ResultError::InvalidId | ResultError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            ResultError::UnknownId => StatusCode::NOT_FOUND,
            ResultError::NotCompleted { .. } => StatusCode::CONFLICT,
            ResultError::CorruptHierarchy(_) | ResultError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

from_store_error!(ResultError);

// ListError

impl IntoResponse for ListError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

impl From<StoreError> for ListError {
    fn from(e: StoreError) -> Self {
        ListError::Unknown(e.to_string())
    }
}
