//! In-memory job store
//!
//! Holds jobs and nodes behind one `RwLock`, so every operation observes either all or none of
//! another call's writes. Enforces the same key rules as the Postgres schema: nodes must belong to
//! an existing job, paths are unique per job, and a parent must be a directory of the same job.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Job, JobStatus, JobSummary, NewJob, Node};
use crate::store::{JobStore, StoreError};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    nodes: HashMap<Uuid, Vec<Node>>,
}

/// [`JobStore`] kept entirely in process memory.
#[derive(Default)]
pub struct MemoryJobStore {
    state: RwLock<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    jobs
}

impl MemoryState {
    /// Checks the batch against the key rules without mutating anything.
    fn validate_batch(&self, batch: &[Node]) -> Result<(), StoreError> {
        let mut paths: HashMap<Uuid, HashSet<&str>> = HashMap::new();
        let mut directories: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();

        for node in batch {
            if !self.jobs.contains_key(&node.job_id) {
                return Err(StoreError::JobNotFound(node.job_id));
            }
            if !paths.contains_key(&node.job_id) {
                let existing = self.nodes.get(&node.job_id).map(Vec::as_slice).unwrap_or_default();
                paths.insert(node.job_id, existing.iter().map(|n| n.relative_path.as_str()).collect());
                directories.insert(
                    node.job_id,
                    existing.iter().filter(|n| n.is_directory).map(|n| n.id).collect(),
                );
            }
        }

        for node in batch {
            let job_paths = paths.entry(node.job_id).or_default();
            if !job_paths.insert(node.relative_path.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "duplicate relative_path '{}' for job {}",
                    node.relative_path, node.job_id
                )));
            }
            if node.is_directory {
                directories.entry(node.job_id).or_default().insert(node.id);
            }
        }

        for node in batch {
            if let Some(parent_id) = node.parent_id {
                let known = directories.get(&node.job_id).is_some_and(|dirs| dirs.contains(&parent_id));
                if !known {
                    return Err(StoreError::Conflict(format!(
                        "node '{}' references parent {} which is not a directory of job {}",
                        node.relative_path, parent_id, node.job_id
                    )));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let job = Job::pending(new_job);
        let mut state = self.state.write().await;
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        summary: Option<JobSummary>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.status = status;
        job.error_message = error_message;
        job.summary = summary;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let state = self.state.read().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(state.jobs.values().cloned().collect()))
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().await;
        Ok(newest_first(
            state.jobs.values().filter(|job| job.status.is_active()).cloned().collect(),
        ))
    }

    async fn count_active_jobs(&self) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        Ok(state.jobs.values().filter(|job| job.status.is_active()).count() as i64)
    }

    async fn insert_nodes(&self, batch: &[Node]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.validate_batch(batch)?;
        for node in batch {
            state.nodes.entry(node.job_id).or_default().push(node.clone());
        }
        Ok(())
    }

    async fn list_nodes(&self, job_id: Uuid) -> Result<Vec<Node>, StoreError> {
        let state = self.state.read().await;
        let mut found = state.nodes.get(&job_id).cloned().unwrap_or_default();
        found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(found)
    }

    async fn delete_job_cascade(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.jobs.remove(&id).is_none() {
            return Err(StoreError::JobNotFound(id));
        }
        state.nodes.remove(&id);
        Ok(())
    }
}
