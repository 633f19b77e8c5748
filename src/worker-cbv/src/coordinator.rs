//! The job state machine and its asynchronous pipeline.
//!
//! `submit` validates, records a Pending job and spawns one independent task per job. The task
//! waits for a concurrency permit, then runs fetch -> walk -> persist -> finalize strictly in
//! sequence inside a workspace owned by that task alone. Every failure, panics included, ends in
//! Failed with the cause recorded on the job.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use core_cbv::{RepoUrl, SourceFetcher, Workspace, sweep_workspaces, validate_branch, walk};
use data_model_cbv::models::{DEFAULT_BRANCH, Job, JobStatus, JobSummary, NewJob};
use data_model_cbv::store::{JobStore, StoreError};

use crate::errors::Error;

/// Error message recorded on jobs a previous process left unfinished.
pub const INTERRUPTED_MESSAGE: &str = "interrupted by service restart";

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Parent directory of all job workspaces.
    pub workspace_root: PathBuf,
    /// Hosts accepted in source URLs.
    pub allowed_hosts: Vec<String>,
    /// Pipelines allowed to run at once; further jobs wait in Pending.
    pub max_concurrency: usize,
}

impl CoordinatorSettings {
    /// Reads WORKSPACE_DIR, ALLOWED_SOURCE_HOSTS and WORKER_MAX_CONCURRENCY.
    pub fn from_env() -> Self {
        CoordinatorSettings {
            workspace_root: core_cbv::get_workspace_root(),
            allowed_hosts: core_cbv::get_allowed_source_hosts(),
            max_concurrency: core_cbv::get_max_concurrency(None),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub source_url: String,
    pub display_name: Option<String>,
    pub branch: Option<String>,
}

/// A job that was accepted and scheduled.
#[derive(Debug)]
pub struct SubmittedJob {
    /// The job as created, in Pending.
    pub job: Job,
    /// The job's execution. Dropping the handle detaches it; the job keeps running.
    pub execution: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    pub workspaces_removed: usize,
    pub jobs_failed: usize,
}

/// Owner of the job state machine. Cheap to clone; clones share the store, fetcher and permits.
#[derive(Clone)]
pub struct JobCoordinator {
    store: Arc<dyn JobStore>,
    fetcher: Arc<dyn SourceFetcher>,
    settings: Arc<CoordinatorSettings>,
    permits: Arc<Semaphore>,
}

impl JobCoordinator {
    pub fn new(store: Arc<dyn JobStore>, fetcher: Arc<dyn SourceFetcher>, settings: CoordinatorSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        JobCoordinator {
            store,
            fetcher,
            settings: Arc::new(settings),
            permits,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Validates the request, creates a Pending job and schedules its execution.
    ///
    /// Returns as soon as the job is recorded. Every call mints a new job.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmittedJob, Error> {
        let source = RepoUrl::parse(&request.source_url, &self.settings.allowed_hosts)?;
        let branch = request
            .branch
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .map(validate_branch)
            .transpose()?;
        let display_name = request
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| source.repo_name().to_string());

        let job = self
            .store
            .create_job(NewJob {
                source_url: source.as_str().to_string(),
                display_name,
                branch: branch.clone().unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            })
            .await?;
        tracing::info!("[job: {}] Submitted {} ({})", job.id, job.source_url, job.display_name);

        let execution = tokio::spawn({
            let coordinator = self.clone();
            let job_id = job.id;
            async move { coordinator.execute(job_id, source, branch).await }
        });

        Ok(SubmittedJob { job, execution })
    }

    /// Fails every job a previous process left active and removes leftover workspaces.
    ///
    /// Call once at startup, before the first `submit`.
    pub async fn recover(&self) -> Result<RecoveryReport, Error> {
        let workspaces_removed = sweep_workspaces(&self.settings.workspace_root).await?;

        let interrupted = self.store.list_active_jobs().await?;
        for job in &interrupted {
            self.store
                .update_job_status(job.id, JobStatus::Failed, Some(INTERRUPTED_MESSAGE.to_string()), None)
                .await?;
            tracing::warn!("[job: {}] Marked Failed: {}", job.id, INTERRUPTED_MESSAGE);
        }

        Ok(RecoveryReport {
            workspaces_removed,
            jobs_failed: interrupted.len(),
        })
    }

    /// Runs one job to a terminal state. Never returns an error or unwinds.
    async fn execute(&self, job_id: Uuid, source: RepoUrl, branch: Option<String>) {
        let result = match self.permits.clone().acquire_owned().await {
            Ok(_permit) => {
                let pipeline = AssertUnwindSafe(self.run_pipeline(job_id, &source, branch.as_deref()));
                match pipeline.catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(Error::Panicked(panic_message(panic))),
                }
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(summary) => {
                let nodes = summary.total_nodes;
                match self.transition(job_id, JobStatus::Completed, None, Some(summary)).await {
                    Ok(()) => tracing::info!("[job: {}] Completed with {} nodes", job_id, nodes),
                    Err(e) => self.fail(job_id, &e).await,
                }
            }
            Err(e) => self.fail(job_id, &e).await,
        }
    }

    async fn run_pipeline(&self, job_id: Uuid, source: &RepoUrl, branch: Option<&str>) -> Result<JobSummary, Error> {
        self.transition(job_id, JobStatus::Processing, None, None).await?;
        tracing::info!("[job: {}] Processing", job_id);

        let workspace = Workspace::create(&self.settings.workspace_root, job_id).await?;
        let walked = self.fetch_and_walk(job_id, source, branch, &workspace).await;
        if let Err(e) = workspace.release().await {
            tracing::warn!("[job: {}] {}", job_id, e);
        }
        let output = walked?;

        let skipped = output.skipped_count();
        let nodes = output.into_nodes(job_id);
        tracing::debug!("[job: {}] Persisting {} nodes", job_id, nodes.len());
        self.store.insert_nodes(&nodes).await?;

        Ok(JobSummary::from_nodes(&nodes, source.repo_name(), skipped))
    }

    async fn fetch_and_walk(
        &self,
        job_id: Uuid,
        source: &RepoUrl,
        branch: Option<&str>,
        workspace: &Workspace,
    ) -> Result<core_cbv::WalkOutput, Error> {
        let checkout = self.fetcher.fetch(source, branch, workspace).await?;
        tracing::debug!("[job: {}] Fetched into {}", job_id, checkout.display());

        let output = walk(&checkout).await?;
        tracing::debug!(
            "[job: {}] Walked {} entries ({} skipped)",
            job_id,
            output.entries.len(),
            output.skipped_count()
        );
        Ok(output)
    }

    /// Moves the job forward, refusing to leave a terminal state.
    async fn transition(
        &self,
        job_id: Uuid,
        next: JobStatus,
        error_message: Option<String>,
        summary: Option<JobSummary>,
    ) -> Result<(), Error> {
        let current = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?
            .status;
        if !current.can_advance_to(next) {
            return Err(Error::InvalidTransition {
                job_id,
                from: current,
                to: next,
            });
        }
        self.store
            .update_job_status(job_id, next, error_message, summary)
            .await?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, cause: &Error) {
        tracing::error!("[job: {}] Failed: {}", job_id, cause);
        match self
            .transition(job_id, JobStatus::Failed, Some(cause.to_string()), None)
            .await
        {
            Ok(()) => {}
            Err(Error::Persistence(StoreError::JobNotFound(_))) => {
                tracing::warn!("[job: {}] Job was deleted while executing", job_id)
            }
            Err(e) => tracing::error!("[job: {}] Could not record failure: {}", job_id, e),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
