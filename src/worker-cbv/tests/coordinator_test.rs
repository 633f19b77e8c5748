//! Tests for the job coordinator
//!
//! Runs whole pipelines against the in-memory store with the mock fetcher:
//! - submission and validation
//! - the Pending -> Processing -> {Completed, Failed} lifecycle
//! - workspace cleanup on every exit path
//! - crash recovery

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use core_cbv::fetch::mock::MockFetcher;
use core_cbv::{SourceFetcher, ValidationError};
use data_model_cbv::models::JobStatus;
use data_model_cbv::store::{JobStore, MemoryJobStore};
use data_model_cbv::test_helpers::{create_completed_test_job, create_test_job};
use worker_cbv::{CoordinatorSettings, Error, INTERRUPTED_MESSAGE, JobCoordinator, SubmitRequest};
use uuid::Uuid;

const HELLO_WORLD: &str = "https://github.com/octocat/Hello-World";

fn settings(root: &Path, max_concurrency: usize) -> CoordinatorSettings {
    CoordinatorSettings {
        workspace_root: root.to_path_buf(),
        allowed_hosts: vec!["github.com".to_string()],
        max_concurrency,
    }
}

/// Helper to build a coordinator over a fresh in-memory store
fn coordinator(fetcher: Arc<MockFetcher>, root: &Path) -> (JobCoordinator, Arc<MemoryJobStore>) {
    let store = Arc::new(MemoryJobStore::new());
    let coordinator = JobCoordinator::new(
        store.clone() as Arc<dyn JobStore>,
        fetcher as Arc<dyn SourceFetcher>,
        settings(root, 16),
    );
    (coordinator, store)
}

fn request(url: &str) -> SubmitRequest {
    SubmitRequest {
        source_url: url.to_string(),
        ..Default::default()
    }
}

//
// Successful pipelines
//

#[tokio::test]
async fn test_two_top_level_files() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![("README", "Hello World!\n"), ("LICENSE", "MIT")]));
    let (coordinator, store) = coordinator(fetcher.clone(), root.path());

    let submitted = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    assert_eq!(submitted.job.status, JobStatus::Pending);
    assert_eq!(submitted.job.display_name, "Hello-World");
    assert_eq!(submitted.job.branch, "main");

    let job_id = submitted.job.id;
    submitted.execution.await.unwrap();

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_message.is_none());
    let summary = job.summary.unwrap();
    assert_eq!(summary.total_nodes, 2);
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.total_directories, 0);
    assert_eq!(summary.max_depth, 0);
    assert_eq!(summary.repo_name, "Hello-World");

    let nodes = store.list_nodes(job_id).await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.iter().all(|n| n.depth == 0 && n.parent_id.is_none()));
    assert_eq!(nodes.iter().find(|n| n.name == "README").unwrap().size_bytes, 13);

    // the branch is left to the remote default
    assert_eq!(fetcher.branches(), vec![None]);
    for workspace in fetcher.workspaces() {
        assert!(!workspace.exists(), "workspace {} must be removed", workspace.display());
    }
}

#[tokio::test]
async fn test_nested_tree_skips_hidden_and_ignored_entries() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![
        (".env", "SECRET=1"),
        ("node_modules/left-pad/index.js", "module.exports = 1"),
        ("src/lib.rs", "pub fn f() {}"),
        ("src/bin/main.rs", "fn main() {}"),
        ("src/__pycache__/x.pyc", ""),
        ("docs/", ""),
    ]));
    let (coordinator, store) = coordinator(fetcher, root.path());

    let submitted = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    let job_id = submitted.job.id;
    submitted.execution.await.unwrap();

    let nodes = store.list_nodes(job_id).await.unwrap();
    let paths: Vec<&str> = nodes.iter().map(|n| n.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["docs", "src", "src/bin", "src/bin/main.rs", "src/lib.rs"]);

    let summary = store.get_job(job_id).await.unwrap().unwrap().summary.unwrap();
    assert_eq!(summary.total_directories, 3);
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.max_depth, 2);
}

#[tokio::test]
async fn test_explicit_branch_and_display_name() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![("a.txt", "a")]));
    let (coordinator, store) = coordinator(fetcher.clone(), root.path());

    let submitted = coordinator
        .submit(SubmitRequest {
            source_url: "https://github.com/octocat/Hello-World.git".to_string(),
            display_name: Some("  Greeting  ".to_string()),
            branch: Some("dev".to_string()),
        })
        .await
        .unwrap();
    let job_id = submitted.job.id;
    submitted.execution.await.unwrap();

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.display_name, "Greeting");
    assert_eq!(job.branch, "dev");
    assert_eq!(job.summary.unwrap().repo_name, "Hello-World");
    assert_eq!(fetcher.branches(), vec![Some("dev".to_string())]);
}

#[tokio::test]
async fn test_every_submit_mints_a_new_job() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![("a.txt", "a")]));
    let (coordinator, store) = coordinator(fetcher, root.path());

    let first = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    let second = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    assert_ne!(first.job.id, second.job.id);

    first.execution.await.unwrap();
    second.execution.await.unwrap();
    assert_eq!(store.list_jobs().await.unwrap().len(), 2);
    assert_eq!(store.count_active_jobs().await.unwrap(), 0);
}

//
// Validation
//

#[tokio::test]
async fn test_invalid_url_creates_no_job() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![]));
    let (coordinator, store) = coordinator(fetcher.clone(), root.path());

    for url in ["not-a-url", "", "https://gitlab.com/octocat/Hello-World", "https://github.com/octocat"] {
        let result = coordinator.submit(request(url)).await;
        assert!(matches!(result, Err(Error::Validation(_))), "{url:?} must be rejected");
    }

    assert!(store.list_jobs().await.unwrap().is_empty());
    assert!(fetcher.workspaces().is_empty());
}

#[tokio::test]
async fn test_invalid_branch_creates_no_job() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![]));
    let (coordinator, store) = coordinator(fetcher, root.path());

    let result = coordinator
        .submit(SubmitRequest {
            source_url: HELLO_WORLD.to_string(),
            display_name: None,
            branch: Some("--upload-pack=touch /tmp/x".to_string()),
        })
        .await;
    assert!(matches!(result, Err(Error::Validation(ValidationError::Branch(_)))));
    assert!(store.list_jobs().await.unwrap().is_empty());
}

//
// Failures
//

#[tokio::test]
async fn test_fetch_failure_marks_job_failed() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_failure("remote hung up unexpectedly"));
    let (coordinator, store) = coordinator(fetcher.clone(), root.path());

    let submitted = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    let job_id = submitted.job.id;
    submitted.execution.await.unwrap();

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("remote hung up unexpectedly"));
    assert!(job.summary.is_none());
    assert!(store.list_nodes(job_id).await.unwrap().is_empty());

    let workspaces = fetcher.workspaces();
    assert_eq!(workspaces.len(), 1);
    assert!(!workspaces[0].exists());
}

#[tokio::test]
async fn test_panicking_stage_marks_job_failed() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_panic("fetcher exploded"));
    let (coordinator, store) = coordinator(fetcher.clone(), root.path());

    let submitted = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    let job_id = submitted.job.id;
    // the panic is contained, so the task itself completes normally
    submitted.execution.await.unwrap();

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error_message.unwrap().contains("fetcher exploded"));
    assert!(!fetcher.workspaces()[0].exists());
}

#[tokio::test]
async fn test_deleted_job_does_not_resurrect() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![("a.txt", "a")]).with_delay(Duration::from_millis(200)));
    let (coordinator, store) = coordinator(fetcher, root.path());

    let submitted = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    let job_id = submitted.job.id;
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.delete_job_cascade(job_id).await.unwrap();

    submitted.execution.await.unwrap();
    assert!(store.get_job(job_id).await.unwrap().is_none());
    assert!(store.list_nodes(job_id).await.unwrap().is_empty());
}

//
// Concurrency
//

#[tokio::test]
async fn test_concurrent_jobs_are_isolated() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        MockFetcher::with_files(vec![("README.md", "hi"), ("src/main.rs", "fn main() {}")])
            .with_delay(Duration::from_millis(50)),
    );
    let (coordinator, store) = coordinator(fetcher.clone(), root.path());

    let mut submitted = Vec::new();
    for _ in 0..8 {
        submitted.push(coordinator.submit(request(HELLO_WORLD)).await.unwrap());
    }
    let ids: Vec<_> = submitted.iter().map(|s| s.job.id).collect();
    for s in submitted {
        s.execution.await.unwrap();
    }

    for id in ids {
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let nodes = store.list_nodes(id).await.unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|n| n.job_id == id));
    }

    let mut workspaces = fetcher.workspaces();
    workspaces.sort();
    workspaces.dedup();
    assert_eq!(workspaces.len(), 8);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_jobs_beyond_max_concurrency_wait_in_pending() {
    let root = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(MockFetcher::with_files(vec![("a.txt", "a")]).with_delay(Duration::from_millis(400)));
    let store = Arc::new(MemoryJobStore::new());
    let coordinator = JobCoordinator::new(
        store.clone() as Arc<dyn JobStore>,
        fetcher as Arc<dyn SourceFetcher>,
        settings(root.path(), 1),
    );

    let first = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    let second = coordinator.submit(request(HELLO_WORLD)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let statuses = [
        store.get_job(first.job.id).await.unwrap().unwrap().status,
        store.get_job(second.job.id).await.unwrap().unwrap().status,
    ];
    assert!(statuses.contains(&JobStatus::Processing));
    assert!(statuses.contains(&JobStatus::Pending));
    assert_eq!(store.count_active_jobs().await.unwrap(), 2);

    first.execution.await.unwrap();
    second.execution.await.unwrap();
    assert_eq!(store.count_active_jobs().await.unwrap(), 0);
}

//
// Recovery
//

#[tokio::test]
async fn test_recover_fails_interrupted_jobs_and_sweeps_workspaces() {
    let root = tempfile::tempdir().unwrap();
    let stale = root.path().join(Uuid::new_v4().to_string());
    std::fs::create_dir_all(stale.join("checkout")).unwrap();
    std::fs::create_dir_all(root.path().join("operator-notes")).unwrap();

    let fetcher = Arc::new(MockFetcher::with_files(vec![]));
    let (coordinator, store) = coordinator(fetcher, root.path());

    let pending = create_test_job(&*store, "https://github.com/o/pending", JobStatus::Pending).await;
    let processing = create_test_job(&*store, "https://github.com/o/processing", JobStatus::Processing).await;
    let (completed, _) = create_completed_test_job(&*store, "https://github.com/o/completed").await;

    let report = coordinator.recover().await.unwrap();
    assert_eq!(report.workspaces_removed, 1);
    assert_eq!(report.jobs_failed, 2);
    assert!(!stale.exists());
    assert!(root.path().join("operator-notes").is_dir());

    for id in [pending.id, processing.id] {
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    }
    let completed = store.get_job(completed.id).await.unwrap().unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(store.count_active_jobs().await.unwrap(), 0);
}
