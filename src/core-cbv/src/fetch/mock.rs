//! Mock source fetcher for testing
//!
//! Materializes a configured file set into the workspace instead of cloning,
//! or fails with a configured message, without touching the network.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::fetch::{CHECKOUT_DIR, FetchError, SourceFetcher};
use crate::source_url::RepoUrl;
use crate::workspace::Workspace;

enum Behavior {
    /// Write these `(relative path, content)` entries. A path ending in '/' creates an empty directory.
    Files(Vec<(String, Vec<u8>)>),
    Fail(String),
    Panic(String),
}

/// Mock fetcher for testing
///
/// Records the workspace directory and branch of every call so tests can check cleanup.
pub struct MockFetcher {
    behavior: Behavior,
    delay: Option<Duration>,
    calls: Mutex<Vec<(PathBuf, Option<String>)>>,
}

impl MockFetcher {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that writes the given files
    pub fn with_files(files: Vec<(&str, &str)>) -> Self {
        Self::with_behavior(Behavior::Files(
            files
                .into_iter()
                .map(|(path, content)| (path.to_string(), content.as_bytes().to_vec()))
                .collect(),
        ))
    }

    /// Create a mock that always fails with the given message
    pub fn with_failure(message: &str) -> Self {
        Self::with_behavior(Behavior::Fail(message.to_string()))
    }

    /// Create a mock that panics while fetching
    pub fn with_panic(message: &str) -> Self {
        Self::with_behavior(Behavior::Panic(message.to_string()))
    }

    /// Sleep before doing anything, to keep jobs observable in their active states
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Workspace directories this fetcher was asked to fill, in call order.
    pub fn workspaces(&self) -> Vec<PathBuf> {
        self.lock_calls().iter().map(|(path, _)| path.clone()).collect()
    }

    /// Branches requested by each call, in call order.
    pub fn branches(&self) -> Vec<Option<String>> {
        self.lock_calls().iter().map(|(_, branch)| branch.clone()).collect()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(PathBuf, Option<String>)>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn io_error(error: std::io::Error) -> FetchError {
    FetchError::Other(format!("mock fetcher I/O error: {}", error))
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(
        &self,
        _source: &RepoUrl,
        branch: Option<&str>,
        workspace: &Workspace,
    ) -> Result<PathBuf, FetchError> {
        self.lock_calls()
            .push((workspace.path().to_path_buf(), branch.map(str::to_string)));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let files = match &self.behavior {
            Behavior::Files(files) => files,
            Behavior::Fail(message) => return Err(FetchError::Other(message.clone())),
            Behavior::Panic(message) => panic!("{}", message),
        };

        let destination = workspace.path().join(CHECKOUT_DIR);
        tokio::fs::create_dir_all(&destination).await.map_err(io_error)?;
        for (path, content) in files {
            let target = destination.join(path);
            if path.ends_with('/') {
                tokio::fs::create_dir_all(&target).await.map_err(io_error)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
            }
            tokio::fs::write(&target, content).await.map_err(io_error)?;
        }

        Ok(destination)
    }
}
