#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::source_url::RepoUrl;
use crate::workspace::Workspace;

/// Directory inside the workspace that receives the fetched tree.
pub const CHECKOUT_DIR: &str = "checkout";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Failed to run '{program}': {source}")]
    Spawn { program: String, source: std::io::Error },
    #[error("Cloning {url} failed ({status}): {stderr}")]
    Clone { url: String, status: String, stderr: String },
    #[error("{0}")]
    Other(String),
}

/// Retrieves the latest revision of a remote repository into a workspace.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetches `source` (at `branch`, or the remote default branch) into `workspace`.
    ///
    /// Returns the directory holding the fetched tree, which lies inside the workspace.
    async fn fetch(&self, source: &RepoUrl, branch: Option<&str>, workspace: &Workspace)
    -> Result<PathBuf, FetchError>;
}

/// Shallow `git clone` through the system git binary.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: PathBuf,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitFetcher {
    pub fn new(program: impl AsRef<Path>) -> Self {
        GitFetcher {
            program: program.as_ref().to_path_buf(),
        }
    }

    fn clone_command(&self, source: &RepoUrl, branch: Option<&str>, destination: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["clone", "--depth", "1", "--single-branch", "--no-tags"]);
        if let Some(branch) = branch {
            command.args(["--branch", branch]);
        }
        command
            .arg("--")
            .arg(source.as_str())
            .arg(destination)
            // never wait on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        source: &RepoUrl,
        branch: Option<&str>,
        workspace: &Workspace,
    ) -> Result<PathBuf, FetchError> {
        let destination = workspace.path().join(CHECKOUT_DIR);
        tracing::debug!(
            "[workspace: {}] Cloning {} (branch: {}) into {}",
            workspace.id(),
            source,
            branch.unwrap_or("<remote default>"),
            destination.display()
        );

        let output = self
            .clone_command(source, branch, &destination)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Clone {
                url: source.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!("[workspace: {}] Cloned {}", workspace.id(), source);
        Ok(destination)
    }
}
