//! Ephemeral per-job scratch directories.
//!
//! A [`Workspace`] is owned by exactly one job execution. It is removed by [`Workspace::release`]
//! on the normal path, by `Drop` when the owner unwinds or returns early, and by
//! [`sweep_workspaces`] for directories left behind by a crashed process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Workspace '{}' already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("Cannot create workspace '{}': {source}", path.display())]
    Create { path: PathBuf, source: std::io::Error },
    #[error("Cannot remove workspace '{}': {source}", path.display())]
    Remove { path: PathBuf, source: std::io::Error },
}

/// Scoped ownership of `<root>/<workspace_id>`.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Creates the workspace directory. Fails if it already exists so two owners never share one.
    pub async fn create(root: &Path, id: Uuid) -> Result<Self, WorkspaceError> {
        tokio::fs::create_dir_all(root).await.map_err(|source| WorkspaceError::Create {
            path: root.to_path_buf(),
            source,
        })?;

        let path = root.join(id.to_string());
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(WorkspaceError::AlreadyExists(path)),
            Err(source) => return Err(WorkspaceError::Create { path, source }),
        }

        tracing::debug!("[workspace: {}] Created {}", id, path.display());
        Ok(Workspace {
            id,
            path,
            released: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the workspace and everything in it. Consumes the guard, so removal happens once.
    pub async fn release(mut self) -> Result<(), WorkspaceError> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                tracing::debug!("[workspace: {}] Removed {}", self.id, self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("[workspace: {}] Removed {} on drop", self.id, self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "[workspace: {}] Failed to remove {} on drop: {}",
                self.id,
                self.path.display(),
                e
            ),
        }
    }
}

/// Removes every workspace directory under `root`, returning how many were removed.
///
/// Only directories named by a job id are removed; any other entry is left in place.
/// Only safe to call before any job execution has started, e.g. at service startup.
pub async fn sweep_workspaces(root: &Path) -> Result<usize, WorkspaceError> {
    let remove_error = |path: &Path, source: std::io::Error| WorkspaceError::Remove {
        path: path.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(remove_error(root, e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await.map_err(|e| remove_error(root, e))? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| remove_error(&path, e))?;
        let is_workspace = file_type.is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| Uuid::parse_str(name).is_ok());
        if !is_workspace {
            tracing::warn!("Leaving {} in place: not a workspace", path.display());
            continue;
        }

        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| remove_error(&path, e))?;
        tracing::info!("Removed leftover workspace {}", path.display());
        removed += 1;
    }

    Ok(removed)
}
