use crate::fetch::FetchError;
use crate::source_url::ValidationError;
use crate::walk::WalkError;
use crate::workspace::WorkspaceError;

/// Failure of one stage of the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The submitted source URL or branch was rejected before any I/O happened.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Cloning the remote repository failed.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The scratch workspace could not be created or removed.
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// The fetched tree could not be enumerated.
    #[error("Walk failed: {0}")]
    Walk(#[from] WalkError),
}
