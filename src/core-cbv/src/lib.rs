pub mod common;
pub mod errors;
pub mod fetch;
pub mod hierarchy;
pub mod permalink;
pub mod source_url;
pub mod walk;
pub mod workspace;

pub use common::db_env::{get_database_url, get_db_pool};
pub use common::hostname::get_api_base_url;
pub use common::logging::setup_logging;
pub use common::max_concurrency::get_max_concurrency;
pub use common::poll_interval::{TimeUnit, get_poll_interval, get_poll_max_attempts};
pub use common::source_hosts::get_allowed_source_hosts;
pub use common::workspace_env::get_workspace_root;

pub use errors::Error;
pub use fetch::{FetchError, GitFetcher, SourceFetcher};
pub use hierarchy::{StructuralError, build_hierarchy};
pub use permalink::attach_permalinks;
pub use source_url::{RepoUrl, ValidationError, validate_branch};
pub use walk::{NodeDescriptor, WalkError, WalkOutput, walk};
pub use workspace::{Workspace, WorkspaceError, sweep_workspaces};
