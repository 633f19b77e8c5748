use std::path::PathBuf;

/// Directory under the system temp dir used when WORKSPACE_DIR is not set.
pub const DEFAULT_WORKSPACE_DIR_NAME: &str = "codebase-viz-workspaces";

/// Root directory for per-job workspaces, from WORKSPACE_DIR.
pub fn get_workspace_root() -> PathBuf {
    match std::env::var("WORKSPACE_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ => std::env::temp_dir().join(DEFAULT_WORKSPACE_DIR_NAME),
    }
}
