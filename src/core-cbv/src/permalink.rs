//! Links from nodes into the remote repository's web view.

use data_model_cbv::models::{Node, PermalinkedNode};

/// `source_url` without a trailing ".git".
pub fn base_url(source_url: &str) -> &str {
    source_url.strip_suffix(".git").unwrap_or(source_url)
}

/// `<base>/blob/<branch>/<path>`
pub fn file_permalink(source_url: &str, branch: &str, relative_path: &str) -> String {
    format!("{}/blob/{}/{}", base_url(source_url), branch, relative_path)
}

/// `<base>/tree/<branch>/<path>`, or `<base>/tree/<branch>` for the repository root.
pub fn directory_permalink(source_url: &str, branch: &str, relative_path: Option<&str>) -> String {
    match relative_path {
        Some(path) if !path.is_empty() => format!("{}/tree/{}/{}", base_url(source_url), branch, path),
        _ => format!("{}/tree/{}", base_url(source_url), branch),
    }
}

pub fn node_permalink(source_url: &str, branch: &str, node: &Node) -> String {
    if node.is_directory {
        directory_permalink(source_url, branch, Some(&node.relative_path))
    } else {
        file_permalink(source_url, branch, &node.relative_path)
    }
}

/// The flat result: each node paired with its permalink, order preserved.
pub fn attach_permalinks(nodes: Vec<Node>, source_url: &str, branch: &str) -> Vec<PermalinkedNode> {
    nodes
        .into_iter()
        .map(|node| PermalinkedNode {
            permalink: node_permalink(source_url, branch, &node),
            node,
        })
        .collect()
}
