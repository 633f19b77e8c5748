//! Reconstruction of the rooted tree from a job's flat node list.
//!
//! Nodes are ordered by (depth, relative_path), so every parent precedes its children, and
//! placed into an arena indexed by that order. Parents are resolved to arena slots as the nodes
//! are visited. The tree is then assembled bottom-up by moving slots into their parents in
//! reverse order, which needs neither recursion nor shared ownership.

use data_model_cbv::models::{Node, TreeNode};
use std::collections::HashMap;
use uuid::Uuid;

use crate::permalink::{directory_permalink, node_permalink};

/// Name of the synthetic root of every hierarchy.
pub const ROOT_NAME: &str = "root";

/// The persisted nodes do not form a tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Node {node_id} ('{path}') references parent {parent_id}, which is not a directory one level above it")]
pub struct StructuralError {
    pub node_id: Uuid,
    pub path: String,
    pub parent_id: Uuid,
}

/// Builds the hierarchy for `nodes` with permalinks for `source_url` at `branch`.
///
/// Children of every directory are ordered by relative_path. Fails if any node's parent does
/// not resolve to an already visited directory whose depth is exactly one less: nothing is ever
/// silently dropped.
pub fn build_hierarchy(nodes: &[Node], source_url: &str, branch: &str) -> Result<TreeNode, StructuralError> {
    let mut ordered: Vec<&Node> = nodes.iter().collect();
    ordered.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });

    // arena slot and depth of each registered directory
    let mut directories: HashMap<Uuid, (usize, i32)> = HashMap::new();
    // `None` is the synthetic root
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(ordered.len());
    let mut arena: Vec<Option<TreeNode>> = Vec::with_capacity(ordered.len());

    for (slot, node) in ordered.iter().enumerate() {
        let parent = match node.parent_id {
            None => None,
            Some(parent_id) => match directories.get(&parent_id) {
                Some(&(parent_slot, parent_depth)) if parent_depth + 1 == node.depth => Some(parent_slot),
                _ => {
                    return Err(StructuralError {
                        node_id: node.id,
                        path: node.relative_path.clone(),
                        parent_id,
                    });
                }
            },
        };

        parents.push(parent);
        arena.push(Some(tree_node(node, source_url, branch)));
        if node.is_directory {
            directories.insert(node.id, (slot, node.depth));
        }
    }

    let mut top_level: Vec<TreeNode> = Vec::new();
    for slot in (0..arena.len()).rev() {
        let Some(mut tree) = arena[slot].take() else {
            continue;
        };
        // every child sits at a higher slot and was attached already, in reverse order
        if let Some(children) = tree.children.as_mut() {
            children.reverse();
        }
        match parents[slot] {
            Some(parent_slot) => {
                if let Some(children) = arena[parent_slot].as_mut().and_then(|p| p.children.as_mut()) {
                    children.push(tree);
                }
            }
            None => top_level.push(tree),
        }
    }
    top_level.reverse();

    Ok(TreeNode {
        id: None,
        name: ROOT_NAME.to_string(),
        path: String::new(),
        extension: None,
        is_directory: true,
        size: 0,
        depth: -1,
        permalink: directory_permalink(source_url, branch, None),
        children: Some(top_level),
    })
}

fn tree_node(node: &Node, source_url: &str, branch: &str) -> TreeNode {
    TreeNode {
        id: Some(node.id),
        name: node.name.clone(),
        path: node.relative_path.clone(),
        extension: node.extension.clone(),
        is_directory: node.is_directory,
        size: node.size_bytes,
        depth: node.depth,
        permalink: node_permalink(source_url, branch, node),
        children: node.is_directory.then(Vec::new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, parent: Option<&Node>, is_directory: bool, size_bytes: i64) -> Node {
        Node {
            id: Uuid::new_v4(),
            job_id: Uuid::nil(),
            relative_path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            extension: None,
            parent_id: parent.map(|p| p.id),
            is_directory,
            depth: path.matches('/').count() as i32,
            size_bytes,
        }
    }

    #[test]
    fn test_children_follow_path_order() {
        let src = node("src", None, true, 0);
        let b = node("src/b.rs", Some(&src), false, 2);
        let a = node("src/a.rs", Some(&src), false, 1);
        let readme = node("README.md", None, false, 5);

        // input order is irrelevant
        let tree = build_hierarchy(&[b, readme, a, src], "https://github.com/o/r", "main").unwrap();

        let names: Vec<&str> = tree.children().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "src"]);
        let src_children: Vec<&str> = tree.children()[1].children().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(src_children, vec!["src/a.rs", "src/b.rs"]);
    }

    #[test]
    fn test_root_node() {
        let tree = build_hierarchy(&[], "https://github.com/o/r.git", "main").unwrap();
        assert_eq!(tree.name, "root");
        assert!(tree.id.is_none());
        assert!(tree.is_directory);
        assert_eq!(tree.children, Some(Vec::new()));
        assert_eq!(tree.permalink, "https://github.com/o/r/tree/main");
    }

    #[test]
    fn test_empty_directory_keeps_empty_children() {
        let empty = node("empty", None, true, 0);
        let tree = build_hierarchy(&[empty], "https://github.com/o/r", "main").unwrap();
        assert_eq!(tree.children()[0].children, Some(Vec::new()));
    }

    #[test]
    fn test_unknown_parent_is_structural_error() {
        let ghost = node("ghost", None, true, 0);
        let orphan = node("ghost/file.txt", Some(&ghost), false, 1);

        let error = build_hierarchy(&[orphan.clone()], "https://github.com/o/r", "main").unwrap_err();
        assert_eq!(error.node_id, orphan.id);
        assert_eq!(error.parent_id, ghost.id);
    }

    #[test]
    fn test_file_parent_is_structural_error() {
        let file = node("a.txt", None, false, 1);
        let child = node("a.txt/b.txt", Some(&file), false, 1);
        assert!(build_hierarchy(&[file, child], "https://github.com/o/r", "main").is_err());
    }

    #[test]
    fn test_parent_below_child_is_structural_error() {
        let mut dir = node("deep/dir", None, true, 0);
        let mut child = node("x", Some(&dir), false, 1);
        // parent claims a greater depth than its child
        dir.depth = 3;
        child.depth = 0;
        assert!(build_hierarchy(&[dir, child], "https://github.com/o/r", "main").is_err());
    }

    #[test]
    fn test_sibling_depth_parent_is_structural_error() {
        // registered before its child in (depth, path) order, but on the same level
        let dir = node("a", None, true, 0);
        let mut child = node("b/c.txt", Some(&dir), false, 1);
        child.depth = 0;

        let error = build_hierarchy(&[dir.clone(), child.clone()], "https://github.com/o/r", "main").unwrap_err();
        assert_eq!(error.node_id, child.id);
        assert_eq!(error.parent_id, dir.id);
    }

    #[test]
    fn test_skipped_level_is_structural_error() {
        let dir = node("a", None, true, 0);
        let child = node("a/b/c.txt", Some(&dir), false, 1);
        assert!(build_hierarchy(&[dir, child], "https://github.com/o/r", "main").is_err());
    }
}
