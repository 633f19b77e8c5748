//! Enumeration of a fetched tree into flat node descriptors.
//!
//! The walk is depth-first pre-order over an explicit stack, so a parent is always emitted
//! before its descendants and the depth of the tree never grows the call stack. Entries in one
//! directory are visited in byte order of their names.

use data_model_cbv::models::Node;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Names that are never recorded: version-control metadata and dependency or bytecode caches.
pub const IGNORED_NAMES: &[&str] = &[".git", "node_modules", "__pycache__"];

/// Prefix of hidden entries, which are never recorded.
pub const HIDDEN_MARKER: char = '.';

/// True if an entry with this file name is left out of the walk.
pub fn is_skipped(name: &str) -> bool {
    name.starts_with(HIDDEN_MARKER) || IGNORED_NAMES.contains(&name)
}

/// Substring after the final '.', or `None` when there is none (or nothing follows it).
pub fn file_extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, extension)| extension)
        .filter(|extension| !extension.is_empty())
        .map(str::to_string)
}

/// One file or directory found by [`walk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDescriptor {
    /// Path from the walk root, '/'-separated.
    pub relative_path: String,
    pub name: String,
    pub extension: Option<String>,
    /// Index of the parent directory's descriptor; `None` for top-level entries.
    pub parent: Option<usize>,
    pub is_directory: bool,
    pub depth: i32,
    pub size_bytes: i64,
}

/// An entry the walk could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub relative_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WalkOutput {
    /// Descriptors in walk order.
    pub entries: Vec<NodeDescriptor>,
    pub skipped: Vec<SkippedEntry>,
}

impl WalkOutput {
    pub fn skipped_count(&self) -> u64 {
        self.skipped.len() as u64
    }

    /// Mints node ids for `job_id`, keeping walk order and parent links.
    pub fn into_nodes(self, job_id: Uuid) -> Vec<Node> {
        let ids: Vec<Uuid> = self.entries.iter().map(|_| Uuid::new_v4()).collect();
        self.entries
            .into_iter()
            .zip(ids.iter())
            .map(|(entry, id)| Node {
                id: *id,
                job_id,
                relative_path: entry.relative_path,
                name: entry.name,
                extension: entry.extension,
                parent_id: entry.parent.map(|index| ids[index]),
                is_directory: entry.is_directory,
                depth: entry.depth,
                size_bytes: entry.size_bytes,
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("Cannot read directory '{}': {source}", path.display())]
    UnreadableRoot { path: PathBuf, source: io::Error },
}

/// A directory entry waiting on the stack.
struct Frame {
    path: PathBuf,
    relative_path: String,
    name: String,
    parent: Option<usize>,
    depth: i32,
}

/// Walks `root`, which must be a readable directory.
///
/// Entries that cannot be inspected (permission denied, broken links, names that are not UTF-8)
/// are recorded in [`WalkOutput::skipped`] and the walk continues. Directory symlinks are
/// recorded as directories but not followed.
pub async fn walk(root: &Path) -> Result<WalkOutput, WalkError> {
    let mut output = WalkOutput::default();

    let top = read_children(root, "")
        .await
        .map_err(|source| WalkError::UnreadableRoot {
            path: root.to_path_buf(),
            source,
        })?;

    let mut stack: Vec<Frame> = Vec::new();
    push_children(&mut stack, &mut output, root, "", None, 0, top);

    while let Some(frame) = stack.pop() {
        let entry = match inspect(&frame.path).await {
            Ok(entry) => entry,
            Err(e) => {
                skip(&mut output, frame.relative_path, e.to_string());
                continue;
            }
        };

        let index = output.entries.len();
        output.entries.push(NodeDescriptor {
            extension: if entry.is_directory {
                None
            } else {
                file_extension(&frame.name)
            },
            relative_path: frame.relative_path.clone(),
            name: frame.name,
            parent: frame.parent,
            is_directory: entry.is_directory,
            depth: frame.depth,
            size_bytes: if entry.is_directory { 0 } else { entry.size_bytes },
        });

        if !entry.descend {
            continue;
        }

        match read_children(&frame.path, &frame.relative_path).await {
            Ok(children) => push_children(
                &mut stack,
                &mut output,
                &frame.path,
                &frame.relative_path,
                Some(index),
                frame.depth + 1,
                children,
            ),
            // the directory itself stays recorded, its contents are skipped
            Err(e) => skip(&mut output, frame.relative_path, e.to_string()),
        }
    }

    Ok(output)
}

struct Inspected {
    is_directory: bool,
    /// False for directory symlinks.
    descend: bool,
    size_bytes: i64,
}

async fn inspect(path: &Path) -> io::Result<Inspected> {
    let link = tokio::fs::symlink_metadata(path).await?;
    if link.file_type().is_symlink() {
        // fails for broken links
        let target = tokio::fs::metadata(path).await?;
        return Ok(Inspected {
            is_directory: target.is_dir(),
            descend: false,
            size_bytes: target.len() as i64,
        });
    }
    Ok(Inspected {
        is_directory: link.is_dir(),
        descend: link.is_dir(),
        size_bytes: link.len() as i64,
    })
}

/// Child names of `dir`, and any entries that could not be listed.
struct Children {
    names: Vec<String>,
    unlisted: Vec<SkippedEntry>,
}

async fn read_children(dir: &Path, relative_dir: &str) -> io::Result<Children> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut children = Children {
        names: Vec::new(),
        unlisted: Vec::new(),
    };

    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => match entry.file_name().into_string() {
                Ok(name) if is_skipped(&name) => {}
                Ok(name) => children.names.push(name),
                Err(raw) => children.unlisted.push(SkippedEntry {
                    relative_path: join(relative_dir, &raw.to_string_lossy()),
                    reason: "file name is not valid UTF-8".to_string(),
                }),
            },
            Ok(None) => break,
            Err(e) => {
                children.unlisted.push(SkippedEntry {
                    relative_path: relative_dir.to_string(),
                    reason: format!("listing stopped early: {}", e),
                });
                break;
            }
        }
    }

    children.names.sort();
    Ok(children)
}

fn push_children(
    stack: &mut Vec<Frame>,
    output: &mut WalkOutput,
    dir: &Path,
    relative_dir: &str,
    parent: Option<usize>,
    depth: i32,
    children: Children,
) {
    for unlisted in children.unlisted {
        skip(output, unlisted.relative_path, unlisted.reason);
    }
    // reversed, so the smallest name is popped first
    for name in children.names.into_iter().rev() {
        stack.push(Frame {
            path: dir.join(&name),
            relative_path: join(relative_dir, &name),
            name,
            parent,
            depth,
        });
    }
}

fn join(relative_dir: &str, name: &str) -> String {
    if relative_dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", relative_dir, name)
    }
}

fn skip(output: &mut WalkOutput, relative_path: String, reason: String) {
    tracing::debug!("Skipping '{}': {}", relative_path, reason);
    output.skipped.push(SkippedEntry { relative_path, reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_rule() {
        assert!(is_skipped(".git"));
        assert!(is_skipped(".env"));
        assert!(is_skipped("node_modules"));
        assert!(is_skipped("__pycache__"));
        assert!(!is_skipped("src"));
        assert!(!is_skipped("node_modules_backup"));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("lib.rs").as_deref(), Some("rs"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("Makefile"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn test_into_nodes_links_parents() {
        let output = WalkOutput {
            entries: vec![
                NodeDescriptor {
                    relative_path: "src".to_string(),
                    name: "src".to_string(),
                    extension: None,
                    parent: None,
                    is_directory: true,
                    depth: 0,
                    size_bytes: 0,
                },
                NodeDescriptor {
                    relative_path: "src/main.rs".to_string(),
                    name: "main.rs".to_string(),
                    extension: Some("rs".to_string()),
                    parent: Some(0),
                    is_directory: false,
                    depth: 1,
                    size_bytes: 3,
                },
            ],
            skipped: Vec::new(),
        };

        let job_id = Uuid::new_v4();
        let nodes = output.into_nodes(job_id);
        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.job_id == job_id));
        assert_eq!(nodes[0].parent_id, None);
        assert_eq!(nodes[1].parent_id, Some(nodes[0].id));
        assert_ne!(nodes[0].id, nodes[1].id);
    }

    /// ```text
    /// b.rs
    /// src/inner/a.txt
    /// .hidden/secret
    /// node_modules/x/index.js
    /// ```
    fn fixture() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("b.rs"), b"fn b() {}").unwrap();
        std::fs::create_dir_all(root.path().join("src/inner")).unwrap();
        std::fs::write(root.path().join("src/inner/a.txt"), b"hello").unwrap();
        std::fs::create_dir_all(root.path().join(".hidden")).unwrap();
        std::fs::write(root.path().join(".hidden/secret"), b"s").unwrap();
        std::fs::create_dir_all(root.path().join("node_modules/x")).unwrap();
        std::fs::write(root.path().join("node_modules/x/index.js"), b"js").unwrap();
        root
    }

    fn paths(output: &WalkOutput) -> Vec<&str> {
        output.entries.iter().map(|e| e.relative_path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walk_emits_parents_first_in_name_order() {
        let root = fixture();
        let output = walk(root.path()).await.unwrap();

        assert_eq!(paths(&output), vec!["b.rs", "src", "src/inner", "src/inner/a.txt"]);
        assert!(output.skipped.is_empty());

        for entry in &output.entries {
            assert_eq!(entry.depth, entry.relative_path.matches('/').count() as i32);
            match entry.parent {
                Some(index) => {
                    let parent = &output.entries[index];
                    assert!(parent.is_directory);
                    assert_eq!(entry.depth, parent.depth + 1);
                }
                None => assert_eq!(entry.depth, 0),
            }
        }

        let a = &output.entries[3];
        assert_eq!(a.name, "a.txt");
        assert_eq!(a.extension.as_deref(), Some("txt"));
        assert_eq!(a.size_bytes, 5);
        let src = &output.entries[1];
        assert!(src.is_directory);
        assert_eq!(src.extension, None);
        assert_eq!(src.size_bytes, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_skips_broken_links_and_does_not_follow_directory_links() {
        let root = fixture();
        std::os::unix::fs::symlink(root.path().join("missing"), root.path().join("broken")).unwrap();
        std::os::unix::fs::symlink(root.path().join("src"), root.path().join("linkdir")).unwrap();

        let output = walk(root.path()).await.unwrap();

        assert_eq!(
            paths(&output),
            vec!["b.rs", "linkdir", "src", "src/inner", "src/inner/a.txt"]
        );
        let linkdir = &output.entries[1];
        assert!(linkdir.is_directory);
        assert_eq!(linkdir.depth, 0);
        assert!(output.entries.iter().all(|e| e.parent != Some(1)));

        assert_eq!(output.skipped_count(), 1);
        assert_eq!(output.skipped[0].relative_path, "broken");
    }

    #[tokio::test]
    async fn test_walk_of_empty_directory() {
        let root = tempfile::tempdir().unwrap();
        let output = walk(root.path()).await.unwrap();
        assert!(output.entries.is_empty());
        assert_eq!(output.skipped_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_root_is_unreadable() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("not-here");

        let error = walk(&missing).await.unwrap_err();
        let WalkError::UnreadableRoot { path, source } = error;
        assert_eq!(path, missing);
        assert_eq!(source.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_file_root_is_unreadable() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(walk(&file).await, Err(WalkError::UnreadableRoot { .. })));
    }
}
