//! Directory scanning into an immutable tree snapshot

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use walkdir::WalkDir;

use crate::accessor::{AccessScope, ResourceAccessor};
use crate::error::{PickFsError, Result};
use crate::policy::IgnorePolicy;
use crate::types::{FileTree, Node, NodeId};

/// macOS package-like bundle directories are opaque to the user; they are
/// skipped the same way hidden entries are.
const BUNDLE_SUFFIXES: &[&str] = &[
    ".app",
    ".bundle",
    ".framework",
    ".xcodeproj",
    ".xcworkspace",
    ".xcassets",
    ".playground",
];

/// Non-fatal problem encountered while scanning
#[derive(Debug, Clone)]
pub struct ScanWarning {
    /// Directory that could not be fully enumerated
    pub path: std::path::PathBuf,
    /// Underlying failure description
    pub reason: String,
}

/// Result of one build: the snapshot plus any partial-failure warnings
#[derive(Debug)]
pub struct BuildOutcome {
    /// The filtered tree snapshot
    pub tree: FileTree,
    /// Sub-directories that failed to enumerate (scan still succeeded)
    pub warnings: Vec<ScanWarning>,
}

/// Builds filtered tree snapshots of a directory
pub struct TreeBuilder {
    policy: IgnorePolicy,
    progress: Arc<ProgressBar>,
}

impl TreeBuilder {
    /// Create a builder with the given policy and progress bar
    pub fn new(policy: IgnorePolicy, progress: Arc<ProgressBar>) -> Self {
        Self { policy, progress }
    }

    /// Create a builder that reports no progress
    pub fn hidden(policy: IgnorePolicy) -> Self {
        Self::new(policy, Arc::new(ProgressBar::hidden()))
    }

    /// Scan `root` and return a fresh snapshot.
    ///
    /// The root itself is always descended regardless of the subfolder
    /// setting. A read error on the root fails the build; a read error on a
    /// nested directory keeps that directory with whatever children did
    /// enumerate and records a warning.
    pub fn build(&self, root: &Path, accessor: &dyn ResourceAccessor) -> Result<BuildOutcome> {
        let abs_root = fs::canonicalize(root)
            .map_err(|_| PickFsError::PathNotFound(root.display().to_string()))?;
        if !abs_root.is_dir() {
            return Err(PickFsError::PathNotFound(format!(
                "{} is not a directory",
                abs_root.display()
            )));
        }

        let _scope = AccessScope::acquire(accessor, &abs_root).ok_or_else(|| {
            PickFsError::AccessDenied {
                path: abs_root.clone(),
            }
        })?;

        // Listing the root must succeed; nested listing errors are warnings.
        fs::read_dir(&abs_root)?;

        let name = abs_root
            .file_name()
            .unwrap_or(abs_root.as_os_str())
            .to_string_lossy()
            .to_string();
        let mut tree = FileTree::with_root(Node {
            id: NodeId::from_canonical(&abs_root),
            path: abs_root.clone(),
            relative_path: name.clone(),
            name,
            is_dir: true,
            children: Some(Vec::new()),
            selected: false,
            expanded: false,
        });

        let mut warnings = Vec::new();
        self.scan_directory(&mut tree, 0, &mut warnings);

        tracing::debug!(
            root = %abs_root.display(),
            nodes = tree.len(),
            warnings = warnings.len(),
            "tree built"
        );
        Ok(BuildOutcome { tree, warnings })
    }

    /// Enumerate one directory level and recurse into accepted children
    fn scan_directory(&self, tree: &mut FileTree, dir_idx: usize, warnings: &mut Vec<ScanWarning>) {
        let dir_path = tree.node(dir_idx).path.clone();
        let dir_rel = tree.node(dir_idx).relative_path.clone();

        let walker = WalkDir::new(&dir_path)
            .max_depth(1)
            .min_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(ScanWarning {
                        path: dir_path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if is_hidden(&name) || is_bundle(&name, entry.file_type().is_dir()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warnings.push(ScanWarning {
                        path: entry.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let is_dir = metadata.is_dir();
            if !self.policy.should_import(entry.path(), is_dir, metadata.len()) {
                // A rejected directory is omitted with its whole subtree.
                continue;
            }

            let relative_path = format!("{}/{}", dir_rel, name);
            let descend = is_dir && self.policy.include_subfolders();
            let child_idx = tree.push_child(
                dir_idx,
                Node {
                    id: NodeId::from_canonical(entry.path()),
                    path: entry.path().to_path_buf(),
                    relative_path,
                    name,
                    is_dir,
                    children: if descend { Some(Vec::new()) } else { None },
                    selected: false,
                    expanded: false,
                },
            );

            if descend {
                self.scan_directory(tree, child_idx, warnings);
            } else if !is_dir {
                self.progress.inc(1);
            }
        }
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_bundle(name: &str, is_dir: bool) -> bool {
    let lowered = name.to_lowercase();
    is_dir && BUNDLE_SUFFIXES.iter().any(|s| lowered.ends_with(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::DirectAccessor;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = File::create(dir.join(name)).unwrap();
        write!(file, "{}", content).unwrap();
    }

    #[test]
    fn builds_sorted_filtered_tree() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "b.txt", "bee");
        write_file(dir.path(), "a.txt", "ay");
        write_file(dir.path(), "c.png", "not text");
        write_file(dir.path(), ".hidden", "skip me");
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        write_file(&dir.path().join("node_modules"), "dep.txt", "skip me");

        let builder = TreeBuilder::hidden(IgnorePolicy::default());
        let outcome = builder.build(dir.path(), &DirectAccessor::new()).unwrap();

        let names: Vec<_> = outcome
            .tree
            .root()
            .child_indices()
            .iter()
            .map(|&i| outcome.tree.node(i).name.clone())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn relative_paths_are_rooted_at_the_root_name() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        write_file(&dir.path().join("src"), "main.rs", "fn main() {}");

        let builder = TreeBuilder::hidden(IgnorePolicy::default());
        let outcome = builder.build(dir.path(), &DirectAccessor::new()).unwrap();

        let root_name = outcome.tree.root().name.clone();
        assert_eq!(outcome.tree.root().relative_path, root_name);

        let file = outcome
            .tree
            .iter()
            .find(|n| n.name == "main.rs")
            .expect("main.rs in tree");
        assert_eq!(file.relative_path, format!("{}/src/main.rs", root_name));
    }

    #[test]
    fn oversized_file_is_excluded_entirely() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "small.txt", "fits");
        let big = "x".repeat(500 * 1024 + 1);
        write_file(dir.path(), "big.txt", &big);

        let builder = TreeBuilder::hidden(IgnorePolicy::default());
        let outcome = builder.build(dir.path(), &DirectAccessor::new()).unwrap();

        assert!(outcome.tree.iter().any(|n| n.name == "small.txt"));
        assert!(!outcome.tree.iter().any(|n| n.name == "big.txt"));
    }

    #[test]
    fn empty_directory_is_kept_with_empty_children() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let builder = TreeBuilder::hidden(IgnorePolicy::default());
        let outcome = builder.build(dir.path(), &DirectAccessor::new()).unwrap();

        let empty = outcome.tree.iter().find(|n| n.name == "empty").unwrap();
        assert!(empty.is_dir);
        assert!(empty.has_children_listing());
        assert!(empty.child_indices().is_empty());
    }

    #[test]
    fn subfolders_flag_gates_recursion_but_not_the_root() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "top.txt", "top");
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_file(&dir.path().join("sub"), "nested.txt", "nested");

        let mut options = crate::policy::ScanOptions::default();
        options.include_subfolders = false;
        let builder = TreeBuilder::hidden(IgnorePolicy::new(options));
        let outcome = builder.build(dir.path(), &DirectAccessor::new()).unwrap();

        assert!(outcome.tree.iter().any(|n| n.name == "top.txt"));
        let sub = outcome.tree.iter().find(|n| n.name == "sub").unwrap();
        assert!(sub.is_dir);
        assert!(!sub.has_children_listing());
        assert!(!outcome.tree.iter().any(|n| n.name == "nested.txt"));
    }

    #[test]
    fn missing_root_fails_the_build() {
        let builder = TreeBuilder::hidden(IgnorePolicy::default());
        let result = builder.build(Path::new("/no/such/root"), &DirectAccessor::new());
        assert!(result.is_err());
    }
}
