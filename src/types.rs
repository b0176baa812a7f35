//! Core data model: nodes, the arena-backed tree snapshot, selection states
//!
//! A tree snapshot is immutable in shape once built; selection and expansion
//! flags on its nodes are the only fields mutated in place. Rescans replace
//! the whole snapshot and carry flags forward by stable [`NodeId`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable node identifier, derived from the entry's canonical path.
///
/// Identity survives rescans: a rebuilt tree assigns the same id to the same
/// on-disk entry, which is what lets selection and expansion be restored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Derive an id from a canonical path
    pub fn from_canonical(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presentational tri-state for a node's checkbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    /// Nothing under this node is selected
    Unchecked,
    /// Some but not all descendants are selected
    Mixed,
    /// The node (and, for directories, every child) is selected
    Checked,
}

/// One filesystem entry in the filtered tree
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable identifier (canonical path)
    pub id: NodeId,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the import root, `/`-separated; the root's relative
    /// path is its own name
    pub relative_path: String,
    /// Display name (last path component)
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Arena indices of children, sorted by name. `None` for files and for
    /// directories whose subfolders were excluded by policy; `Some(vec![])`
    /// for a genuinely empty directory.
    pub(crate) children: Option<Vec<usize>>,
    /// Explicit/derived selected flag (AND-reduction for directories)
    pub selected: bool,
    /// UI expansion flag, directories only
    pub expanded: bool,
}

impl Node {
    /// Child arena indices, empty for files
    pub fn child_indices(&self) -> &[usize] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Whether children were enumerated for this node
    pub fn has_children_listing(&self) -> bool {
        self.children.is_some()
    }
}

/// Arena-backed tree snapshot
///
/// Nodes live in a flat table in depth-first order, so a parent's index is
/// always smaller than any of its descendants'. The selection recompute
/// relies on that for its bottom-up pass. An id index turns find-by-id into
/// O(1).
#[derive(Debug, Clone, Default)]
pub struct FileTree {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
}

impl FileTree {
    /// Create a tree containing only the given root node
    pub fn with_root(root: Node) -> Self {
        let mut tree = Self::default();
        tree.index.insert(root.id.clone(), 0);
        tree.nodes.push(root);
        tree
    }

    /// Append a node under `parent`, returning its arena index
    pub(crate) fn push_child(&mut self, parent: usize, node: Node) -> usize {
        let idx = self.nodes.len();
        self.index.insert(node.id.clone(), idx);
        self.nodes.push(node);
        self.nodes[parent]
            .children
            .get_or_insert_with(Vec::new)
            .push(idx);
        idx
    }

    /// The root node
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Number of nodes in the snapshot
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot contains no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Arena index for an id, if the node exists in this snapshot
    pub fn handle_of(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Node by id
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.handle_of(id).map(|idx| &self.nodes[idx])
    }

    /// Mutable node by id
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        let idx = self.index.get(id).copied()?;
        Some(&mut self.nodes[idx])
    }

    /// Node by arena index
    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Mutable node by arena index
    pub(crate) fn node_mut(&mut self, idx: usize) -> &mut Node {
        &mut self.nodes[idx]
    }

    /// Iterate nodes in depth-first order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Iterate nodes mutably in depth-first order
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// Iterate arena indices from leaves toward the root
    pub(crate) fn indices_bottom_up(&self) -> impl Iterator<Item = usize> {
        (0..self.nodes.len()).rev()
    }

    /// Derive the presentational tri-state for a node
    pub fn selection_state(&self, idx: usize) -> SelectionState {
        let node = &self.nodes[idx];
        if node.selected {
            return SelectionState::Checked;
        }
        if node.is_dir && self.subtree_has_selection(idx) {
            return SelectionState::Mixed;
        }
        SelectionState::Unchecked
    }

    fn subtree_has_selection(&self, idx: usize) -> bool {
        self.nodes[idx].child_indices().iter().any(|&child| {
            self.nodes[child].selected || self.subtree_has_selection(child)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, is_dir: bool) -> Node {
        let path = PathBuf::from(path);
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Node {
            id: NodeId::from_canonical(&path),
            relative_path: name.clone(),
            name,
            path,
            is_dir,
            children: if is_dir { Some(Vec::new()) } else { None },
            selected: false,
            expanded: false,
        }
    }

    #[test]
    fn parent_index_precedes_children() {
        let mut tree = FileTree::with_root(node("/proj", true));
        let dir = tree.push_child(0, node("/proj/src", true));
        let file = tree.push_child(dir, node("/proj/src/main.rs", false));
        assert!(dir > 0);
        assert!(file > dir);
        assert_eq!(tree.root().child_indices(), &[dir]);
    }

    #[test]
    fn id_index_resolves_nodes() {
        let mut tree = FileTree::with_root(node("/proj", true));
        tree.push_child(0, node("/proj/a.txt", false));
        let id = NodeId::from_canonical(Path::new("/proj/a.txt"));
        assert_eq!(tree.get(&id).unwrap().name, "a.txt");
        assert!(tree.get(&NodeId::from_canonical(Path::new("/gone"))).is_none());
    }

    #[test]
    fn selection_state_reports_mixed_directories() {
        let mut tree = FileTree::with_root(node("/proj", true));
        let a = tree.push_child(0, node("/proj/a.txt", false));
        tree.push_child(0, node("/proj/b.txt", false));

        assert_eq!(tree.selection_state(0), SelectionState::Unchecked);
        tree.node_mut(a).selected = true;
        assert_eq!(tree.selection_state(0), SelectionState::Mixed);
        assert_eq!(tree.selection_state(a), SelectionState::Checked);
    }
}
