//! Tri-state selection and expansion over a tree snapshot
//!
//! A directory's selected flag is derived: it is true iff the directory has
//! at least one enumerated child and every child is (recursively) selected.
//! Empty directories keep whatever was last explicitly set. Expansion is
//! pure view state, carried independently of selection.

use std::collections::HashSet;

use crate::types::{FileTree, Node, NodeId};

/// Set of currently selected node ids (files and directories alike)
pub type SelectionSet = HashSet<NodeId>;

/// Set of currently expanded directory ids
pub type ExpansionSet = HashSet<NodeId>;

/// Owns the current snapshot plus selection/expansion state
#[derive(Debug)]
pub struct SelectionModel {
    tree: FileTree,
    selection: SelectionSet,
    expansion: ExpansionSet,
}

impl SelectionModel {
    /// Wrap a fresh snapshot with nothing selected or expanded
    pub fn new(tree: FileTree) -> Self {
        Self {
            tree,
            selection: SelectionSet::new(),
            expansion: ExpansionSet::new(),
        }
    }

    /// The owned snapshot
    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Ids currently selected
    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Ids currently expanded
    pub fn expansion(&self) -> &ExpansionSet {
        &self.expansion
    }

    /// Toggle one node. Files flip their explicit flag; a directory toggle
    /// is always recursive with the opposite of its current derived state,
    /// so directories are never left partially toggled by the primitive.
    ///
    /// Returns false when the id is not in the current snapshot.
    pub fn toggle(&mut self, id: &NodeId) -> bool {
        let Some(idx) = self.tree.handle_of(id) else {
            return false;
        };
        let node = self.tree.node(idx);
        if node.is_dir {
            let target = !node.selected;
            self.set_subtree(idx, target);
        } else {
            let selected = !node.selected;
            self.tree.node_mut(idx).selected = selected;
        }
        self.recompute();
        true
    }

    /// Set a node and, for directories, every descendant to `select`.
    ///
    /// Returns false when the id is not in the current snapshot.
    pub fn set_recursive(&mut self, id: &NodeId, select: bool) -> bool {
        let Some(idx) = self.tree.handle_of(id) else {
            return false;
        };
        self.set_subtree(idx, select);
        self.recompute();
        true
    }

    fn set_subtree(&mut self, idx: usize, select: bool) {
        self.tree.node_mut(idx).selected = select;
        let children: Vec<usize> = self.tree.node(idx).child_indices().to_vec();
        for child in children {
            self.set_subtree(child, select);
        }
    }

    /// Recalculate every directory's derived flag bottom-up, then rebuild
    /// the selection set from the whole tree.
    ///
    /// The arena stores parents before descendants, so one reverse pass
    /// settles the recursive AND-reduction.
    pub fn recompute(&mut self) {
        for idx in self.tree.indices_bottom_up().collect::<Vec<_>>() {
            let node = self.tree.node(idx);
            if !node.is_dir {
                continue;
            }
            match &node.children {
                Some(children) if !children.is_empty() => {
                    let all = children.iter().all(|&c| self.tree.node(c).selected);
                    self.tree.node_mut(idx).selected = all;
                }
                // Empty or unenumerated directories keep their explicit flag.
                _ => {}
            }
        }

        self.selection = self
            .tree
            .iter()
            .filter(|n| n.selected)
            .map(|n| n.id.clone())
            .collect();
    }

    /// Deselect everything
    pub fn clear_all(&mut self) {
        for node in self.tree.iter_mut() {
            node.selected = false;
        }
        self.selection.clear();
    }

    /// Flip one directory's expansion flag.
    ///
    /// Returns false when the id is missing or not a directory.
    pub fn toggle_expansion(&mut self, id: &NodeId) -> bool {
        let Some(idx) = self.tree.handle_of(id) else {
            return false;
        };
        if !self.tree.node(idx).is_dir {
            return false;
        }
        let expanded = !self.tree.node(idx).expanded;
        self.tree.node_mut(idx).expanded = expanded;
        if expanded {
            self.expansion.insert(id.clone());
        } else {
            self.expansion.remove(id);
        }
        true
    }

    /// Expand every directory if any is collapsed, else collapse all.
    /// One global toggle, no per-subtree memory.
    pub fn toggle_all_expansion(&mut self) {
        let any_collapsed = self.tree.iter().any(|n| n.is_dir && !n.expanded);
        self.expansion.clear();
        for node in self.tree.iter_mut() {
            if node.is_dir {
                node.expanded = any_collapsed;
            }
        }
        if any_collapsed {
            self.expansion = self
                .tree
                .iter()
                .filter(|n| n.is_dir)
                .map(|n| n.id.clone())
                .collect();
        }
    }

    /// Snapshot both sets for carrying across a rescan
    pub fn capture(&self) -> (SelectionSet, ExpansionSet) {
        (self.selection.clone(), self.expansion.clone())
    }

    /// Re-apply previously captured sets by id. Ids that no longer exist in
    /// the snapshot are dropped silently. Ends with a single recompute.
    pub fn restore(&mut self, selection: &SelectionSet, expansion: &ExpansionSet) {
        for id in selection {
            if let Some(node) = self.tree.get_mut(id) {
                node.selected = true;
            }
        }
        for id in expansion {
            if let Some(node) = self.tree.get_mut(id) {
                if node.is_dir {
                    node.expanded = true;
                    self.expansion.insert(id.clone());
                }
            }
        }
        self.recompute();
    }

    /// Currently selected files (never directories), sorted by relative
    /// path. This is the assembly order.
    pub fn selected_files(&self) -> Vec<&Node> {
        let mut files: Vec<&Node> = self
            .tree
            .iter()
            .filter(|n| !n.is_dir && n.selected)
            .collect();
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        files
    }
}
