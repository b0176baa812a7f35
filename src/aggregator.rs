//! End-to-end lifecycle: import, rescan, assemble
//!
//! The aggregator owns the selection model and is the single writer for all
//! tree mutations. Scanning and per-file reads may run on worker threads
//! (rayon), but their results are installed only from the owner's calls.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::accessor::{AccessScope, ResourceAccessor};
use crate::builder::TreeBuilder;
use crate::error::{PickFsError, Result};
use crate::policy::IgnorePolicy;
use crate::selection::SelectionModel;
use crate::template::{TemplateRegistry, DEFAULT_TEMPLATE};
use crate::types::{FileTree, NodeId};
use crate::watcher::{ChangeWatcher, Rescan, DEFAULT_DEBOUNCE};

/// Placeholder block body for a file that failed to read at assembly time
pub const UNREADABLE_PLACEHOLDER: &str = "[could not read file]";

/// Lifecycle state for the current import root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    /// No root installed
    Empty,
    /// First build for a root is running
    Importing,
    /// A snapshot is installed and current
    Ready,
    /// A rebuild for the installed root is running
    Rescanning,
}

/// Notifications surfaced to the presentation layer
#[derive(Debug, Clone)]
pub enum Event {
    /// A rebuild of the tree has started
    RescanStarted,
    /// A rebuild finished; the snapshot now holds this many files
    RescanFinished {
        /// Number of file nodes in the new snapshot
        files: usize,
    },
    /// Access to the root could not be acquired
    AccessError {
        /// Path access was requested for
        path: PathBuf,
        /// Failure description
        reason: String,
    },
    /// A selected file could not be read during assembly
    ReadError {
        /// The unreadable file
        path: PathBuf,
        /// Failure description
        reason: String,
    },
    /// A sub-directory failed to enumerate during a scan
    ScanWarning {
        /// Directory that was only partially enumerated
        path: PathBuf,
        /// Failure description
        reason: String,
    },
}

/// Orchestrates tree building, change watching, selection and assembly
pub struct Aggregator {
    policy: IgnorePolicy,
    accessor: Arc<dyn ResourceAccessor>,
    registry: TemplateRegistry,
    template_name: String,
    progress: Arc<ProgressBar>,
    debounce: Duration,

    state: ImportState,
    root: Option<PathBuf>,
    bookmark: Option<Vec<u8>>,
    model: Option<SelectionModel>,
    watcher: Option<ChangeWatcher>,
    triggers: Option<Receiver<Rescan>>,
    generation: u64,
    subscribers: Vec<Sender<Event>>,
    output: String,
}

impl Aggregator {
    /// Create an aggregator with the given policy and accessor capability
    pub fn new(policy: IgnorePolicy, accessor: Arc<dyn ResourceAccessor>) -> Self {
        Self {
            policy,
            accessor,
            registry: TemplateRegistry::new(),
            template_name: DEFAULT_TEMPLATE.to_string(),
            progress: Arc::new(ProgressBar::hidden()),
            debounce: DEFAULT_DEBOUNCE,
            state: ImportState::Empty,
            root: None,
            bookmark: None,
            model: None,
            watcher: None,
            triggers: None,
            generation: 0,
            subscribers: Vec::new(),
            output: String::new(),
        }
    }

    /// Use this progress bar during scans
    pub fn with_progress(mut self, progress: Arc<ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    /// Override the watcher debounce window
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The template registry, for registering user-defined templates
    pub fn registry_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.registry
    }

    /// Select the template used by [`Aggregator::assemble`]
    pub fn set_template(&mut self, name: &str) -> Result<()> {
        if self.registry.get(name).is_none() {
            return Err(PickFsError::Template(format!("unknown template '{name}'")));
        }
        self.template_name = name.to_string();
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> ImportState {
        self.state
    }

    /// The installed snapshot, if any
    pub fn tree(&self) -> Option<&FileTree> {
        self.model.as_ref().map(SelectionModel::tree)
    }

    /// The selection model, if a root is installed
    pub fn model(&self) -> Option<&SelectionModel> {
        self.model.as_ref()
    }

    /// Last assembled output
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Subscribe to notifications
    pub fn subscribe(&mut self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// The rescan trigger channel for the installed root
    pub fn triggers(&self) -> Option<Receiver<Rescan>> {
        self.triggers.clone()
    }

    fn emit(&mut self, event: Event) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Install a new import root.
    ///
    /// Fails fast with `AccessDenied` (after attempting durable-bookmark
    /// resolution) when access cannot be acquired. Selection and expansion
    /// of a previously installed tree are carried over by stable id. A
    /// failed import returns to `Empty`; it never leaves a half-built tree.
    pub fn import_root(&mut self, root: &Path) -> Result<()> {
        self.generation += 1;
        self.watcher = None;
        self.triggers = None;
        self.state = ImportState::Importing;
        self.emit(Event::RescanStarted);

        let root = match self.acquire_root(root) {
            Ok(root) => root,
            Err(e) => {
                self.reset_to_empty();
                return Err(e);
            }
        };

        let files = match self.rebuild(&root) {
            Ok(files) => files,
            Err(e) => {
                self.reset_to_empty();
                return Err(e);
            }
        };

        let installed = (|| -> Result<()> {
            self.bookmark = Some(self.accessor.serialize(&root)?);
            let (watcher, triggers) = ChangeWatcher::watch(&root, self.debounce, self.generation)?;
            self.watcher = Some(watcher);
            self.triggers = Some(triggers);
            Ok(())
        })();
        if let Err(e) = installed {
            self.reset_to_empty();
            return Err(e);
        }

        self.root = Some(root);
        self.state = ImportState::Ready;
        self.emit(Event::RescanFinished { files });
        Ok(())
    }

    /// Rebuild the tree for the already-installed root, carrying selection
    /// and expansion forward. A failed rescan keeps the previous snapshot.
    pub fn rescan(&mut self) -> Result<()> {
        let root = self
            .root
            .clone()
            .ok_or_else(|| PickFsError::InvalidState("no root to rescan".to_string()))?;

        self.state = ImportState::Rescanning;
        self.emit(Event::RescanStarted);
        let result = self.rebuild(&root);
        self.state = ImportState::Ready;
        match result {
            Ok(files) => {
                self.emit(Event::RescanFinished { files });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "rescan failed, keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// React to a watcher trigger. Triggers from a removed or replaced root
    /// are ignored; returns whether a rescan actually ran.
    pub fn handle_trigger(&mut self, trigger: Rescan) -> Result<bool> {
        if trigger.generation != self.generation || self.root.is_none() {
            tracing::debug!(?trigger, "ignoring stale rescan trigger");
            return Ok(false);
        }
        self.rescan()?;
        Ok(true)
    }

    /// Reassemble without rebuilding the tree. Content is never cached, so
    /// this simply forces a fresh read of every selected file.
    pub fn reload_content_only(&mut self) -> Result<String> {
        self.assemble()
    }

    /// Toggle one node's selection (recursive for directories)
    pub fn toggle(&mut self, id: &NodeId) -> bool {
        self.model.as_mut().is_some_and(|m| m.toggle(id))
    }

    /// Recursively select or deselect a subtree
    pub fn set_recursive(&mut self, id: &NodeId, select: bool) -> bool {
        self.model
            .as_mut()
            .is_some_and(|m| m.set_recursive(id, select))
    }

    /// Deselect everything
    pub fn clear_all(&mut self) {
        if let Some(model) = self.model.as_mut() {
            model.clear_all();
        }
    }

    /// Flip one directory's expansion flag
    pub fn toggle_expansion(&mut self, id: &NodeId) -> bool {
        self.model
            .as_mut()
            .is_some_and(|m| m.toggle_expansion(id))
    }

    /// Expand everything if any directory is collapsed, else collapse all
    pub fn toggle_all_expansion(&mut self) {
        if let Some(model) = self.model.as_mut() {
            model.toggle_all_expansion();
        }
    }

    /// Assemble the selected files into the templated output.
    ///
    /// Files are ordered by relative path, read fresh on every call, and
    /// wrapped in fenced blocks. An unreadable file contributes a literal
    /// placeholder block instead of aborting the assembly.
    pub fn assemble(&mut self) -> Result<String> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PickFsError::InvalidState("nothing imported".to_string()))?;
        let root = self.root.clone().unwrap_or_default();

        let files: Vec<(String, PathBuf)> = model
            .selected_files()
            .iter()
            .map(|n| (n.relative_path.clone(), n.path.clone()))
            .collect();

        let accessor = Arc::clone(&self.accessor);
        let loaded: Vec<(String, PathBuf, std::result::Result<String, String>)> = files
            .into_par_iter()
            .map(|(relative_path, path)| {
                let content = load_file(accessor.as_ref(), &root, &path);
                (relative_path, path, content)
            })
            .collect();

        let mut blocks = Vec::with_capacity(loaded.len());
        let mut events = Vec::new();
        let mut total_bytes = 0usize;
        for (relative_path, path, content) in loaded {
            let body = match content {
                Ok(content) => content,
                Err(reason) => {
                    events.push(Event::ReadError { path, reason });
                    UNREADABLE_PLACEHOLDER.to_string()
                }
            };
            total_bytes += body.len();
            // The block format supplies the newline before the closing fence,
            // so exactly one trailing newline is removed from the content.
            // Any further trailing newlines are the file's own and are kept.
            let body = body.strip_suffix('\n').unwrap_or(&body);
            blocks.push(format!("```{}\n{}\n```", relative_path, body));
        }
        for event in events {
            self.emit(event);
        }

        let joined = blocks.join("\n\n");
        let template = self
            .registry
            .get(&self.template_name)
            .ok_or_else(|| {
                PickFsError::Template(format!("unknown template '{}'", self.template_name))
            })?;
        self.output = template.render(&joined);

        tracing::info!(
            files = blocks.len(),
            bytes = total_bytes,
            template = %self.template_name,
            "assembled output"
        );
        Ok(self.output.clone())
    }

    /// Drop the root, tree, selection state and output; stop the watcher
    pub fn remove_all(&mut self) {
        self.generation += 1;
        self.reset_to_empty();
    }

    fn reset_to_empty(&mut self) {
        self.watcher = None;
        self.triggers = None;
        self.model = None;
        self.root = None;
        self.bookmark = None;
        self.output.clear();
        self.state = ImportState::Empty;
    }

    /// Resolve a usable root path, attempting the durable bookmark when a
    /// direct acquisition is refused. A stale bookmark is discarded so dead
    /// state cannot prompt the user twice.
    fn acquire_root(&mut self, root: &Path) -> Result<PathBuf> {
        if let Some(scope) = AccessScope::acquire(self.accessor.as_ref(), root) {
            return Ok(scope.path().to_path_buf());
        }

        if let Some(bookmark) = self.bookmark.take() {
            let (resolved, stale) = self.accessor.resolve(&bookmark)?;
            if stale {
                self.emit(Event::AccessError {
                    path: resolved.clone(),
                    reason: "stale bookmark discarded".to_string(),
                });
                return Err(PickFsError::StaleBookmark { path: resolved });
            }
            if let Some(scope) = AccessScope::acquire(self.accessor.as_ref(), &resolved) {
                self.bookmark = Some(bookmark);
                return Ok(scope.path().to_path_buf());
            }
        }

        self.emit(Event::AccessError {
            path: root.to_path_buf(),
            reason: "access could not be acquired".to_string(),
        });
        Err(PickFsError::AccessDenied {
            path: root.to_path_buf(),
        })
    }

    /// Build a fresh snapshot for `root` and install it, restoring captured
    /// selection/expansion by id with a single recompute at the end.
    fn rebuild(&mut self, root: &Path) -> Result<usize> {
        let carried = self.model.as_ref().map(SelectionModel::capture);

        let builder = TreeBuilder::new(self.policy.clone(), Arc::clone(&self.progress));
        let outcome = builder.build(root, self.accessor.as_ref())?;
        for warning in &outcome.warnings {
            self.emit(Event::ScanWarning {
                path: warning.path.clone(),
                reason: warning.reason.clone(),
            });
        }

        let files = outcome.tree.iter().filter(|n| !n.is_dir).count();
        let mut model = SelectionModel::new(outcome.tree);
        if let Some((selection, expansion)) = carried {
            model.restore(&selection, &expansion);
        }
        self.model = Some(model);
        Ok(files)
    }
}

/// Read one file under an access scope. A refused file-level acquisition
/// falls back to re-acquiring at the root before giving up.
fn load_file(
    accessor: &dyn ResourceAccessor,
    root: &Path,
    path: &Path,
) -> std::result::Result<String, String> {
    let _scope = AccessScope::acquire(accessor, path)
        .or_else(|| AccessScope::acquire(accessor, root))
        .ok_or_else(|| "access denied".to_string())?;
    fs::read_to_string(path).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::DirectAccessor;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = File::create(dir.join(name)).unwrap();
        write!(file, "{}", content).unwrap();
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(
            IgnorePolicy::default(),
            Arc::new(DirectAccessor::new()),
        )
    }

    fn file_id(agg: &Aggregator, name: &str) -> NodeId {
        agg.tree()
            .unwrap()
            .iter()
            .find(|n| n.name == name)
            .unwrap_or_else(|| panic!("{name} not in tree"))
            .id
            .clone()
    }

    #[test]
    fn import_filters_and_assembles_the_scenario() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "contents of a\n");
        write_file(dir.path(), "b.png", "binary-ish");
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        write_file(&dir.path().join("node_modules"), "c.txt", "dep");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        assert_eq!(agg.state(), ImportState::Ready);

        let names: Vec<_> = agg
            .tree()
            .unwrap()
            .iter()
            .filter(|n| !n.is_dir)
            .map(|n| n.name.clone())
            .collect();
        assert_eq!(names, vec!["a.txt"]);

        let id = file_id(&agg, "a.txt");
        agg.toggle(&id);
        let rel = agg.tree().unwrap().get(&id).unwrap().relative_path.clone();
        let output = agg.assemble().unwrap();
        assert_eq!(output, format!("```{}\ncontents of a\n```", rel));
    }

    #[test]
    fn assemble_is_idempotent_and_sorted_by_relative_path() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "z.txt", "zed");
        write_file(dir.path(), "a.txt", "ay");
        fs::create_dir(dir.path().join("mid")).unwrap();
        write_file(&dir.path().join("mid"), "m.txt", "em");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        let root_id = agg.tree().unwrap().root().id.clone();
        agg.set_recursive(&root_id, true);

        let first = agg.assemble().unwrap();
        let second = agg.assemble().unwrap();
        assert_eq!(first, second);

        let a = first.find("a.txt").unwrap();
        let m = first.find("mid/m.txt").unwrap();
        let z = first.find("z.txt").unwrap();
        assert!(a < m && m < z);
    }

    #[test]
    fn assemble_strips_exactly_one_trailing_newline() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "none.txt", "no newline");
        write_file(dir.path(), "one.txt", "one newline\n");
        write_file(dir.path(), "two.txt", "two newlines\n\n");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        let root_id = agg.tree().unwrap().root().id.clone();
        agg.set_recursive(&root_id, true);

        let output = agg.assemble().unwrap();
        assert!(output.contains("\nno newline\n```"));
        assert!(output.contains("\none newline\n```"));
        // The file's own second newline survives ahead of the fence's one.
        assert!(output.contains("\ntwo newlines\n\n```"));
    }

    #[test]
    fn chatml_template_wraps_the_blocks() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "hello");

        let mut agg = aggregator();
        agg.set_template("chatml").unwrap();
        agg.import_root(dir.path()).unwrap();
        let root_id = agg.tree().unwrap().root().id.clone();
        agg.set_recursive(&root_id, true);

        let output = agg.assemble().unwrap();
        assert!(output.starts_with("<|im_start|>system\n"));
        assert!(output.contains("\nhello\n```"));
        assert!(output.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn rescan_preserves_selection_and_drops_dead_ids() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "keep.txt", "kept");
        write_file(dir.path(), "gone.txt", "going");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        let keep = file_id(&agg, "keep.txt");
        let gone = file_id(&agg, "gone.txt");
        agg.toggle(&keep);
        agg.toggle(&gone);

        fs::remove_file(dir.path().join("gone.txt")).unwrap();
        write_file(dir.path(), "fresh.txt", "new");
        agg.rescan().unwrap();

        let model = agg.model().unwrap();
        assert!(model.selection().contains(&keep));
        assert!(!model.selection().contains(&gone));
        assert!(!model.selection().contains(&file_id(&agg, "fresh.txt")));
    }

    #[test]
    fn rescan_preserves_expansion_state() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        write_file(&dir.path().join("sub"), "f.txt", "eff");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        let sub = file_id(&agg, "sub");
        agg.toggle_expansion(&sub);

        agg.rescan().unwrap();
        assert!(agg.tree().unwrap().get(&sub).unwrap().expanded);
    }

    #[test]
    fn unreadable_file_contributes_a_placeholder_block() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "ok.txt", "fine");
        write_file(dir.path(), "broken.txt", "soon gone");

        let mut agg = aggregator();
        let events = agg.subscribe();
        agg.import_root(dir.path()).unwrap();
        let root_id = agg.tree().unwrap().root().id.clone();
        agg.set_recursive(&root_id, true);

        fs::remove_file(dir.path().join("broken.txt")).unwrap();
        let output = agg.assemble().unwrap();

        assert!(output.contains("fine"));
        assert!(output.contains(UNREADABLE_PLACEHOLDER));
        let saw_read_error = events
            .try_iter()
            .any(|e| matches!(e, Event::ReadError { ref path, .. } if path.ends_with("broken.txt")));
        assert!(saw_read_error);
    }

    #[test]
    fn remove_all_returns_to_empty() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "ay");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        assert_eq!(agg.state(), ImportState::Ready);

        agg.remove_all();
        assert_eq!(agg.state(), ImportState::Empty);
        assert!(agg.tree().is_none());
        assert!(agg.output().is_empty());
        assert!(agg.assemble().is_err());
        assert!(agg.rescan().is_err());
    }

    #[test]
    fn stale_triggers_are_ignored_after_remove_or_reimport() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "ay");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        let stale = Rescan { generation: 0 };
        assert!(!agg.handle_trigger(stale).unwrap());

        let other = tempdir().unwrap();
        write_file(other.path(), "b.txt", "bee");
        agg.import_root(other.path()).unwrap();
        // A trigger from the first root's watcher generation is dropped.
        assert!(!agg.handle_trigger(Rescan { generation: 1 }).unwrap());
    }

    #[test]
    fn import_of_missing_root_fails_back_to_empty() {
        let mut agg = aggregator();
        let events = agg.subscribe();
        let err = agg.import_root(Path::new("/no/such/root")).unwrap_err();
        assert!(matches!(err, PickFsError::AccessDenied { .. }));
        assert_eq!(agg.state(), ImportState::Empty);
        assert!(events
            .try_iter()
            .any(|e| matches!(e, Event::AccessError { .. })));
    }

    #[test]
    fn failed_rescan_keeps_the_previous_snapshot() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "ay");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        let id = file_id(&agg, "a.txt");
        agg.toggle(&id);

        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(agg.rescan().is_err());
        assert_eq!(agg.state(), ImportState::Ready);
        assert!(agg.model().unwrap().selection().contains(&id));

        // A trigger whose rescan fails reports the error but leaves the
        // session usable for the next trigger.
        assert!(agg.handle_trigger(Rescan { generation: 1 }).is_err());
        assert_eq!(agg.state(), ImportState::Ready);
        assert!(agg.model().is_some());
        let _ = path;
    }

    #[test]
    fn reload_content_only_picks_up_new_bytes() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.txt", "old");

        let mut agg = aggregator();
        agg.import_root(dir.path()).unwrap();
        let id = file_id(&agg, "a.txt");
        agg.toggle(&id);

        let before = agg.assemble().unwrap();
        assert!(before.contains("old"));

        write_file(dir.path(), "a.txt", "new");
        let after = agg.reload_content_only().unwrap();
        assert!(after.contains("new"));
        assert!(!after.contains("old"));
    }
}
