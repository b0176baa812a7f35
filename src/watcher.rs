//! Filesystem change watching
//!
//! Raw notify events for a root are funneled into a channel and debounced
//! on a dedicated thread: a burst of events collapses into one trigger,
//! fired after a quiet window following the *last* event (trailing edge).
//! The trigger channel holds at most one pending rescan, so triggers
//! arriving while the consumer is mid-rescan coalesce instead of queueing.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{PickFsError, Result};

/// Default quiet window before a burst of events fires a rescan
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A debounced "tree may be stale" signal.
///
/// Carries the generation of the import it belongs to; the aggregator drops
/// signals whose generation no longer matches the installed root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rescan {
    /// Import generation the watched root belongs to
    pub generation: u64,
}

/// Watches one root and emits debounced rescan triggers
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl ChangeWatcher {
    /// Start watching `root` recursively.
    ///
    /// Returns the watcher handle and the trigger channel. Dropping the
    /// handle stops the notify backend, disconnects the raw channel and
    /// lets the debounce thread exit.
    pub fn watch(
        root: &Path,
        debounce: Duration,
        generation: u64,
    ) -> Result<(Self, Receiver<Rescan>)> {
        let (raw_tx, raw_rx) = unbounded::<()>();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                match result {
                    // Which file changed is irrelevant: every signal means a
                    // full rescan, never an incremental diff.
                    Ok(_) => {
                        let _ = raw_tx.send(());
                    }
                    Err(e) => tracing::warn!(error = %e, "watch error"),
                }
            })?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let (trigger_tx, trigger_rx) = bounded(1);
        thread::Builder::new()
            .name("pickfs-debounce".to_string())
            .spawn(move || debounce_loop(&raw_rx, &trigger_tx, debounce, generation))
            .map_err(|e| PickFsError::Watcher(e.to_string()))?;

        tracing::info!(root = %root.display(), debounce = ?debounce, "watching root");
        Ok((
            Self {
                _watcher: watcher,
                root: root.to_path_buf(),
            },
            trigger_rx,
        ))
    }

    /// The watched root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DebounceState {
    Idle,
    Pending,
}

/// Trailing-edge debounce: any raw event opens (or restarts) the quiet
/// window; the trigger fires only once the window elapses with no further
/// events. `try_send` into the bounded(1) trigger channel is what coalesces
/// a trigger raised while a rescan is still in flight.
fn debounce_loop(
    raw: &Receiver<()>,
    trigger: &Sender<Rescan>,
    window: Duration,
    generation: u64,
) {
    let mut state = DebounceState::Idle;
    loop {
        match state {
            DebounceState::Idle => match raw.recv() {
                Ok(()) => state = DebounceState::Pending,
                Err(_) => return,
            },
            DebounceState::Pending => match raw.recv_timeout(window) {
                // Another event in the window: restart it.
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    let _ = trigger.try_send(Rescan { generation });
                    state = DebounceState::Idle;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Flush the open window before shutting down.
                    let _ = trigger.try_send(Rescan { generation });
                    return;
                }
            },
        }
    }
}
