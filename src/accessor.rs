//! Resource accessor capability
//!
//! Reading a root (or any file under it) goes through an external
//! permission capability: acquire before I/O, release right after. On
//! platforms without scoped permissions the [`DirectAccessor`] grants
//! everything; the trait exists so a sandboxed host can substitute its own
//! bookmark-backed implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// External capability granting read access to filesystem paths
pub trait ResourceAccessor: Send + Sync {
    /// Begin an access scope for `path`. Returns false if access could not
    /// be acquired.
    fn begin_access(&self, path: &Path) -> bool;

    /// End a previously acquired access scope
    fn end_access(&self, path: &Path);

    /// Serialize a durable access grant for `path`
    fn serialize(&self, path: &Path) -> Result<Vec<u8>>;

    /// Resolve a durable grant back to a path. The boolean is true when the
    /// grant is stale and should be discarded.
    fn resolve(&self, bookmark: &[u8]) -> Result<(PathBuf, bool)>;
}

/// RAII guard for one acquired access scope
pub struct AccessScope<'a> {
    accessor: &'a dyn ResourceAccessor,
    path: PathBuf,
}

impl<'a> AccessScope<'a> {
    /// Acquire access to `path`, returning `None` when the accessor refuses
    pub fn acquire(accessor: &'a dyn ResourceAccessor, path: &Path) -> Option<Self> {
        if accessor.begin_access(path) {
            Some(Self {
                accessor,
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    /// Path this scope covers
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AccessScope<'_> {
    fn drop(&mut self) {
        self.accessor.end_access(&self.path);
    }
}

#[derive(Serialize, Deserialize)]
struct Bookmark {
    path: String,
}

/// Accessor for plain filesystems: access is granted whenever the path
/// exists, and a bookmark is just the path itself.
#[derive(Default)]
pub struct DirectAccessor {
    active: Mutex<HashMap<PathBuf, usize>>,
}

impl DirectAccessor {
    /// Create a new accessor
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open scopes for `path`
    pub fn active_scopes(&self, path: &Path) -> usize {
        self.active.lock().get(path).copied().unwrap_or(0)
    }
}

impl ResourceAccessor for DirectAccessor {
    fn begin_access(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        *self.active.lock().entry(path.to_path_buf()).or_insert(0) += 1;
        true
    }

    fn end_access(&self, path: &Path) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(path) {
            *count -= 1;
            if *count == 0 {
                active.remove(path);
            }
        }
    }

    fn serialize(&self, path: &Path) -> Result<Vec<u8>> {
        let bookmark = Bookmark {
            path: path.to_string_lossy().into_owned(),
        };
        Ok(serde_json::to_vec(&bookmark)?)
    }

    fn resolve(&self, bookmark: &[u8]) -> Result<(PathBuf, bool)> {
        let bookmark: Bookmark = serde_json::from_slice(bookmark)?;
        let path = PathBuf::from(bookmark.path);
        let stale = !path.exists();
        Ok((path, stale))
    }
}
