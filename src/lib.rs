/*!
 * pickfs - Interactive file selection and live aggregation of directory
 * contents for LLM context
 *
 * This library builds a filtered tree snapshot of a directory, maintains
 * tri-state selection over it, watches the filesystem for changes, and
 * assembles the selected files into a single templated text artifact.
 */

pub mod accessor;
pub mod aggregator;
pub mod builder;
pub mod config;
pub mod error;
pub mod policy;
pub mod selection;
pub mod template;
pub mod types;
pub mod watcher;


// Re-export main components for easier access
pub use accessor::{AccessScope, DirectAccessor, ResourceAccessor};
pub use aggregator::{Aggregator, Event, ImportState};
pub use builder::{BuildOutcome, ScanWarning, TreeBuilder};
pub use config::{Args, Config};
pub use error::{PickFsError, Result};
pub use policy::{IgnorePolicy, ScanOptions};
pub use selection::{ExpansionSet, SelectionModel, SelectionSet};
pub use template::{Template, TemplateRegistry};
pub use types::{FileTree, Node, NodeId, SelectionState};
pub use watcher::{ChangeWatcher, Rescan};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
