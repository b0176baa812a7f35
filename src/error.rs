//! Global error handling for pickfs
//!
//! This module provides a centralized error type that can represent errors
//! from all modules in the project.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Global error type for pickfs operations
#[derive(Error, Debug)]
pub enum PickFsError {
    /// Access to a root or file could not be acquired
    #[error("Access denied: {}", path.display())]
    AccessDenied {
        /// Path that could not be accessed
        path: PathBuf,
    },

    /// A stored access grant no longer resolves
    #[error("Stale bookmark for {}", path.display())]
    StaleBookmark {
        /// Path the bookmark was stored for
        path: PathBuf,
    },

    /// A selected file could not be read at assembly time
    #[error("Failed to read {}: {reason}", path.display())]
    ReadFailure {
        /// File that could not be read
        path: PathBuf,
        /// Underlying failure description
        reason: String,
    },

    /// File system errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON processing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Template errors (bad placeholder count, unknown name)
    #[error("Template error: {0}")]
    Template(String),

    /// Watcher errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Operation invalid in the current state (e.g. rescan with no root)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<notify::Error> for PickFsError {
    fn from(err: notify::Error) -> Self {
        PickFsError::Watcher(err.to_string())
    }
}

/// Specialized Result type for pickfs operations
pub type Result<T> = std::result::Result<T, PickFsError>;
