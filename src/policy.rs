//! Import filtering policy
//!
//! A pure predicate deciding whether a filesystem entry may enter the tree:
//! folder-name blocklist, suffix blocklist, file size ceiling. No state
//! beyond the configured sets.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Default ceiling on importable file size (500 KiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024;

/// Default folder names to exclude, matched case-insensitively against
/// the entry's own name
pub static DEFAULT_IGNORE_FOLDERS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        // Version control
        ".git",
        ".svn",
        ".hg",
        ".bzr",
        // Dependencies
        "node_modules",
        "bower_components",
        "vendor",
        ".npm",
        ".yarn",
        ".pnpm-store",
        // Build output
        "target",
        "dist",
        "build",
        "out",
        "obj",
        "release",
        // Python
        "__pycache__",
        ".pytest_cache",
        "venv",
        ".venv",
        ".tox",
        // IDEs and editors
        ".idea",
        ".vscode",
        ".vs",
        // Apple tooling
        "xcuserdata",
        "deriveddata",
        "pods",
        // Caches and temp
        ".cache",
        ".gradle",
        ".terraform",
        "tmp",
        "temp",
        "logs",
        "coverage",
        ".next",
        ".nuxt",
    ]
});

/// Default file suffixes to exclude (binary, media, archive), lowercased,
/// with leading dot
pub static DEFAULT_IGNORE_SUFFIXES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        // Images
        ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".icns", ".tiff", ".webp", ".heic",
        // Audio / video
        ".mp3", ".wav", ".flac", ".aac", ".m4a", ".mp4", ".avi", ".mov", ".mkv", ".webm",
        // Archives
        ".zip", ".tar", ".gz", ".tgz", ".bz2", ".xz", ".rar", ".7z",
        // Compiled artifacts
        ".o", ".a", ".so", ".dylib", ".dll", ".exe", ".class", ".jar", ".war", ".pyc", ".pyo",
        ".wasm",
        // Documents
        ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
        // Fonts
        ".ttf", ".otf", ".woff", ".woff2", ".eot",
        // Databases and blobs
        ".db", ".sqlite", ".sqlite3", ".bin", ".dat", ".iso", ".dmg",
    ]
});

/// Scan configuration record
///
/// `Default` restores exactly the curated built-in sets, so resetting a
/// session's options is `ScanOptions::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Whether to recurse into sub-directories beyond the root
    pub include_subfolders: bool,
    /// Lowercased suffixes (with leading dot) to reject
    pub ignore_suffixes: HashSet<String>,
    /// Lowercased folder names to reject
    pub ignore_folders: HashSet<String>,
    /// Maximum importable file size in bytes
    pub max_file_size: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_subfolders: true,
            ignore_suffixes: DEFAULT_IGNORE_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore_folders: DEFAULT_IGNORE_FOLDERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Pure import predicate over [`ScanOptions`]
#[derive(Debug, Clone, Default)]
pub struct IgnorePolicy {
    options: ScanOptions,
}

impl IgnorePolicy {
    /// Create a policy from explicit options
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// The options backing this policy
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Whether recursion into sub-directories beyond the root is enabled
    pub fn include_subfolders(&self) -> bool {
        self.options.include_subfolders
    }

    /// Decide whether a path may be imported.
    ///
    /// Rules are applied in order, first match wins:
    /// 1. directory with a blocklisted name -> reject
    /// 2. file with a blocklisted suffix -> reject
    /// 3. file larger than the size ceiling -> reject
    /// 4. accept
    ///
    /// Only the entry's own name is matched against the folder blocklist.
    /// The scan prunes a rejected directory with its whole subtree, and
    /// ancestors of the import root must never decide rejection.
    pub fn should_import(&self, path: &Path, is_directory: bool, size_if_file: u64) -> bool {
        if is_directory {
            if let Some(name) = path.file_name() {
                let name = name.to_string_lossy().to_lowercase();
                if self.options.ignore_folders.contains(&name) {
                    return false;
                }
            }
        } else {
            if let Some(ext) = path.extension() {
                let suffix = format!(".{}", ext.to_string_lossy().to_lowercase());
                if self.options.ignore_suffixes.contains(&suffix) {
                    return false;
                }
            }
            if size_if_file > self.options.max_file_size {
                return false;
            }
        }
        true
    }
}
