//! Configuration handling for pickfs

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{PickFsError, Result};
use crate::policy::ScanOptions;

/// Command-line arguments for pickfs
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "pickfs",
    version = env!("CARGO_PKG_VERSION"),
    about = "Aggregate selected directory contents into one LLM-ready text artifact",
    long_about = "Builds a filtered tree of a directory, selects files, and assembles their \
contents into a single templated text blob. With --watch the artifact is kept live as files \
change on disk."
)]
pub struct Args {
    /// Target directory to import
    #[clap(default_value = ".")]
    pub directory_path: String,

    /// Output file, or "-" for stdout
    #[clap(long, short, default_value = "-")]
    pub output: String,

    /// Template to render the assembled content through
    #[clap(long, default_value = "default")]
    pub template: String,

    /// JSON file with user-defined templates ([{"name", "format"}])
    #[clap(long)]
    pub templates_file: Option<String>,

    /// Comma-separated suffixes to ignore in addition to the defaults
    #[clap(long, value_delimiter = ',')]
    pub ignore_suffixes: Vec<String>,

    /// Comma-separated folder names to ignore in addition to the defaults
    #[clap(long, value_delimiter = ',')]
    pub ignore_folders: Vec<String>,

    /// Maximum importable file size in bytes
    #[clap(long)]
    pub max_file_size: Option<u64>,

    /// Do not recurse into sub-directories beyond the root
    #[clap(long)]
    pub no_subfolders: bool,

    /// Select only files whose relative path contains one of these
    /// substrings (default: select everything)
    #[clap(long, value_delimiter = ',')]
    pub select: Vec<String>,

    /// Keep running and rewrite the output whenever the tree changes
    #[clap(long)]
    pub watch: bool,

    /// Debounce window for the watcher, in milliseconds
    #[clap(long, default_value = "500")]
    pub debounce_ms: u64,

    /// Number of threads to use for parallel file loading
    #[clap(long, default_value = "4")]
    pub threads: usize,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory to import
    pub target_dir: PathBuf,
    /// Output file; `None` writes to stdout
    pub output_file: Option<PathBuf>,
    /// Template name to assemble with
    pub template: String,
    /// Optional user template catalog
    pub templates_file: Option<PathBuf>,
    /// Scan options (defaults plus CLI additions)
    pub scan: ScanOptions,
    /// Relative-path substrings to select; empty selects everything
    pub select: Vec<String>,
    /// Whether to keep watching after the first assembly
    pub watch: bool,
    /// Watcher debounce window
    pub debounce: Duration,
    /// Thread pool size for parallel reads
    pub num_threads: usize,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args(args: Args) -> Self {
        let mut scan = ScanOptions::default();
        scan.include_subfolders = !args.no_subfolders;
        for suffix in args.ignore_suffixes {
            let suffix = suffix.trim().to_lowercase();
            if suffix.is_empty() {
                continue;
            }
            let suffix = if suffix.starts_with('.') {
                suffix
            } else {
                format!(".{suffix}")
            };
            scan.ignore_suffixes.insert(suffix);
        }
        for folder in args.ignore_folders {
            let folder = folder.trim().to_lowercase();
            if !folder.is_empty() {
                scan.ignore_folders.insert(folder);
            }
        }
        if let Some(max) = args.max_file_size {
            scan.max_file_size = max;
        }

        Self {
            target_dir: PathBuf::from(args.directory_path),
            output_file: match args.output.as_str() {
                "-" => None,
                path => Some(PathBuf::from(path)),
            },
            template: args.template,
            templates_file: args.templates_file.map(PathBuf::from),
            scan,
            select: args.select,
            watch: args.watch,
            debounce: Duration::from_millis(args.debounce_ms),
            num_threads: args.threads,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.target_dir.is_dir() {
            return Err(PickFsError::PathNotFound(
                self.target_dir.display().to_string(),
            ));
        }
        if let Some(path) = &self.templates_file {
            if !path.is_file() {
                return Err(PickFsError::Config(format!(
                    "templates file not found: {}",
                    path.display()
                )));
            }
        }
        if self.num_threads == 0 {
            return Err(PickFsError::Config(
                "--threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn suffix_additions_are_normalized() {
        let args = Args::parse_from([
            "pickfs",
            ".",
            "--ignore-suffixes",
            "LOCK,.Tmp",
            "--ignore-folders",
            "Generated",
        ]);
        let config = Config::from_args(args);
        assert!(config.scan.ignore_suffixes.contains(".lock"));
        assert!(config.scan.ignore_suffixes.contains(".tmp"));
        assert!(config.scan.ignore_folders.contains("generated"));
        // Defaults are still present.
        assert!(config.scan.ignore_suffixes.contains(".png"));
    }

    #[test]
    fn dash_output_means_stdout() {
        let args = Args::parse_from(["pickfs", "."]);
        let config = Config::from_args(args);
        assert!(config.output_file.is_none());
        assert!(!config.watch);
        assert_eq!(config.debounce, Duration::from_millis(500));
    }

    #[test]
    fn no_subfolders_flag_lands_in_scan_options() {
        let args = Args::parse_from(["pickfs", ".", "--no-subfolders"]);
        let config = Config::from_args(args);
        assert!(!config.scan.include_subfolders);
    }
}
