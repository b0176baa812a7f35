//! Command-line interface for pickfs

use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;
use tracing_subscriber::EnvFilter;

use pickfs::accessor::DirectAccessor;
use pickfs::aggregator::{Aggregator, Event};
use pickfs::config::{Args, Config};
use pickfs::error::Result;
use pickfs::policy::IgnorePolicy;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(args);
    config.validate()?;

    if let Err(e) = ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()
    {
        tracing::warn!(error = %e, "failed to set thread pool size");
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {wide_msg:.dim.white} {pos} files")
            .expect("valid progress template"),
    );
    progress.set_message(format!("Scanning {}", config.target_dir.display()));

    let mut aggregator = Aggregator::new(
        IgnorePolicy::new(config.scan.clone()),
        Arc::new(DirectAccessor::new()),
    )
    .with_progress(Arc::new(progress.clone()))
    .with_debounce(config.debounce);

    if let Some(path) = &config.templates_file {
        let json = fs::read_to_string(path)?;
        let count = aggregator.registry_mut().load_user_templates(&json)?;
        tracing::info!(count, file = %path.display(), "loaded user templates");
    }
    aggregator.set_template(&config.template)?;

    let events = aggregator.subscribe();

    let start = Instant::now();
    aggregator.import_root(&config.target_dir)?;
    progress.finish_and_clear();
    drain_events(&events);

    apply_selection(&mut aggregator, &config.select);
    let output = aggregator.assemble()?;
    drain_events(&events);
    write_output(&config, &output)?;
    tracing::info!(elapsed = ?start.elapsed(), "initial assembly done");

    if !config.watch {
        return Ok(());
    }

    let triggers = aggregator
        .triggers()
        .expect("watcher installed after import");
    tracing::info!(root = %config.target_dir.display(), "watching for changes");
    while let Ok(trigger) = triggers.recv() {
        // A failed rescan keeps the previous snapshot; the session stays up.
        match aggregator.handle_trigger(trigger) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::error!(error = %e, "rescan failed");
                continue;
            }
        }
        drain_events(&events);
        // Rescan restores selection by id; re-apply the pattern filter so
        // files created since the import are picked up too.
        apply_selection(&mut aggregator, &config.select);
        let output = aggregator.assemble()?;
        drain_events(&events);
        write_output(&config, &output)?;
    }

    Ok(())
}

/// Select everything, or only files matching the `--select` substrings
fn apply_selection(aggregator: &mut Aggregator, patterns: &[String]) {
    let Some(tree) = aggregator.tree() else {
        return;
    };

    if patterns.is_empty() {
        let root_id = tree.root().id.clone();
        aggregator.set_recursive(&root_id, true);
        return;
    }

    let matching: Vec<_> = tree
        .iter()
        .filter(|n| !n.is_dir && patterns.iter().any(|p| n.relative_path.contains(p)))
        .map(|n| n.id.clone())
        .collect();
    aggregator.clear_all();
    for id in matching {
        aggregator.set_recursive(&id, true);
    }
}

fn write_output(config: &Config, output: &str) -> Result<()> {
    match &config.output_file {
        Some(path) => {
            fs::write(path, output)?;
            tracing::info!(path = %path.display(), bytes = output.len(), "output written");
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Report queued notifications through the log
fn drain_events(events: &crossbeam_channel::Receiver<Event>) {
    for event in events.try_iter() {
        match event {
            Event::RescanStarted => tracing::debug!("rescan started"),
            Event::RescanFinished { files } => tracing::debug!(files, "rescan finished"),
            Event::AccessError { path, reason } => {
                tracing::error!(path = %path.display(), reason, "access error");
            }
            Event::ReadError { path, reason } => {
                tracing::warn!(path = %path.display(), reason, "file skipped");
            }
            Event::ScanWarning { path, reason } => {
                tracing::warn!(path = %path.display(), reason, "partial scan");
            }
        }
    }
}
