//! File watcher: keep the store in sync with a docs directory.
//!
//! Uses the notify crate to watch the directory and debounces events. Every
//! settled burst triggers one full ingest of the root; change detection keeps
//! that cheap when little has changed.

mod watcher;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RagsyncError, Result};
use crate::ingest::{Exclusions, Ingestor};

/// True when every path in the burst is excluded from ingestion.
fn only_excluded(paths: &[PathBuf], excluded: &Exclusions) -> bool {
    !excluded.is_empty() && paths.iter().all(|path| excluded.contains(path))
}

/// Ingest `root` once, then again after every debounced burst of changes.
///
/// Ingest failures are logged and the watcher keeps running. Bursts that only
/// touch the ingestor's excluded files (such as the database itself) never
/// trigger a run. Returns an error once the watcher thread stops.
pub async fn run_watcher(ingestor: Ingestor, root: &Path, debounce: Duration) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let watch_root = root.to_path_buf();
    std::thread::spawn(move || {
        if let Err(e) = watcher::run_watcher_thread(&watch_root, debounce, tx) {
            log::error!("watcher thread error: {}", e);
        }
    });

    sync_once(&ingestor, root).await;

    while let Some(paths) = rx.recv().await {
        if only_excluded(&paths, ingestor.exclusions()) {
            log::debug!("watch: ignoring {} excluded file events", paths.len());
            continue;
        }
        log::info!("watch: {} paths changed, syncing {}", paths.len(), root.display());
        sync_once(&ingestor, root).await;
    }

    Err(RagsyncError::Watcher {
        path: root.to_path_buf(),
        message: "watcher stopped".to_string(),
    })
}

async fn sync_once(ingestor: &Ingestor, root: &Path) {
    match ingestor.run(root).await {
        Ok(report) if report.ids.is_empty() => log::info!("watch: up to date"),
        Ok(report) => log::info!(
            "watch: stored {} passages ({} new, {} modified files)",
            report.ids.len(),
            report.new_files,
            report.modified_files
        ),
        Err(e) => log::error!("watch: ingest of {} failed: {}", root.display(), e),
    }
}
