//! Watcher thread: notify + debounce, send each settled burst of paths to main.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{RagsyncError, Result};

/// Collects paths until no event has arrived for `window`.
pub(crate) struct Debouncer {
    window: Duration,
    pending: BTreeSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeSet::new(),
            last_event: None,
        }
    }

    pub(crate) fn record(&mut self, paths: Vec<PathBuf>, now: Instant) {
        self.pending.extend(paths);
        self.last_event = Some(now);
    }

    /// The whole burst once it has been quiet for the window, sorted.
    pub(crate) fn take_ready(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let last = self.last_event?;
        if self.pending.is_empty() || now.duration_since(last) < self.window {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.pending).into_iter().collect())
    }
}

/// Watch `root` recursively and send debounced bursts of changed paths over `tx`.
///
/// Blocks until the receiver is dropped or the event source disconnects.
pub fn run_watcher_thread(root: &Path, debounce: Duration, tx: UnboundedSender<Vec<PathBuf>>) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel::<Vec<PathBuf>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(ev) => {
            let _ = event_tx.send(ev.paths);
        }
        Err(e) => log::warn!("watch event error: {}", e),
    })
    .map_err(|e| RagsyncError::Watcher {
        path: root.to_path_buf(),
        message: format!("failed to start: {}", e),
    })?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| RagsyncError::Watcher {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut debouncer = Debouncer::new(debounce);

    loop {
        match event_rx.recv_timeout(debounce) {
            Ok(paths) => debouncer.record(paths, Instant::now()),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Some(burst) = debouncer.take_ready(Instant::now()) {
                    if tx.send(burst).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}
