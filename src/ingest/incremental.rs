//! Incremental ingestion: skip passages of files whose stored modification time
//! matches the one on disk.
//!
//! One metadata lookup covers every candidate path, so a sync over an unchanged
//! tree costs a single store query and no writes.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ingest::metadata::SOURCE_PATH_KEY;
use crate::ingest::passage::Passage;
use crate::store::VectorStore;

/// Passages that need (re-)ingestion plus a per-file classification.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub passages: Vec<Passage>,
    /// Files with no stored passages.
    pub new_files: usize,
    /// Files whose stored `modified_at` differs from the current one.
    pub modified_files: usize,
    /// Files whose stored `modified_at` matches; their passages are dropped.
    pub unchanged_files: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Load the recorded `modified_at` for each of `paths`.
///
/// When a path has several stored records the last one returned wins, which
/// with insertion-ordered results is the most recently ingested.
pub async fn stored_modification_times(
    store: &dyn VectorStore,
    paths: &[String],
) -> Result<HashMap<String, DateTime<Utc>>> {
    let records = store.find_by_metadata_in(SOURCE_PATH_KEY, paths).await?;

    let mut stored = HashMap::with_capacity(paths.len());
    for record in records {
        let path = record.metadata.source_path()?.to_string();
        let modified_at = record.metadata.modified_at()?;
        stored.insert(path, modified_at);
    }

    Ok(stored)
}

/// Keep the passages whose file is absent from the store or whose stored
/// `modified_at` differs from the passage's own.
pub async fn filter_changed(
    store: &dyn VectorStore,
    passages: Vec<Passage>,
    paths: &[String],
) -> Result<ChangeSet> {
    let stored = stored_modification_times(store, paths).await?;

    let mut change_set = ChangeSet::default();
    let mut classified: HashSet<String> = HashSet::new();

    for passage in passages {
        let path = passage.metadata.source_path()?.to_string();
        let current = passage.metadata.modified_at()?;

        let changed = match stored.get(&path) {
            None => {
                if classified.insert(path.clone()) {
                    change_set.new_files += 1;
                }
                true
            }
            Some(recorded) if *recorded != current => {
                if classified.insert(path.clone()) {
                    change_set.modified_files += 1;
                }
                true
            }
            Some(_) => {
                if classified.insert(path.clone()) {
                    change_set.unchanged_files += 1;
                }
                false
            }
        };

        if changed {
            change_set.passages.push(passage);
        }
    }

    log::info!(
        "Change detection: {} new, {} modified, {} unchanged files; {} passages to insert",
        change_set.new_files,
        change_set.modified_files,
        change_set.unchanged_files,
        change_set.passages.len()
    );

    Ok(change_set)
}

/// Find stored source paths under `root` that no longer exist on the filesystem.
///
/// `existing_files` holds the source paths discovered on disk. Stored paths
/// outside `root` belong to other ingestion roots and are never reported.
pub async fn find_deleted_sources(
    store: &dyn VectorStore,
    root: &Path,
    existing_files: &HashSet<String>,
) -> Result<Vec<String>> {
    let stored = store.distinct_metadata_values(SOURCE_PATH_KEY).await?;

    Ok(stored
        .into_iter()
        .filter(|p| Path::new(p).starts_with(root) && !existing_files.contains(p))
        .collect())
}

/// Delete every stored passage of the given source paths.
///
/// Returns the number of passages deleted.
pub async fn delete_sources(store: &dyn VectorStore, source_paths: &[String]) -> Result<usize> {
    if source_paths.is_empty() {
        return Ok(0);
    }
    store.delete_by_metadata_in(SOURCE_PATH_KEY, source_paths).await
}
