pub mod walker;
pub mod metadata;
pub mod passage;
pub mod extract;
pub mod chunker;
pub mod loader;
pub mod incremental;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::store::VectorStore;

pub use walker::{Exclusions, FileMetadata, discover_files, discover_files_excluding};
pub use metadata::{Metadata, MetadataValue, MODIFIED_AT_KEY, SOURCE_PATH_KEY};
pub use passage::Passage;
pub use extract::{Extracted, Extractor, ExtractorRegistry};
pub use chunker::{MarkdownSplitter, RecursiveSplitter, Splitter, SplitterKind};
pub use loader::DocumentLoader;
pub use incremental::{ChangeSet, delete_sources, filter_changed, find_deleted_sources};

/// Switches for a single ingestion run
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Skip change detection and insert every loaded passage
    pub force: bool,
    /// Delete stored passages of files under the root that are gone from disk
    pub cleanup: bool,
}

/// Outcome of one ingestion run
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Identifiers assigned by the store, in insertion order
    pub ids: Vec<String>,
    pub files_discovered: usize,
    pub new_files: usize,
    pub modified_files: usize,
    pub unchanged_files: usize,
    pub passages_loaded: usize,
    pub passages_deleted: usize,
}

/// Walk, load, detect changes, insert.
///
/// Any failure aborts the run before the store sees an insert, so a run
/// either stores its whole delta or nothing.
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    loader: DocumentLoader,
    options: IngestOptions,
    excluded: Exclusions,
}

impl Ingestor {
    pub fn new(store: Arc<dyn VectorStore>, chunking: ChunkingConfig) -> Self {
        Self {
            store,
            loader: DocumentLoader::new(chunking),
            options: IngestOptions::default(),
            excluded: Exclusions::default(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Never walk into these files, e.g. the store's own database under the root.
    pub fn with_exclusions(mut self, excluded: Exclusions) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.excluded
    }

    /// Sync the store with `root`; returns the ids of newly stored passages.
    ///
    /// Re-running on an unchanged tree inserts nothing and returns an empty list.
    pub async fn ingest(&self, root: &Path) -> Result<Vec<String>> {
        Ok(self.run(root).await?.ids)
    }

    /// Like [`ingest`](Self::ingest) but with per-stage counts
    pub async fn run(&self, root: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        let files = discover_files_excluding(root, &self.excluded)?;
        report.files_discovered = files.len();

        let mut passages = Vec::new();
        let mut paths = Vec::with_capacity(files.len());
        for file in &files {
            let loaded = self.loader.load(&file.path)?;
            log::debug!("{}: {} passages", file.relative_path, loaded.len());
            passages.extend(loaded);
            paths.push(file.source_path());
        }
        report.passages_loaded = passages.len();

        let delta = if self.options.force {
            log::info!("Forced ingest: skipping change detection for {} files", files.len());
            passages
        } else {
            let change_set = filter_changed(self.store.as_ref(), passages, &paths).await?;
            report.new_files = change_set.new_files;
            report.modified_files = change_set.modified_files;
            report.unchanged_files = change_set.unchanged_files;
            change_set.passages
        };

        if !delta.is_empty() {
            report.ids = self.store.insert_many(&delta).await?;
        }

        if self.options.cleanup {
            let on_disk: HashSet<String> = paths.into_iter().collect();
            let gone = find_deleted_sources(self.store.as_ref(), root, &on_disk).await?;
            if !gone.is_empty() {
                log::info!("Removing {} sources no longer on disk", gone.len());
                report.passages_deleted = delete_sources(self.store.as_ref(), &gone).await?;
            }
        }

        log::info!(
            "Ingested {} of {} passages from {} files in {:?}",
            report.ids.len(),
            report.passages_loaded,
            report.files_discovered,
            start.elapsed()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::error::RagsyncError;
    use crate::llm::testing::HashEmbedder;
    use crate::store::{IndexDefinition, ScoredPassage, SqliteVectorStore, StoredRecord};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Counts calls on the way through to a real store
    struct RecordingStore {
        inner: SqliteVectorStore,
        lookups: AtomicUsize,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn find_by_metadata_in(&self, key: &str, values: &[String]) -> Result<Vec<StoredRecord>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_metadata_in(key, values).await
        }

        async fn insert_many(&self, passages: &[Passage]) -> Result<Vec<String>> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.inner.insert_many(passages).await
        }

        async fn similarity_search(&self, query: &str, top_k: usize, min: Option<f32>) -> Result<Vec<ScoredPassage>> {
            self.inner.similarity_search(query, top_k, min).await
        }

        async fn similarity_search_by_vector(
            &self,
            vector: &[f32],
            top_k: usize,
            min: Option<f32>,
        ) -> Result<Vec<ScoredPassage>> {
            self.inner.similarity_search_by_vector(vector, top_k, min).await
        }

        async fn distinct_metadata_values(&self, key: &str) -> Result<Vec<String>> {
            self.inner.distinct_metadata_values(key).await
        }

        async fn delete_by_metadata_in(&self, key: &str, values: &[String]) -> Result<usize> {
            self.inner.delete_by_metadata_in(key, values).await
        }
    }

    struct Fixture {
        store: Arc<RecordingStore>,
        ingestor: Ingestor,
        docs: std::path::PathBuf,
        _temp_dir: TempDir,
    }

    async fn fixture(options: IngestOptions) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let docs = temp_dir.path().join("docs");
        fs::create_dir_all(&docs).unwrap();

        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate().await.unwrap();
        let definition = IndexDefinition {
            dimensions: 8,
            ..IndexDefinition::default()
        };
        let store = Arc::new(RecordingStore {
            inner: SqliteVectorStore::new(db, Arc::new(HashEmbedder::new(8)), definition),
            lookups: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
        });

        let ingestor = Ingestor::new(store.clone(), ChunkingConfig::default()).with_options(options);
        Fixture { store, ingestor, docs, _temp_dir: temp_dir }
    }

    #[tokio::test]
    async fn test_long_markdown_file_is_chunked_and_tagged() {
        let f = fixture(IngestOptions::default()).await;
        let a = f.docs.join("a.md");
        fs::write(&a, "X".repeat(600)).unwrap();

        let ids = f.ingestor.ingest(&f.docs).await.unwrap();
        assert!(ids.len() >= 2);

        let stored = f
            .store
            .inner
            .find_by_metadata_in(SOURCE_PATH_KEY, &[a.to_string_lossy().into_owned()])
            .await
            .unwrap();
        assert_eq!(stored.len(), ids.len());
        assert!(stored.iter().all(|r| r.metadata.source_path().unwrap() == a.to_string_lossy()));
    }

    #[tokio::test]
    async fn test_second_ingest_of_unchanged_tree_is_noop() {
        let f = fixture(IngestOptions::default()).await;
        fs::write(f.docs.join("a.md"), "# A\n\nalpha").unwrap();
        fs::create_dir_all(f.docs.join("sub")).unwrap();
        fs::write(f.docs.join("sub/b.txt"), "beta").unwrap();

        let first = f.ingestor.run(&f.docs).await.unwrap();
        assert_eq!(first.ids.len(), 2);
        assert_eq!(first.new_files, 2);

        let second = f.ingestor.run(&f.docs).await.unwrap();
        assert!(second.ids.is_empty());
        assert_eq!(second.unchanged_files, 2);
        assert_eq!(f.store.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mtime_change_reingests_whole_file() {
        let f = fixture(IngestOptions::default()).await;
        let a = f.docs.join("a.md");
        fs::write(&a, "X".repeat(600)).unwrap();
        fs::write(f.docs.join("b.md"), "untouched").unwrap();

        let first = f.ingestor.ingest(&f.docs).await.unwrap();
        let a_passages = first.len() - 1;

        let later = fs::metadata(&a).unwrap().modified().unwrap() + Duration::from_secs(60);
        fs::File::options().write(true).open(&a).unwrap().set_modified(later).unwrap();

        let report = f.ingestor.run(&f.docs).await.unwrap();
        assert_eq!(report.ids.len(), a_passages);
        assert_eq!(report.modified_files, 1);
        assert_eq!(report.unchanged_files, 1);
    }

    #[tokio::test]
    async fn test_unsupported_file_aborts_without_insert() {
        let f = fixture(IngestOptions::default()).await;
        fs::write(f.docs.join("a.md"), "# fine").unwrap();
        fs::write(f.docs.join("setup.exe"), b"MZ\x90\x00").unwrap();

        let err = f.ingestor.ingest(&f.docs).await.unwrap_err();
        assert!(matches!(err, RagsyncError::UnsupportedFormat { ref extension, .. } if extension == "exe"));
        assert_eq!(f.store.inserts.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.inner.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_single_lookup_regardless_of_file_count() {
        let f = fixture(IngestOptions::default()).await;
        for i in 0..5 {
            fs::write(f.docs.join(format!("{i}.txt")), format!("file {i}")).unwrap();
        }

        f.ingestor.ingest(&f.docs).await.unwrap();
        assert_eq!(f.store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let f = fixture(IngestOptions::default()).await;
        let err = f.ingestor.ingest(&f.docs.join("nope")).await.unwrap_err();
        assert!(matches!(err, RagsyncError::NotFound(_)));
        assert_eq!(f.store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_tree_inserts_nothing() {
        let f = fixture(IngestOptions::default()).await;
        assert!(f.ingestor.ingest(&f.docs).await.unwrap().is_empty());
        assert_eq!(f.store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_reinserts_everything() {
        let f = fixture(IngestOptions { force: true, cleanup: false }).await;
        fs::write(f.docs.join("a.txt"), "alpha").unwrap();

        assert_eq!(f.ingestor.ingest(&f.docs).await.unwrap().len(), 1);
        assert_eq!(f.ingestor.ingest(&f.docs).await.unwrap().len(), 1);
        assert_eq!(f.store.lookups.load(Ordering::SeqCst), 0);
        assert_eq!(f.store.inner.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_deleted_files() {
        let f = fixture(IngestOptions { force: false, cleanup: true }).await;
        fs::write(f.docs.join("keep.txt"), "keep").unwrap();
        fs::write(f.docs.join("drop.txt"), "drop").unwrap();
        f.ingestor.ingest(&f.docs).await.unwrap();

        fs::remove_file(f.docs.join("drop.txt")).unwrap();
        let report = f.ingestor.run(&f.docs).await.unwrap();
        assert_eq!(report.passages_deleted, 1);

        let sources = f.store.inner.distinct_metadata_values(SOURCE_PATH_KEY).await.unwrap();
        assert_eq!(sources, vec![f.docs.join("keep.txt").to_string_lossy().into_owned()]);
    }

    #[tokio::test]
    async fn test_database_under_root_is_not_ingested() {
        let temp_dir = TempDir::new().unwrap();
        let docs = temp_dir.path().join("docs");
        fs::create_dir_all(docs.join("data")).unwrap();
        fs::write(docs.join("a.md"), "# A\n\nalpha").unwrap();

        let db_path = docs.join("data/rag.db");
        let db = Db::new(db_path.clone());
        db.migrate().await.unwrap();
        let definition = IndexDefinition {
            dimensions: 8,
            ..IndexDefinition::default()
        };
        let store = Arc::new(SqliteVectorStore::new(db, Arc::new(HashEmbedder::new(8)), definition));

        let unguarded = Ingestor::new(store.clone(), ChunkingConfig::default());
        let err = unguarded.ingest(&docs).await.unwrap_err();
        assert!(matches!(err, RagsyncError::UnsupportedFormat { ref extension, .. } if extension == "db"));

        let ingestor = Ingestor::new(store.clone(), ChunkingConfig::default())
            .with_exclusions(Exclusions::new().with_database(&db_path));
        let ids = ingestor.ingest(&docs).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ingestor.ingest(&docs).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_passages_carry_file_mtime() {
        let f = fixture(IngestOptions::default()).await;
        let a = f.docs.join("a.txt");
        fs::write(&a, "content").unwrap();
        let mtime: SystemTime = fs::metadata(&a).unwrap().modified().unwrap();

        f.ingestor.ingest(&f.docs).await.unwrap();
        let stored = f
            .store
            .inner
            .find_by_metadata_in(SOURCE_PATH_KEY, &[a.to_string_lossy().into_owned()])
            .await
            .unwrap();
        assert_eq!(stored[0].metadata.modified_at().unwrap(), chrono::DateTime::<chrono::Utc>::from(mtime));
    }
}
