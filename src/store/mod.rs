//! Vector store: passages with embeddings, metadata lookup and similarity search.

pub mod index;
pub mod similarity;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{RagsyncError, Result};
use crate::ingest::metadata::Metadata;
use crate::ingest::passage::Passage;

pub use index::{ensure_index, IndexDefinition, IndexState, IndexStatus, PollPolicy, Similarity};
pub use sqlite::SqliteVectorStore;

/// A stored passage as seen by metadata lookups
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// A similarity search hit; `score` is in `[0, 1]`, higher is closer
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub id: String,
    pub passage: Passage,
    pub score: f32,
}

/// Storage backend for embedded passages
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Records whose metadata `key` equals any of `values`, in insertion order
    async fn find_by_metadata_in(&self, key: &str, values: &[String]) -> Result<Vec<StoredRecord>>;

    /// Embed and store every passage; all-or-nothing. Returns the new ids in input order.
    async fn insert_many(&self, passages: &[Passage]) -> Result<Vec<String>>;

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPassage>>;

    async fn similarity_search_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPassage>>;

    /// Every distinct value stored under metadata `key`
    async fn distinct_metadata_values(&self, key: &str) -> Result<Vec<String>>;

    /// Remove records whose metadata `key` equals any of `values`; returns the count removed
    async fn delete_by_metadata_in(&self, key: &str, values: &[String]) -> Result<usize>;
}

/// Metadata keys are spliced into JSON paths, so only plain identifiers are allowed.
pub(crate) fn validate_metadata_key(key: &str) -> Result<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RagsyncError::InvalidInput(format!("Invalid metadata key '{}'", key)));
    }
    Ok(())
}
