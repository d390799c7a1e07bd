use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;
use rusqlite::types::Value as SqlValue;

use super::index::{self, IndexDefinition, IndexState};
use super::similarity::{decode_embedding, encode_embedding, score};
use super::{validate_metadata_key, ScoredPassage, StoredRecord, VectorStore};
use crate::config::Config;
use crate::db::Db;
use crate::error::{RagsyncError, Result};
use crate::ingest::metadata::Metadata;
use crate::ingest::passage::Passage;
use crate::llm::Embedder;

/// SQLite-backed vector store
///
/// Metadata is stored as typed JSON and queried with `json_extract`; vectors
/// are little-endian `f32` blobs scored in process against the configured
/// index definition.
pub struct SqliteVectorStore {
    db: Db,
    embedder: Arc<dyn Embedder>,
    definition: IndexDefinition,
}

fn metadata_path(key: &str) -> String {
    format!("'$.{}.value'", key)
}

impl SqliteVectorStore {
    pub fn new(db: Db, embedder: Arc<dyn Embedder>, definition: IndexDefinition) -> Self {
        Self {
            db,
            embedder,
            definition,
        }
    }

    /// Open the configured database, apply migrations and wire in `embedder`.
    pub async fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if let Some(parent) = config.db_path().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RagsyncError::from_io(parent, e))?;
        }
        let db = Db::new(config.db_path());
        db.migrate().await?;
        Ok(Self::new(db, embedder, config.index.definition()))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub async fn count(&self) -> Result<usize> {
        self.db
            .with_connection(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }

    pub async fn index_state(&self) -> Result<Option<IndexState>> {
        index::get_index(&self.db, &self.definition.name).await
    }

    async fn require_queryable(&self) -> Result<()> {
        match self.index_state().await? {
            Some(state) if state.is_queryable() => Ok(()),
            Some(state) => Err(RagsyncError::IndexNotReady {
                name: self.definition.name.clone(),
                reason: state
                    .message
                    .unwrap_or_else(|| format!("index is {}", state.status.as_str())),
            }),
            None => Err(RagsyncError::IndexNotReady {
                name: self.definition.name.clone(),
                reason: "index does not exist".to_string(),
            }),
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.definition.dimensions {
            return Err(RagsyncError::Embedding(format!(
                "embedding has {} dimensions, index '{}' expects {}",
                vector.len(),
                self.definition.name,
                self.definition.dimensions
            )));
        }
        Ok(())
    }

    async fn scan(&self, query: Vec<f32>, top_k: usize, score_threshold: Option<f32>) -> Result<Vec<ScoredPassage>> {
        let dimensions = self.definition.dimensions as i64;
        let similarity = self.definition.similarity;

        let mut hits = self
            .db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT passage_id, content, metadata_json, embedding
                     FROM passages WHERE dimensions = ?1 ORDER BY rowid",
                )?;
                let mut rows = stmt.query(params![dimensions])?;

                let mut hits = Vec::new();
                while let Some(row) = rows.next()? {
                    let blob: Vec<u8> = row.get(3)?;
                    let s = score(similarity, &query, &decode_embedding(&blob)?);
                    if score_threshold.is_some_and(|min| s < min) {
                        continue;
                    }
                    let metadata: Metadata = serde_json::from_str(&row.get::<_, String>(2)?)?;
                    hits.push(ScoredPassage {
                        id: row.get(0)?,
                        passage: Passage::new(row.get::<_, String>(1)?, metadata),
                        score: s,
                    });
                }
                Ok(hits)
            })
            .await?;

        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn find_by_metadata_in(&self, key: &str, values: &[String]) -> Result<Vec<StoredRecord>> {
        validate_metadata_key(key)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT passage_id, metadata_json, embedding FROM passages
             WHERE json_extract(metadata_json, {}) IN (SELECT value FROM json_each(?1))
             ORDER BY rowid",
            metadata_path(key)
        );
        let values_json = serde_json::to_string(values)?;

        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![values_json])?;

                let mut records = Vec::new();
                while let Some(row) = rows.next()? {
                    let blob: Vec<u8> = row.get(2)?;
                    records.push(StoredRecord {
                        id: row.get(0)?,
                        metadata: serde_json::from_str(&row.get::<_, String>(1)?)?,
                        embedding: decode_embedding(&blob)?,
                    });
                }
                Ok(records)
            })
            .await
    }

    async fn insert_many(&self, passages: &[Passage]) -> Result<Vec<String>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = passages.iter().map(|p| p.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != passages.len() {
            return Err(RagsyncError::Embedding(format!(
                "expected {} embeddings, got {}",
                passages.len(),
                vectors.len()
            )));
        }

        let mut rows = Vec::with_capacity(passages.len());
        for (passage, vector) in passages.iter().zip(vectors.iter()) {
            self.check_dimensions(vector)?;
            rows.push((
                uuid::Uuid::new_v4().to_string(),
                passage.content.clone(),
                serde_json::to_string(&passage.metadata)?,
                encode_embedding(vector),
                vector.len() as i64,
            ));
        }
        let ids: Vec<String> = rows.iter().map(|row| row.0.clone()).collect();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO passages (passage_id, content, metadata_json, embedding, dimensions)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for (id, content, metadata_json, blob, dimensions) in &rows {
                        stmt.execute(params![id, content, metadata_json, blob, dimensions])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        log::debug!("Inserted {} passages", ids.len());
        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPassage>> {
        self.require_queryable().await?;
        let vector = self.embedder.embed_query(query).await?;
        self.check_dimensions(&vector)?;
        self.scan(vector, top_k, score_threshold).await
    }

    async fn similarity_search_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPassage>> {
        self.require_queryable().await?;
        self.check_dimensions(vector)?;
        self.scan(vector.to_vec(), top_k, score_threshold).await
    }

    async fn distinct_metadata_values(&self, key: &str) -> Result<Vec<String>> {
        validate_metadata_key(key)?;
        let path = metadata_path(key);
        let sql = format!(
            "SELECT DISTINCT json_extract(metadata_json, {path}) AS v FROM passages
             WHERE v IS NOT NULL ORDER BY v"
        );

        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query([])?;

                let mut values = Vec::new();
                while let Some(row) = rows.next()? {
                    match row.get::<_, SqlValue>(0)? {
                        SqlValue::Text(s) => values.push(s),
                        SqlValue::Integer(i) => values.push(i.to_string()),
                        SqlValue::Real(f) => values.push(f.to_string()),
                        SqlValue::Null | SqlValue::Blob(_) => {}
                    }
                }
                Ok(values)
            })
            .await
    }

    async fn delete_by_metadata_in(&self, key: &str, values: &[String]) -> Result<usize> {
        validate_metadata_key(key)?;
        if values.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM passages
             WHERE json_extract(metadata_json, {}) IN (SELECT value FROM json_each(?1))",
            metadata_path(key)
        );
        let values_json = serde_json::to_string(values)?;

        let deleted = self
            .db
            .with_connection(move |conn| Ok(conn.execute(&sql, params![values_json])?))
            .await?;

        log::info!("Deleted {} passages by {}", deleted, key);
        Ok(deleted)
    }
}
