//! Vector index lifecycle: create if absent, build, poll until queryable.

use std::fmt;
use std::time::{Duration, Instant};

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::Db;
use crate::error::{RagsyncError, Result};

/// Distance function used to rank neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Similarity {
    #[default]
    #[serde(rename = "dotProduct")]
    DotProduct,
    #[serde(rename = "cosine")]
    Cosine,
    #[serde(rename = "euclidean")]
    Euclidean,
}

impl Similarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Similarity::DotProduct => "dotProduct",
            Similarity::Cosine => "cosine",
            Similarity::Euclidean => "euclidean",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "dotProduct" => Ok(Similarity::DotProduct),
            "cosine" => Ok(Similarity::Cosine),
            "euclidean" => Ok(Similarity::Euclidean),
            other => Err(RagsyncError::InvalidInput(format!("Unknown similarity '{}'", other))),
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a vector index covers and how it compares vectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    /// Field holding the vector
    pub path: String,
    pub dimensions: usize,
    pub similarity: Similarity,
}

impl IndexDefinition {
    pub const DEFAULT_PATH: &'static str = "embedding";
}

impl Default for IndexDefinition {
    fn default() -> Self {
        Self {
            name: "vector_index_dotProduct_2048".to_string(),
            path: Self::DEFAULT_PATH.to_string(),
            dimensions: 2048,
            similarity: Similarity::DotProduct,
        }
    }
}

/// Bounded exponential backoff for waiting on an index build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Pending,
    Ready,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Ready => "ready",
            IndexStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(IndexStatus::Pending),
            "ready" => Ok(IndexStatus::Ready),
            "failed" => Ok(IndexStatus::Failed),
            other => Err(RagsyncError::StoreUnavailable(format!("Unknown index status '{}'", other))),
        }
    }
}

/// Stored state of a vector index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexState {
    pub definition: IndexDefinition,
    pub status: IndexStatus,
    pub message: Option<String>,
}

impl IndexState {
    pub fn is_queryable(&self) -> bool {
        self.status == IndexStatus::Ready
    }
}

/// Look up an index by name
pub async fn get_index(db: &Db, name: &str) -> Result<Option<IndexState>> {
    let name = name.to_string();
    db.with_connection(move |conn| {
        let row = conn
            .query_row(
                "SELECT name, path, dimensions, similarity, status, message
                 FROM vector_indexes WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((name, path, dimensions, similarity, status, message)) => Ok(Some(IndexState {
                definition: IndexDefinition {
                    name,
                    path,
                    dimensions: dimensions as usize,
                    similarity: Similarity::parse(&similarity)?,
                },
                status: IndexStatus::parse(&status)?,
                message,
            })),
        }
    })
    .await
}

/// Register an index in `pending` state; a no-op if the name exists
pub async fn create_index(db: &Db, definition: &IndexDefinition) -> Result<()> {
    let definition = definition.clone();
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT OR IGNORE INTO vector_indexes (name, path, dimensions, similarity, status)
             VALUES (?1, ?2, ?3, ?4, 'pending')",
            params![
                definition.name,
                definition.path,
                definition.dimensions as i64,
                definition.similarity.as_str()
            ],
        )?;
        Ok(())
    })
    .await
}

/// Build a pending index: every stored vector must have the index dimensionality.
pub async fn build_index(db: &Db, name: &str) -> Result<IndexStatus> {
    let name = name.to_string();
    db.with_connection(move |conn| {
        let dimensions: i64 = conn.query_row(
            "SELECT dimensions FROM vector_indexes WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        let mismatched: i64 = conn.query_row(
            "SELECT COUNT(*) FROM passages WHERE dimensions != ?1",
            params![dimensions],
            |row| row.get(0),
        )?;

        let (status, message) = if mismatched == 0 {
            (IndexStatus::Ready, None)
        } else {
            (
                IndexStatus::Failed,
                Some(format!("{} stored vectors do not have {} dimensions", mismatched, dimensions)),
            )
        };

        conn.execute(
            "UPDATE vector_indexes SET status = ?1, message = ?2 WHERE name = ?3",
            params![status.as_str(), message, name],
        )?;

        Ok(status)
    })
    .await
}

/// Poll until the index is queryable, doubling the delay up to `max_delay`.
pub async fn wait_until_queryable(db: &Db, name: &str, policy: PollPolicy) -> Result<IndexState> {
    let start = Instant::now();
    let mut delay = policy.initial;

    loop {
        let state = get_index(db, name).await?.ok_or_else(|| RagsyncError::IndexNotReady {
            name: name.to_string(),
            reason: "index does not exist".to_string(),
        })?;

        match state.status {
            IndexStatus::Ready => return Ok(state),
            IndexStatus::Failed => {
                return Err(RagsyncError::IndexNotReady {
                    name: name.to_string(),
                    reason: state.message.unwrap_or_else(|| "index build failed".to_string()),
                })
            }
            IndexStatus::Pending => {}
        }

        let waited = start.elapsed();
        if waited >= policy.timeout {
            return Err(RagsyncError::IndexTimeout {
                name: name.to_string(),
                waited,
            });
        }

        log::debug!("Index '{}' not queryable yet, retrying in {:?}", name, delay);
        tokio::time::sleep(delay.min(policy.timeout - waited)).await;
        delay = policy.next_delay(delay);
    }
}

/// Make sure a queryable index named `definition.name` exists.
///
/// Creates and builds the index if needed, then waits for it under `policy`.
pub async fn ensure_index(db: &Db, definition: &IndexDefinition, policy: PollPolicy) -> Result<IndexState> {
    match get_index(db, &definition.name).await? {
        Some(state) if state.definition != *definition => {
            return Err(RagsyncError::IndexNotReady {
                name: definition.name.clone(),
                reason: format!(
                    "existing index has {} dimensions ({}), configured {} ({})",
                    state.definition.dimensions,
                    state.definition.similarity,
                    definition.dimensions,
                    definition.similarity
                ),
            });
        }
        Some(state) if state.is_queryable() => {
            log::debug!("Vector index '{}' already exists", definition.name);
            return Ok(state);
        }
        Some(_) => {}
        None => {
            log::info!(
                "Creating vector index '{}' ({} dims, {})",
                definition.name,
                definition.dimensions,
                definition.similarity
            );
            create_index(db, definition).await?;
        }
    }

    let build_db = db.clone();
    let name = definition.name.clone();
    tokio::spawn(async move {
        match build_index(&build_db, &name).await {
            Ok(status) => log::debug!("Index '{}' build finished: {}", name, status.as_str()),
            Err(e) => log::error!("Index '{}' build failed: {}", name, e),
        }
    });

    let state = wait_until_queryable(db, &definition.name, policy).await?;
    log::info!("Vector index '{}' is queryable", definition.name);
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate().await.unwrap();
        (db, temp_dir)
    }

    fn small_definition() -> IndexDefinition {
        IndexDefinition {
            name: "vector_index_cosine_4".to_string(),
            dimensions: 4,
            similarity: Similarity::Cosine,
            ..IndexDefinition::default()
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            initial: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_similarity_serde_names() {
        assert_eq!(serde_json::to_string(&Similarity::DotProduct).unwrap(), "\"dotProduct\"");
        let s: Similarity = serde_json::from_str("\"euclidean\"").unwrap();
        assert_eq!(s, Similarity::Euclidean);
        assert_eq!(Similarity::parse("cosine").unwrap(), Similarity::Cosine);
        assert!(Similarity::parse("manhattan").is_err());
    }

    #[test]
    fn test_default_definition() {
        let def = IndexDefinition::default();
        assert_eq!(def.name, "vector_index_dotProduct_2048");
        assert_eq!(def.path, "embedding");
        assert_eq!(def.dimensions, 2048);
        assert_eq!(def.similarity, Similarity::DotProduct);
    }

    #[test]
    fn test_backoff_is_bounded() {
        let policy = fast_policy();
        let mut delay = policy.initial;
        for _ in 0..10 {
            delay = policy.next_delay(delay);
        }
        assert_eq!(delay, policy.max_delay);
    }

    #[tokio::test]
    async fn test_ensure_index_creates_and_is_idempotent() {
        let (db, _temp_dir) = setup_db().await;
        let def = small_definition();

        assert!(get_index(&db, &def.name).await.unwrap().is_none());

        let state = ensure_index(&db, &def, fast_policy()).await.unwrap();
        assert!(state.is_queryable());
        assert_eq!(state.definition, def);

        let again = ensure_index(&db, &def, fast_policy()).await.unwrap();
        assert_eq!(again.status, IndexStatus::Ready);
    }

    #[tokio::test]
    async fn test_ensure_index_rejects_conflicting_definition() {
        let (db, _temp_dir) = setup_db().await;
        let def = small_definition();
        ensure_index(&db, &def, fast_policy()).await.unwrap();

        let conflicting = IndexDefinition { dimensions: 8, ..def };
        let err = ensure_index(&db, &conflicting, fast_policy()).await.unwrap_err();
        assert!(matches!(err, RagsyncError::IndexNotReady { .. }));
    }

    #[tokio::test]
    async fn test_build_fails_on_dimension_mismatch() {
        let (db, _temp_dir) = setup_db().await;
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO passages (passage_id, content, metadata_json, embedding, dimensions)
                 VALUES ('p1', 'x', '{}', x'00000000', 1)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let err = ensure_index(&db, &small_definition(), fast_policy()).await.unwrap_err();
        match err {
            RagsyncError::IndexNotReady { reason, .. } => assert!(reason.contains("do not have 4 dimensions")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_times_out_on_pending_index() {
        let (db, _temp_dir) = setup_db().await;
        let def = small_definition();
        create_index(&db, &def).await.unwrap();

        let policy = PollPolicy {
            initial: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        };
        let err = wait_until_queryable(&db, &def.name, policy).await.unwrap_err();
        assert!(matches!(err, RagsyncError::IndexTimeout { ref name, .. } if name == &def.name));
    }
}
