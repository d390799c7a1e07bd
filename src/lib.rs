pub mod config;
pub mod error;
pub mod db;
pub mod ingest;
pub mod store;
pub mod llm;
pub mod qa;
pub mod watch;

pub use config::Config;
pub use error::{RagsyncError, Result};
pub use ingest::{DocumentLoader, IngestOptions, IngestReport, Ingestor, Passage};
pub use store::{SqliteVectorStore, VectorStore};
