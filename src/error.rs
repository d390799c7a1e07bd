use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main error type for ragsync
#[derive(Error, Debug)]
pub enum RagsyncError {
    /// Ingestion root or file does not exist
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem entry could not be read
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Any other filesystem failure, tagged with the path involved
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File extension has no extractor
    #[error("Unsupported document type '{extension}': {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Extractor could not make sense of the file contents
    #[error("Extraction failed for {}: {message}", path.display())]
    Extraction { path: PathBuf, message: String },

    /// Metadata value present but of the wrong type
    #[error("Metadata type error: key '{key}' expected {expected}, found {found}")]
    MetadataType {
        key: String,
        expected: &'static str,
        found: String,
    },

    /// SQLite failure (store unavailable)
    #[error("Store unavailable: {0}")]
    Database(#[from] rusqlite::Error),

    /// Store failure that is not a SQLite error
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Embedding service errors
    #[error("Embedding service error: {0}")]
    Embedding(String),

    /// Chat completion errors
    #[error("Generation error: {0}")]
    Generation(String),

    /// Vector index missing, failed, or still building
    #[error("Vector index '{name}' is not queryable: {reason}")]
    IndexNotReady { name: String, reason: String },

    /// Gave up waiting for the vector index
    #[error("Timed out after {waited:?} waiting for vector index '{name}'")]
    IndexTimeout { name: String, waited: Duration },

    /// File watcher could not start, or stopped delivering events
    #[error("File watcher on {} failed: {message}", path.display())]
    Watcher { path: PathBuf, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON (de)serialization of stored metadata
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagsyncError {
    /// Classify an IO error for `path` into the taxonomy used by the walker and loader.
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => RagsyncError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                RagsyncError::PermissionDenied(path.to_path_buf())
            }
            _ => RagsyncError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Convenient Result type using RagsyncError
pub type Result<T> = std::result::Result<T, RagsyncError>;
