pub mod markdown;
pub mod pdf;
pub mod plaintext;

use std::path::Path;

use crate::error::{RagsyncError, Result};
use crate::ingest::chunker::SplitterKind;
use crate::ingest::metadata::Metadata;

/// Metadata key naming the MIME type of the source file.
pub const CONTENT_TYPE_KEY: &str = "content_type";

/// A unit of extracted text, before chunking, with whatever metadata the
/// extractor could determine.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub content: String,
    pub metadata: Metadata,
}

/// Trait for format-specific text extraction
pub trait Extractor: Send + Sync {
    /// Check if this extractor handles the given (lowercase) file extension
    fn can_extract(&self, extension: &str) -> bool;

    /// Which chunking strategy suits this format
    fn splitter(&self) -> SplitterKind;

    /// Turn raw file bytes into text units
    fn extract(&self, bytes: &[u8], path: &Path) -> Result<Vec<Extracted>>;
}

/// Selects an extractor by file extension
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create a registry with the built-in extractors (`md`, `txt`, `pdf`)
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
        };

        registry.register(Box::new(markdown::MarkdownExtractor));
        registry.register(Box::new(plaintext::PlainTextExtractor));
        registry.register(Box::new(pdf::PdfExtractor));

        registry
    }

    /// Register an extractor; earlier registrations win on overlap
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn find(&self, extension: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.can_extract(extension))
            .map(|e| e.as_ref())
    }

    /// Like [`find`](Self::find) but fails with `UnsupportedFormat` for `path`
    pub fn require(&self, extension: &str, path: &Path) -> Result<&dyn Extractor> {
        self.find(extension).ok_or_else(|| RagsyncError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: extension.to_string(),
        })
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode bytes as UTF-8 or report an extraction failure for `path`
pub(crate) fn decode_utf8(bytes: &[u8], path: &Path) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| RagsyncError::Extraction {
        path: path.to_path_buf(),
        message: format!("not valid UTF-8: {}", e),
    })
}
