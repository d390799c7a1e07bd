use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use super::{Extracted, Extractor, CONTENT_TYPE_KEY};
use crate::error::{RagsyncError, Result};
use crate::ingest::chunker::SplitterKind;
use crate::ingest::metadata::Metadata;

/// PDF text extractor backed by `pdf-extract`
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "pdf"
    }

    fn splitter(&self) -> SplitterKind {
        SplitterKind::Recursive
    }

    fn extract(&self, bytes: &[u8], path: &Path) -> Result<Vec<Extracted>> {
        // pdf-extract panics on some malformed inputs
        let content = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(bytes)
        }))
        .map_err(|_| RagsyncError::Extraction {
            path: path.to_path_buf(),
            message: "PDF parser panicked".to_string(),
        })?
        .map_err(|e| RagsyncError::Extraction {
            path: path.to_path_buf(),
            message: format!("PDF extraction failed: {}", e),
        })?;

        let mut metadata = Metadata::new();
        metadata.insert(CONTENT_TYPE_KEY, "application/pdf");

        Ok(vec![Extracted { content, metadata }])
    }
}
