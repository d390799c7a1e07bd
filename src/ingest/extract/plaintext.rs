use std::path::Path;

use super::{decode_utf8, Extracted, Extractor, CONTENT_TYPE_KEY};
use crate::error::Result;
use crate::ingest::chunker::SplitterKind;
use crate::ingest::metadata::Metadata;

/// Plain text extractor
///
/// Treats the entire file as a single unit.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "txt"
    }

    fn splitter(&self) -> SplitterKind {
        SplitterKind::Recursive
    }

    fn extract(&self, bytes: &[u8], path: &Path) -> Result<Vec<Extracted>> {
        let content = decode_utf8(bytes, path)?;

        let mut metadata = Metadata::new();
        metadata.insert(CONTENT_TYPE_KEY, "text/plain");

        Ok(vec![Extracted { content, metadata }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_single_unit() {
        let out = PlainTextExtractor
            .extract(b"line one\nline two", Path::new("notes.txt"))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "line one\nline two");
        assert_eq!(out[0].metadata.get_str(CONTENT_TYPE_KEY).unwrap(), "text/plain");
    }
}
