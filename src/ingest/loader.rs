use std::path::Path;
use std::time::SystemTime;

use crate::config::ChunkingConfig;
use crate::error::{RagsyncError, Result};
use crate::ingest::extract::ExtractorRegistry;
use crate::ingest::metadata::file_metadata;
use crate::ingest::passage::Passage;

/// Turns one file into passages: extract by extension, chunk, tag with file metadata.
///
/// Chunking parameters are fixed at construction, so the same bytes and mtime
/// always produce the same passages.
pub struct DocumentLoader {
    config: ChunkingConfig,
    registry: ExtractorRegistry,
}

impl DocumentLoader {
    pub fn new(config: ChunkingConfig) -> Self {
        Self::with_registry(config, ExtractorRegistry::new())
    }

    pub fn with_registry(config: ChunkingConfig, registry: ExtractorRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Load `path` from disk.
    ///
    /// Fails with `UnsupportedFormat` before touching the file when no
    /// extractor handles its extension.
    pub fn load(&self, path: &Path) -> Result<Vec<Passage>> {
        let extension = extension_of(path);
        self.registry.require(&extension, path)?;

        let stat = std::fs::metadata(path).map_err(|e| RagsyncError::from_io(path, e))?;
        let modified = stat.modified().map_err(|e| RagsyncError::from_io(path, e))?;
        let bytes = std::fs::read(path).map_err(|e| RagsyncError::from_io(path, e))?;

        self.load_bytes(path, &bytes, modified)
    }

    /// Same as [`load`](Self::load) for bytes already in memory
    pub fn load_bytes(&self, path: &Path, bytes: &[u8], modified: SystemTime) -> Result<Vec<Passage>> {
        let extension = extension_of(path);
        let extractor = self.registry.require(&extension, path)?;
        let splitter = extractor.splitter().build(self.config);

        let inherited = file_metadata(&path.to_string_lossy(), modified);

        let mut passages = Vec::new();
        for unit in extractor.extract(bytes, path)? {
            for chunk in splitter.split(&unit.content) {
                let mut metadata = unit.metadata.clone();
                metadata.inherit(&inherited);
                passages.push(Passage::new(chunk, metadata));
            }
        }

        log::debug!("Loaded {} passages from {}", passages.len(), path.display());
        Ok(passages)
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::extract::markdown::SECTION_KEY;
    use crate::ingest::extract::CONTENT_TYPE_KEY;
    use crate::ingest::metadata::{MetadataValue, MODIFIED_AT_KEY, SOURCE_PATH_KEY};
    use chrono::{DateTime, Utc};
    use std::fs;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn loader() -> DocumentLoader {
        DocumentLoader::new(ChunkingConfig::default())
    }

    #[test]
    fn test_load_text_file_inherits_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        fs::write(&path, "X".repeat(600)).unwrap();
        let mtime = fs::metadata(&path).unwrap().modified().unwrap();

        let passages = loader().load(&path).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].content.len(), 512);
        assert_eq!(passages[1].content.len(), 216);

        for passage in &passages {
            assert_eq!(passage.metadata.source_path().unwrap(), path.to_string_lossy());
            assert_eq!(passage.metadata.modified_at().unwrap(), DateTime::<Utc>::from(mtime));
            assert_eq!(passage.metadata.get_str(CONTENT_TYPE_KEY).unwrap(), "text/plain");
        }
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("README.MD");
        fs::write(&path, "# Hello\n\nWorld.").unwrap();

        let passages = loader().load(&path).unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].metadata.get_str(SECTION_KEY).unwrap(), "Hello");
    }

    #[test]
    fn test_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["tool.exe", "Makefile"] {
            let path = temp_dir.path().join(name);
            fs::write(&path, "data").unwrap();
            let err = loader().load(&path).unwrap_err();
            assert!(matches!(err, RagsyncError::UnsupportedFormat { .. }), "{name}: {err:?}");
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone.md");
        let err = loader().load(&path).unwrap_err();
        assert!(matches!(err, RagsyncError::NotFound(p) if p == path));
    }

    #[test]
    fn test_invalid_utf8_is_extraction_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.txt");
        fs::write(&path, [0xffu8, 0xfe, 0xfd]).unwrap();
        let err = loader().load(&path).unwrap_err();
        assert!(matches!(err, RagsyncError::Extraction { .. }));
    }

    #[test]
    fn test_inherited_keys_survive_extractor_metadata() {
        let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let doc = "---\nauthor: sam\nmodified_at: 2001-01-01\n---\n# Intro\n\nText.";

        let passages = loader()
            .load_bytes(Path::new("/docs/guide.md"), doc.as_bytes(), mtime)
            .unwrap();
        assert_eq!(passages.len(), 1);

        let metadata = &passages[0].metadata;
        assert_eq!(metadata.get_str("author").unwrap(), "sam");
        assert_eq!(metadata.get(SOURCE_PATH_KEY), Some(&MetadataValue::String("/docs/guide.md".into())));
        assert_eq!(metadata.get(MODIFIED_AT_KEY), Some(&MetadataValue::Timestamp(mtime.into())));
    }

    #[test]
    fn test_load_is_deterministic() {
        let mtime = UNIX_EPOCH + Duration::from_secs(42);
        let doc = "# A\n\n".to_string() + &"word ".repeat(400) + "\n\n## B\n\nmore";
        let first = loader().load_bytes(Path::new("d.md"), doc.as_bytes(), mtime).unwrap();
        let second = loader().load_bytes(Path::new("d.md"), doc.as_bytes(), mtime).unwrap();
        assert!(first.len() > 1);
        assert_eq!(first, second);
    }
}
