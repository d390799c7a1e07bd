//! Passage metadata: a string-keyed map of typed scalar values.
//!
//! Extractors are free to attach whatever keys they like, so reads go through
//! typed accessors that fail with [`RagsyncError::MetadataType`] instead of
//! assuming a shape.

use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagsyncError, Result};

/// Key holding the originating file path.
pub const SOURCE_PATH_KEY: &str = "source_path";
/// Key holding the originating file's mtime at load time.
pub const MODIFIED_AT_KEY: &str = "modified_at";

/// A scalar metadata value.
///
/// Serialized as `{"type": ..., "value": ...}` so a timestamp never comes back
/// from the store as a plain string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl MetadataValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::String(_) => "string",
            MetadataValue::Integer(_) => "integer",
            MetadataValue::Float(_) => "float",
            MetadataValue::Bool(_) => "bool",
            MetadataValue::Timestamp(_) => "timestamp",
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Integer(n)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Float(n)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(t: DateTime<Utc>) -> Self {
        MetadataValue::Timestamp(t)
    }
}

impl From<SystemTime> for MetadataValue {
    fn from(t: SystemTime) -> Self {
        MetadataValue::Timestamp(DateTime::<Utc>::from(t))
    }
}

/// Metadata attached to a passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// Fill in `inherited` keys that are not already present.
    ///
    /// Values already in `self` (set by an extractor) win on collision.
    pub fn inherit(&mut self, inherited: &Metadata) {
        for (key, value) in inherited.iter() {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// String value for `key`.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            MetadataValue::String(s) => Ok(s),
            other => Err(type_error(key, "string", other)),
        }
    }

    /// Timestamp value for `key`.
    pub fn get_timestamp(&self, key: &str) -> Result<DateTime<Utc>> {
        match self.require(key)? {
            MetadataValue::Timestamp(t) => Ok(*t),
            other => Err(type_error(key, "timestamp", other)),
        }
    }

    pub fn source_path(&self) -> Result<&str> {
        self.get_str(SOURCE_PATH_KEY)
    }

    pub fn modified_at(&self) -> Result<DateTime<Utc>> {
        self.get_timestamp(MODIFIED_AT_KEY)
    }

    fn require(&self, key: &str) -> Result<&MetadataValue> {
        self.0.get(key).ok_or_else(|| RagsyncError::MetadataType {
            key: key.to_string(),
            expected: "a value",
            found: "nothing".to_string(),
        })
    }
}

fn type_error(key: &str, expected: &'static str, found: &MetadataValue) -> RagsyncError {
    RagsyncError::MetadataType {
        key: key.to_string(),
        expected,
        found: found.type_name().to_string(),
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Metadata(iter.into_iter().collect())
    }
}

/// The two keys every passage inherits from its file.
pub fn file_metadata(source_path: &str, modified: SystemTime) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_PATH_KEY, source_path);
    metadata.insert(MODIFIED_AT_KEY, modified);
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_typed_accessors() {
        let mtime = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let metadata = file_metadata("docs/a.md", mtime);

        assert_eq!(metadata.source_path().unwrap(), "docs/a.md");
        assert_eq!(metadata.modified_at().unwrap(), DateTime::<Utc>::from(mtime));
    }

    #[test]
    fn test_wrong_type_is_metadata_type_error() {
        let mut metadata = Metadata::new();
        metadata.insert(MODIFIED_AT_KEY, "2024-01-01 00:00:00");

        let err = metadata.modified_at().unwrap_err();
        match err {
            RagsyncError::MetadataType { key, expected, found } => {
                assert_eq!(key, MODIFIED_AT_KEY);
                assert_eq!(expected, "timestamp");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_is_metadata_type_error() {
        let metadata = Metadata::new();
        assert!(matches!(
            metadata.source_path(),
            Err(RagsyncError::MetadataType { .. })
        ));
    }

    #[test]
    fn test_inherit_keeps_existing_values() {
        let mut extracted = Metadata::new();
        extracted.insert("title", "Intro");
        extracted.insert(SOURCE_PATH_KEY, "override.md");

        extracted.inherit(&file_metadata("docs/a.md", UNIX_EPOCH));

        assert_eq!(extracted.get_str("title").unwrap(), "Intro");
        assert_eq!(extracted.source_path().unwrap(), "override.md");
        assert!(extracted.contains_key(MODIFIED_AT_KEY));
        assert_eq!(extracted.len(), 3);
    }

    #[test]
    fn test_json_keeps_value_types() {
        let mtime = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let mut metadata = file_metadata("docs/a.md", mtime);
        metadata.insert("page", 3i64);

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains(r#""source_path":{"type":"string","value":"docs/a.md"}"#));

        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
        assert_eq!(back.modified_at().unwrap(), DateTime::<Utc>::from(mtime));
    }
}
