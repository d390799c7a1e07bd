use serde::{Deserialize, Serialize};

use super::metadata::Metadata;

/// A chunk of extracted text plus its metadata; the unit that gets embedded and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
    pub metadata: Metadata,
}

impl Passage {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}
