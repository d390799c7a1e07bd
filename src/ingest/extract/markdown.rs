use std::path::Path;

use pulldown_cmark::{Event, Parser as CmarkParser, Tag, TagEnd};
use serde_yaml_ng::Value as YamlValue;

use super::{decode_utf8, Extracted, Extractor, CONTENT_TYPE_KEY};
use crate::error::Result;
use crate::ingest::chunker::SplitterKind;
use crate::ingest::metadata::{Metadata, MODIFIED_AT_KEY, SOURCE_PATH_KEY};

/// Metadata key holding the text of the nearest preceding heading.
pub const SECTION_KEY: &str = "section";

/// Markdown extractor
///
/// Splits the body at top-level headings so each unit carries its heading
/// under `section`. A leading YAML front-matter block is removed from the text
/// and its scalar values become metadata on every unit.
pub struct MarkdownExtractor;

impl Extractor for MarkdownExtractor {
    fn can_extract(&self, extension: &str) -> bool {
        extension == "md"
    }

    fn splitter(&self) -> SplitterKind {
        SplitterKind::Markdown
    }

    fn extract(&self, bytes: &[u8], path: &Path) -> Result<Vec<Extracted>> {
        let text = decode_utf8(bytes, path)?;
        let (front_matter, body) = split_front_matter(&text);

        let mut base = Metadata::new();
        base.insert(CONTENT_TYPE_KEY, "text/markdown");
        if let Some(yaml) = front_matter {
            for (key, value) in front_matter_metadata(yaml, path).iter() {
                base.insert(key.clone(), value.clone());
            }
        }

        let units = sections(body)
            .into_iter()
            .map(|(heading, content)| {
                let mut metadata = base.clone();
                if let Some(heading) = heading {
                    metadata.insert(SECTION_KEY, heading);
                }
                Extracted { content, metadata }
            })
            .collect();

        Ok(units)
    }
}

/// Separate a `---` delimited front-matter block from the document body.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let rest = match text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, text),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }

    // Unterminated: treat the whole thing as body
    (None, text)
}

fn front_matter_metadata(yaml: &str, path: &Path) -> Metadata {
    let mut metadata = Metadata::new();

    let mapping = match serde_yaml_ng::from_str::<YamlValue>(yaml) {
        Ok(YamlValue::Mapping(mapping)) => mapping,
        Ok(YamlValue::Null) => return metadata,
        Ok(_) => {
            log::warn!("Front matter in {} is not a mapping, ignoring", path.display());
            return metadata;
        }
        Err(e) => {
            log::warn!("Invalid front matter in {}: {}", path.display(), e);
            return metadata;
        }
    };

    for (key, value) in mapping {
        let key = match key {
            YamlValue::String(key) => key,
            _ => continue,
        };
        // Inherited file keys always describe the file itself
        if key == SOURCE_PATH_KEY || key == MODIFIED_AT_KEY {
            log::debug!("Ignoring reserved front matter key '{}' in {}", key, path.display());
            continue;
        }
        match value {
            YamlValue::String(s) => metadata.insert(key, s),
            YamlValue::Bool(b) => metadata.insert(key, b),
            YamlValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    metadata.insert(key, i);
                } else if let Some(f) = n.as_f64() {
                    metadata.insert(key, f);
                }
            }
            _ => {}
        }
    }

    metadata
}

/// Split markdown at top-level headings.
///
/// Returns `(heading text, raw markdown)` pairs in document order. Text before
/// the first heading has no heading. Blank units are dropped.
fn sections(body: &str) -> Vec<(Option<String>, String)> {
    let mut starts: Vec<(usize, String)> = Vec::new();
    let mut depth = 0usize;
    let mut heading: Option<(usize, String)> = None;

    for (event, range) in CmarkParser::new(body).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { .. }) if depth == 0 => {
                heading = Some((range.start, String::new()));
                depth += 1;
            }
            Event::End(TagEnd::Heading(_)) if depth == 1 && heading.is_some() => {
                depth -= 1;
                if let Some((start, text)) = heading.take() {
                    starts.push((start, text.trim().to_string()));
                }
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, ref mut buf)) = heading {
                    buf.push_str(&text);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    let first = starts.first().map(|(start, _)| *start).unwrap_or(body.len());
    push_section(&mut out, None, &body[..first]);

    for (i, (start, text)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map(|(next, _)| *next).unwrap_or(body.len());
        push_section(&mut out, Some(text.clone()), &body[*start..end]);
    }

    out
}

fn push_section(out: &mut Vec<(Option<String>, String)>, heading: Option<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        out.push((heading, trimmed.to_string()));
    }
}
