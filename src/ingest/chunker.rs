use pulldown_cmark::{CodeBlockKind, Event, Parser as CmarkParser, Tag};

use crate::config::ChunkingConfig;

/// Separators tried in order by the recursive splitter; `""` splits per character.
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Chunking strategy chosen per file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitterKind {
    /// Block-aware splitting for markdown sources
    Markdown,
    /// Generic separator-driven splitting
    Recursive,
}

impl SplitterKind {
    pub fn build(self, config: ChunkingConfig) -> Box<dyn Splitter> {
        match self {
            SplitterKind::Markdown => Box::new(MarkdownSplitter::new(config)),
            SplitterKind::Recursive => Box::new(RecursiveSplitter::new(config)),
        }
    }
}

/// Splits text into chunks of at most `chunk_size` characters (where possible)
/// with `chunk_overlap` characters carried between neighbours.
pub trait Splitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursive character splitter
///
/// Splits on the first separator present in the text, merges the pieces back
/// up to `chunk_size`, and recurses with the remaining separators into any
/// piece that is still too large.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl RecursiveSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    fn split_with(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let mut chunks = Vec::new();

        let (separator, rest) = match separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
        {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut good: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }

            if !good.is_empty() {
                chunks.extend(merge_splits(&good, separator, self.chunk_size, self.chunk_overlap));
                good.clear();
            }

            if rest.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, rest));
            }
        }

        if !good.is_empty() {
            chunks.extend(merge_splits(&good, separator, self.chunk_size, self.chunk_overlap));
        }

        chunks
    }
}

impl Splitter for RecursiveSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_with(text, &self.separators)
    }
}

/// Greedily join `splits` with `separator` into chunks no longer than
/// `chunk_size`, starting each new chunk with a tail of the previous one no
/// longer than `chunk_overlap`.
fn merge_splits(splits: &[&str], separator: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut docs = Vec::new();
    let mut current: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for split in splits {
        let split_len = char_len(split);
        let with_split = total + split_len + if current.is_empty() { 0 } else { sep_len };

        if with_split > chunk_size && !current.is_empty() {
            if total > chunk_size {
                log::warn!("Created a chunk of size {}, which is longer than the specified {}", total, chunk_size);
            }
            push_joined(&mut docs, &current, separator);

            while should_pop(&current, total, split_len, sep_len, chunk_size, chunk_overlap) {
                if let Some(front) = current.pop_front() {
                    total -= char_len(front);
                    if !current.is_empty() {
                        total -= sep_len;
                    }
                }
            }
        }

        current.push_back(split);
        total += split_len;
        if current.len() > 1 {
            total += sep_len;
        }
    }

    push_joined(&mut docs, &current, separator);
    docs
}

fn should_pop(
    current: &std::collections::VecDeque<&str>,
    total: usize,
    split_len: usize,
    sep_len: usize,
    chunk_size: usize,
    chunk_overlap: usize,
) -> bool {
    let sep_len = if current.len() < 2 { 0 } else { sep_len };
    !current.is_empty()
        && (total > chunk_overlap || (total + split_len + sep_len > chunk_size && total > 0))
}

fn push_joined(docs: &mut Vec<String>, parts: &std::collections::VecDeque<&str>, separator: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Markdown-aware splitter
///
/// Works on top-level markdown blocks (paragraphs, lists, tables, code
/// blocks, headings) so chunk boundaries fall between blocks. Blocks that
/// exceed the chunk size are split recursively, except fenced code blocks
/// when `keep_code_blocks` is set, which are emitted whole.
#[derive(Debug, Clone)]
pub struct MarkdownSplitter {
    recursive: RecursiveSplitter,
    keep_code_blocks: bool,
}

impl MarkdownSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            recursive: RecursiveSplitter::new(config),
            keep_code_blocks: config.keep_code_blocks,
        }
    }

    fn flush(&self, chunks: &mut Vec<String>, pending: &mut Vec<&str>) {
        if !pending.is_empty() {
            chunks.extend(merge_splits(
                pending,
                "\n\n",
                self.recursive.chunk_size,
                self.recursive.chunk_overlap,
            ));
            pending.clear();
        }
    }
}

impl Splitter for MarkdownSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for block in top_level_blocks(text) {
            let raw = text[block.start..block.end].trim();
            if raw.is_empty() {
                continue;
            }

            if char_len(raw) <= self.recursive.chunk_size {
                pending.push(raw);
                continue;
            }

            self.flush(&mut chunks, &mut pending);
            if block.fenced_code && self.keep_code_blocks {
                chunks.push(raw.to_string());
            } else {
                chunks.extend(self.recursive.split(raw));
            }
        }

        self.flush(&mut chunks, &mut pending);
        chunks
    }
}

struct Block {
    start: usize,
    end: usize,
    fenced_code: bool,
}

/// Byte ranges of the top-level blocks of a markdown document, in order.
fn top_level_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;

    for (event, range) in CmarkParser::new(text).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    blocks.push(Block {
                        start: range.start,
                        end: range.end,
                        fenced_code: matches!(tag, Tag::CodeBlock(CodeBlockKind::Fenced(_))),
                    });
                }
                depth += 1;
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            // Leaf events outside any container, e.g. a thematic break
            Event::Rule | Event::Html(_) if depth == 0 => blocks.push(Block {
                start: range.start,
                end: range.end,
                fenced_code: false,
            }),
            _ => {}
        }
    }

    blocks
}
