//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] — cuts at exact character offsets
//! - [`BoundaryChunker`] — prefers paragraph, sentence, line, then word breaks
//!
//! Both share one invariant: every chunk holds at most `max_size` characters
//! and each chunk after the first starts with the last `overlap` characters
//! of its predecessor. [`reconstruct`] relies on that to rebuild the source
//! text exactly. Sizes count `char`s, never bytes.

use std::iter;

use crate::config::{ChunkerKind, RagConfig};
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Validated chunk size and overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_size: usize,
    overlap: usize,
}

impl ChunkParams {
    /// Validate a size/overlap pair.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] unless `0 < overlap < max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        if max_size == 0 || overlap == 0 {
            return Err(RagError::Config(format!(
                "chunk size ({max_size}) and overlap ({overlap}) must both be positive"
            )));
        }
        if overlap >= max_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({overlap}) must be less than chunk size ({max_size})"
            )));
        }
        Ok(Self { max_size, overlap })
    }

    /// Maximum characters per chunk.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Characters shared by consecutive chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// A strategy for splitting text into chunks.
pub trait Chunker: Send + Sync {
    /// Split text into ordered chunk texts.
    ///
    /// Returns an empty `Vec` for empty input.
    fn split(&self, text: &str) -> Vec<String>;

    /// The parameters this chunker was built with.
    fn params(&self) -> ChunkParams;

    /// Split a document into positioned [`Chunk`]s.
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk { document_id: document.id.clone(), position, text })
            .collect()
    }
}

/// Build the chunker selected by `config`.
pub fn chunker_for(config: &RagConfig) -> Result<Box<dyn Chunker>> {
    let params = ChunkParams::new(config.chunk_size, config.chunk_overlap)?;
    Ok(match config.chunker {
        ChunkerKind::Boundary => Box::new(BoundaryChunker::new(params)),
        ChunkerKind::Fixed => Box::new(FixedSizeChunker::new(params)),
    })
}

/// Split `text` with the default [`BoundaryChunker`].
///
/// # Errors
///
/// Returns [`RagError::Config`] for an invalid size/overlap pair, before
/// looking at the text.
pub fn chunk_text(text: &str, max_size: usize, overlap: usize) -> Result<Vec<String>> {
    let params = ChunkParams::new(max_size, overlap)?;
    Ok(BoundaryChunker::new(params).split(text))
}

/// Rebuild the source text from chunks produced with the given overlap.
pub fn reconstruct<S: AsRef<str>>(chunks: &[S], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let chunk = chunk.as_ref();
        if i == 0 {
            out.push_str(chunk);
        } else {
            out.extend(chunk.chars().skip(overlap));
        }
    }
    out
}

/// Splits text into fixed-size chunks by character count.
///
/// Produces the fewest chunks possible: each one starts
/// `max_size - overlap` characters after its predecessor.
///
/// # Example
///
/// ```rust
/// use docqa_rag::{ChunkParams, Chunker, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(ChunkParams::new(10, 5).unwrap());
/// assert_eq!(chunker.split("AAAAABBBBBCCCCC"), vec!["AAAAABBBBB", "BBBBBCCCCC"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    params: ChunkParams,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    pub fn new(params: ChunkParams) -> Self {
        Self { params }
    }
}

impl Chunker for FixedSizeChunker {
    fn split(&self, text: &str) -> Vec<String> {
        split_with(text, self.params, |_, _, hard_end| hard_end)
    }

    fn params(&self) -> ChunkParams {
        self.params
    }
}

/// Splits text at natural boundaries where one is available.
///
/// Within the back half of each window (and always past the overlap), the
/// chunk end is placed after the last paragraph break (`\n\n`), else after
/// the last sentence end (`.`, `!`, `?` followed by whitespace), else after
/// the last line break, else after the last whitespace. Separators stay
/// attached to the chunk they end. Without any boundary the window is cut at
/// `max_size` characters.
#[derive(Debug, Clone)]
pub struct BoundaryChunker {
    params: ChunkParams,
}

impl BoundaryChunker {
    /// Create a new `BoundaryChunker`.
    pub fn new(params: ChunkParams) -> Self {
        Self { params }
    }
}

impl Chunker for BoundaryChunker {
    fn split(&self, text: &str) -> Vec<String> {
        split_with(text, self.params, |chars, lo, hard_end| {
            BOUNDARIES
                .iter()
                .find_map(|is_boundary| {
                    (lo..=hard_end).rev().find(|&end| is_boundary(chars, end))
                })
                .unwrap_or(hard_end)
        })
    }

    fn params(&self) -> ChunkParams {
        self.params
    }
}

type BoundaryFn = fn(&[char], usize) -> bool;

/// Boundary tests in order of preference. `end` is the exclusive end index.
const BOUNDARIES: [BoundaryFn; 4] = [ends_paragraph, ends_sentence, ends_line, ends_word];

fn ends_paragraph(c: &[char], end: usize) -> bool {
    end >= 2 && c[end - 1] == '\n' && c[end - 2] == '\n'
}

fn ends_sentence(c: &[char], end: usize) -> bool {
    end >= 2 && c[end - 1].is_whitespace() && matches!(c[end - 2], '.' | '!' | '?')
}

fn ends_line(c: &[char], end: usize) -> bool {
    end >= 1 && c[end - 1] == '\n'
}

fn ends_word(c: &[char], end: usize) -> bool {
    end >= 1 && c[end - 1].is_whitespace()
}

/// Walk the text left to right, letting `choose_end` pick each chunk end
/// within `[lo, hard_end]`.
fn split_with<F>(text: &str, params: ChunkParams, choose_end: F) -> Vec<String>
where
    F: Fn(&[char], usize, usize) -> usize,
{
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(iter::once(text.len())).collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let hard_end = (start + params.max_size).min(total);
        let end = if hard_end == total {
            total
        } else {
            // Ending past `start + overlap` guarantees forward progress.
            let lo = start + (params.overlap + 1).max(params.max_size / 2);
            choose_end(&chars, lo, hard_end).clamp(lo, hard_end)
        };

        chunks.push(text[offsets[start]..offsets[end]].to_string());
        if end == total {
            break;
        }
        start = end - params.overlap;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(max: usize, overlap: usize) -> FixedSizeChunker {
        FixedSizeChunker::new(ChunkParams::new(max, overlap).unwrap())
    }

    fn boundary(max: usize, overlap: usize) -> BoundaryChunker {
        BoundaryChunker::new(ChunkParams::new(max, overlap).unwrap())
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(ChunkParams::new(10, 10).is_err());
        assert!(ChunkParams::new(10, 0).is_err());
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(chunk_text("anything", 5, 7).is_err());
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(fixed(10, 2).split("").is_empty());
        assert!(boundary(10, 2).split("").is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        assert_eq!(boundary(100, 10).split("short text."), vec!["short text."]);
        assert_eq!(fixed(11, 3).split("exactly 11!"), vec!["exactly 11!"]);
    }

    #[test]
    fn fixed_split_of_fifteen_chars() {
        assert_eq!(fixed(10, 5).split("AAAAABBBBBCCCCC"), vec!["AAAAABBBBB", "BBBBBCCCCC"]);
        assert_eq!(boundary(10, 5).split("AAAAABBBBBCCCCC"), vec!["AAAAABBBBB", "BBBBBCCCCC"]);
    }

    #[test]
    fn fixed_split_steps_by_size_minus_overlap() {
        let chunks = fixed(4, 1).split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn boundary_split_prefers_sentence_end() {
        let text = "One two three. Four five six seven.";
        let chunks = boundary(20, 3).split(text);
        assert_eq!(chunks[0], "One two three. ");
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(reconstruct(&chunks, 3), text);
    }

    #[test]
    fn boundary_split_prefers_paragraph_over_sentence() {
        let text = "Alpha beta.\n\nGamma. Delta epsilon zeta eta theta.";
        let chunks = boundary(24, 4).split(text);
        assert_eq!(chunks[0], "Alpha beta.\n\n");
        assert_eq!(reconstruct(&chunks, 4), text);
    }

    #[test]
    fn boundary_split_falls_back_to_hard_cut() {
        let text = "x".repeat(25);
        let chunks = boundary(10, 2).split(&text);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn overlap_is_exact_between_neighbours() {
        let text = "The quick brown fox jumps over the lazy dog. It was not amused at all.";
        let chunks = boundary(16, 4).split(text);
        for pair in chunks.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].chars().collect();
                chars[chars.len() - 4..].iter().collect()
            };
            assert!(pair[1].starts_with(&tail), "{:?} does not start with {tail:?}", pair[1]);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ünïcode ßtraße ñandú";
        let chunks = fixed(7, 2).split(text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn chunk_assigns_positions() {
        let doc = Document::new("notes.txt", "AAAAABBBBBCCCCC");
        let chunks = fixed(10, 5).chunk(&doc);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].position, 1);
        assert_eq!(chunks[1].document_id, "notes.txt");
    }

    #[test]
    fn chunker_for_honours_kind() {
        let config = RagConfig::builder()
            .chunk_size(10)
            .chunk_overlap(5)
            .chunker(ChunkerKind::Fixed)
            .build()
            .unwrap();
        let chunker = chunker_for(&config).unwrap();
        assert_eq!(chunker.params().max_size(), 10);
        assert_eq!(chunker.split("AAAAA BBBBBCCCCC").len(), 3);
    }
}
