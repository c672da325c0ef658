//! Data types for documents, chunks, indexed entries, and search results.

use serde::{Deserialize, Serialize};

/// The extracted plain text of one source document.
///
/// Consumed once by the chunker; the pipeline does not retain it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Name used in logs and error reports (usually the file name).
    pub id: String,
    /// The full extracted text.
    pub text: String,
}

impl Document {
    /// Create a document from an id and its text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// A contiguous, bounded segment of a [`Document`]'s text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Chunk {
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Ordinal position of this chunk within its document, starting at zero.
    pub position: usize,
    /// The text content of the chunk.
    pub text: String,
}

/// A chunk paired with its embedding vector.
///
/// Texts and vectors are stored together so they can never drift out of
/// alignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IndexedEntry {
    /// The indexed chunk.
    pub chunk: Chunk,
    /// The chunk's embedding.
    pub embedding: Vec<f32>,
}

impl IndexedEntry {
    /// The chunk text.
    pub fn text(&self) -> &str {
        &self.chunk.text
    }
}

/// A retrieved [`IndexedEntry`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The chunk that matched.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}
