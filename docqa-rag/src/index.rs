//! In-memory vector index using cosine similarity.
//!
//! A [`VectorIndex`] is built once from a complete set of
//! [`IndexedEntry`]s and never mutated afterwards; a new ingestion run
//! builds a new index. Search is an exact scan, which is adequate for the
//! document collections a single user uploads.

use std::cmp::Ordering;

use tracing::debug;

use crate::document::{IndexedEntry, SearchResult};
use crate::embedding::EmbeddingSpace;
use crate::error::{RagError, Result};

/// An immutable collection of indexed chunks supporting nearest-neighbour search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    space: EmbeddingSpace,
    entries: Vec<IndexedEntry>,
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex {
    /// Build a fresh index from entries embedded in `space`.
    ///
    /// Entry order is preserved and used to break exact score ties.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IncompatibleQuery`] if any entry's vector length
    /// differs from `space.dimensions`.
    pub fn build(space: EmbeddingSpace, entries: Vec<IndexedEntry>) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != space.dimensions) {
            return Err(RagError::IncompatibleQuery {
                expected: space.dimensions,
                actual: bad.embedding.len(),
            });
        }
        debug!(model = %space.model, entries = entries.len(), "built vector index");
        Ok(Self { space, entries })
    }

    /// An index with no entries.
    pub fn empty(space: EmbeddingSpace) -> Self {
        Self { space, entries: Vec::new() }
    }

    /// The embedding space every entry belongs to.
    pub fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[IndexedEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that vectors from `space` can be compared against this index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IncompatibleQuery`] on a dimensionality mismatch
    /// and [`RagError::Config`] when the models differ.
    pub fn ensure_space(&self, space: &EmbeddingSpace) -> Result<()> {
        if space.dimensions != self.space.dimensions {
            return Err(RagError::IncompatibleQuery {
                expected: self.space.dimensions,
                actual: space.dimensions,
            });
        }
        if space.model != self.space.model {
            return Err(RagError::Config(format!(
                "index was built with embedding model '{}' but queries use '{}'",
                self.space.model, space.model
            )));
        }
        Ok(())
    }

    /// Return up to `k` entries most similar to `vector`, best first.
    ///
    /// Exact ties keep insertion order; NaN scores sort last.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IncompatibleQuery`] if `vector` has the wrong length.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if vector.len() != self.space.dimensions {
            return Err(RagError::IncompatibleQuery {
                expected: self.space.dimensions,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&entry.embedding, vector)))
            .collect();

        // `sort_by` is stable, so equal scores stay in insertion order.
        scored.sort_by(|a, b| compare_scores(a.1, b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: self.entries[i].chunk.clone(), score })
            .collect())
    }
}

/// Descending order with NaN treated as the worst score.
fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
