//! Assembly of retrieved chunks into a single context string.

use serde::Serialize;

use crate::document::SearchResult;

/// Separator placed between consecutive chunk texts.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// Concatenate chunk texts in the given order.
///
/// No re-ranking, deduplication, or truncation happens here; an empty input
/// yields an empty string, which callers treat as "no context available".
pub fn assemble<S: AsRef<str>>(retrieved: &[S]) -> String {
    retrieved.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(CONTEXT_DELIMITER)
}

/// The chunks retrieved for one question, best match first.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RetrievedContext {
    /// Search results in retrieval-rank order.
    pub results: Vec<SearchResult>,
    /// The assembled context text.
    pub text: String,
}

impl RetrievedContext {
    /// Assemble the context for `results`.
    pub fn new(results: Vec<SearchResult>) -> Self {
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        let text = assemble(&texts);
        Self { results, text }
    }

    /// Whether nothing was retrieved.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
