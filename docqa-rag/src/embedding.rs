//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identifies the vector space an embedding belongs to.
///
/// Vectors are only comparable when both the model and the dimensionality
/// match; the index records the space it was built in and rejects others.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EmbeddingSpace {
    /// Model identifier, e.g. `text-embedding-3-small`.
    pub model: String,
    /// Length of every vector in this space.
    pub dimensions: usize,
}

impl EmbeddingSpace {
    /// Create a new embedding space descriptor.
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self { model: model.into(), dimensions }
    }
}

/// A provider that generates vector embeddings from text input.
///
/// The same provider (and therefore the same model) must serve both
/// ingestion and queries. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The returned vectors are in the same order as `texts`.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Return the model identifier.
    fn model_id(&self) -> &str;

    /// The vector space this provider embeds into.
    fn space(&self) -> EmbeddingSpace {
        EmbeddingSpace::new(self.model_id(), self.dimensions())
    }
}
