//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-answer workflow by
//! composing an [`EmbeddingProvider`], an [`IndexStore`], a [`Chunker`],
//! and a [`LanguageModel`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{FileIndexStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .index_store(Arc::new(FileIndexStore::new("data/index.json")))
//!     .language_model(Arc::new(my_model))
//!     .build()?;
//!
//! pipeline.ingest(&documents).await?;
//! let answer = pipeline.ask("What does the contract say about renewals?").await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::answer::{Answer, AnswerGenerator};
use crate::chunking::{Chunker, chunker_for};
use crate::config::RagConfig;
use crate::context::RetrievedContext;
use crate::document::{Chunk, Document, IndexedEntry};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, ServiceErrorKind, Stage};
use crate::extract::{PlainTextExtractor, TextExtractor};
use crate::index::VectorIndex;
use crate::llm::LanguageModel;
use crate::retry::with_single_retry;
use crate::store::IndexStore;

/// A document that could not be ingested.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedDocument {
    /// The document's name.
    pub document: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents that were chunked and indexed.
    pub documents: usize,
    /// Chunks in the new index.
    pub chunks: usize,
    /// Documents that failed extraction and were left out.
    pub skipped: Vec<SkippedDocument>,
    /// Where the index was persisted.
    pub location: String,
}

/// The RAG pipeline orchestrator.
///
/// Ingestion (chunk → embed → build → persist) always produces a complete
/// new index that replaces the previous one. Queries (embed → search →
/// assemble → generate) read the most recently persisted index, cached in
/// memory behind an [`RwLock`] and swapped only after the new index is
/// durable, so readers never observe a partially built index. Persisting and
/// swapping happen under one lock, so concurrent ingestions leave the cache
/// and the store holding the same run. Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index_store: Arc<dyn IndexStore>,
    chunker: Arc<dyn Chunker>,
    extractor: Arc<dyn TextExtractor>,
    answer_generator: Option<AnswerGenerator>,
    retry_backoff: Duration,
    current: RwLock<Option<Arc<VectorIndex>>>,
    publish: Mutex<()>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the index store.
    pub fn index_store(&self) -> &Arc<dyn IndexStore> {
        &self.index_store
    }

    /// Extract, then ingest, the files at `paths`.
    ///
    /// Files that fail extraction are logged and listed in
    /// [`IngestReport::skipped`]; the remaining files are still ingested.
    ///
    /// # Errors
    ///
    /// Returns a [`RagError::Extraction`] tagged with [`Stage::Extraction`]
    /// if every path failed, leaving the previous index in place. Otherwise
    /// see [`ingest`](Self::ingest).
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let mut documents = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();

        for path in paths {
            match self.extractor.extract(path).await {
                Ok(document) => documents.push(document),
                Err(e) => {
                    let document = match &e {
                        RagError::Extraction { document, .. } => document.clone(),
                        _ => path.display().to_string(),
                    };
                    warn!(document = %document, error = %e, "skipping document");
                    skipped.push(SkippedDocument { document, reason: e.to_string() });
                }
            }
        }

        if documents.is_empty() {
            if let Some(first) = skipped.first() {
                error!(skipped = skipped.len(), "no document could be extracted");
                let err = RagError::Extraction {
                    document: first.document.clone(),
                    message: format!(
                        "none of the {} documents could be extracted, previous index kept",
                        skipped.len()
                    ),
                };
                return Err(err.at(Stage::Extraction));
            }
        }

        let mut report = self.ingest(&documents).await?;
        report.skipped = skipped;
        Ok(report)
    }

    /// Ingest `documents`, replacing the persisted index.
    ///
    /// An empty slice produces (and persists) an empty index.
    ///
    /// # Errors
    ///
    /// Returns a [`RagError::Pipeline`] tagged with the failing stage if
    /// embedding, index construction, or persistence fails. The previously
    /// persisted index is left untouched in that case.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        // 1. Chunk every document
        let mut chunks: Vec<Chunk> = Vec::new();
        for document in documents {
            let document_chunks = self.chunker.chunk(document);
            info!(
                document = %document.id,
                chunk_count = document_chunks.len(),
                "chunked document"
            );
            chunks.extend(document_chunks);
        }

        // 2. Embed the chunks, preserving order
        let embeddings = self.embed_chunks(&chunks).await.map_err(|e| e.at(Stage::Embedding))?;

        // 3. Build a fresh index
        let entries: Vec<IndexedEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedEntry { chunk, embedding })
            .collect();
        let index = VectorIndex::build(self.embedding_provider.space(), entries)
            .map_err(|e| e.at(Stage::Indexing))?;

        // 4. Persist, then publish to readers. Held until the swap so the
        // cache always matches what is on disk.
        let _publish = self.publish.lock().await;
        self.index_store.persist(&index).await.map_err(|e| {
            error!(error = %e, "failed to persist index");
            e.at(Stage::Persistence)
        })?;

        let report = IngestReport {
            documents: documents.len(),
            chunks: index.len(),
            skipped: Vec::new(),
            location: self.index_store.location(),
        };
        *self.current.write().await = Some(Arc::new(index));

        info!(
            documents = report.documents,
            chunks = report.chunks,
            location = %report.location,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let provider = &self.embedding_provider;
        let backoff = self.retry_backoff;
        let expected_dims = provider.dimensions();

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(chunks.chunks(self.config.embed_batch_size))
            .map(|batch| async move {
                let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
                let texts = texts.as_slice();
                let vectors =
                    with_single_retry("embed_batch", backoff, move || provider.embed_batch(texts))
                        .await
                        .inspect_err(|e| {
                            let first = &batch[0];
                            error!(
                                document = %first.document_id,
                                position = first.position,
                                batch_size = batch.len(),
                                error = %e,
                                "embedding failed during ingestion"
                            );
                        })?;
                check_batch(provider.model_id(), batch.len(), expected_dims, &vectors)?;
                Ok::<_, RagError>(vectors)
            })
            .buffered(self.config.embed_concurrency)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// The current index, loading it from the store on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexNotFound`] before the first ingestion and
    /// [`RagError::IndexCorrupt`] if the stored index is unusable.
    pub async fn index(&self) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }

        let mut current = self.current.write().await;
        if let Some(index) = current.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(self.load_checked().await?);
        *current = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Drop the cached index and read the store again.
    ///
    /// Use this to pick up an ingestion run performed by another process.
    pub async fn reload(&self) -> Result<Arc<VectorIndex>> {
        let _publish = self.publish.lock().await;
        let index = Arc::new(self.load_checked().await?);
        *self.current.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    async fn load_checked(&self) -> Result<VectorIndex> {
        let index = self.index_store.load().await?;
        index.ensure_space(&self.embedding_provider.space()).map_err(|e| {
            RagError::IndexCorrupt { location: self.index_store.location(), message: e.to_string() }
        })?;
        Ok(index)
    }

    /// Retrieve the `top_k` chunks most relevant to `question`.
    ///
    /// # Errors
    ///
    /// Propagates index loading errors unchanged; embedding failures are
    /// tagged with [`Stage::Retrieval`].
    pub async fn retrieve(&self, question: &str) -> Result<RetrievedContext> {
        let index = self.index().await?;
        if index.is_empty() {
            info!(result_count = 0, "index is empty, nothing to retrieve");
            return Ok(RetrievedContext::default());
        }

        let provider = &self.embedding_provider;
        let query_embedding =
            with_single_retry("embed", self.retry_backoff, || provider.embed(question))
                .await
                .map_err(|e| {
                    error!(error = %e, "embedding failed during query");
                    e.at(Stage::Retrieval)
                })?;

        let results = index
            .query(&query_embedding, self.config.top_k)
            .map_err(|e| e.at(Stage::Retrieval))?;

        info!(top_k = self.config.top_k, result_count = results.len(), "retrieval completed");
        Ok(RetrievedContext::new(results))
    }

    /// Answer `question` from the indexed documents.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the pipeline was built without a
    /// language model, any error from [`retrieve`](Self::retrieve), or a
    /// [`RagError::LanguageModel`] tagged with [`Stage::Generation`].
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let generator = self.answer_generator.as_ref().ok_or_else(|| {
            RagError::Config("a language model is required to answer questions".to_string())
        })?;
        let context = self.retrieve(question).await?;
        generator.generate(question, context).await.map_err(|e| e.at(Stage::Generation))
    }
}

fn check_batch(
    provider: &str,
    expected_len: usize,
    expected_dims: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected_len {
        return Err(RagError::Embedding {
            provider: provider.to_string(),
            kind: ServiceErrorKind::MalformedResponse,
            message: format!("expected {expected_len} embeddings, got {}", vectors.len()),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dims) {
        return Err(RagError::Embedding {
            provider: provider.to_string(),
            kind: ServiceErrorKind::MalformedResponse,
            message: format!(
                "embedding has {} dimensions, provider reports {expected_dims}",
                bad.len()
            ),
        });
    }
    Ok(())
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider`, and `index_store` are required. The
/// chunker defaults to the one selected by [`RagConfig::chunker`], the
/// extractor to [`PlainTextExtractor`]. Without a language model the
/// pipeline can ingest and retrieve but not [`ask`](RagPipeline::ask).
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .index_store(Arc::new(store))
///     .language_model(Arc::new(model))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    index_store: Option<Arc<dyn IndexStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    retry_backoff: Option<Duration>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set where the index is persisted.
    pub fn index_store(mut self, store: Arc<dyn IndexStore>) -> Self {
        self.index_store = Some(store);
        self
    }

    /// Override the chunker selected by the configuration.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Override the text extractor used by [`RagPipeline::ingest_paths`].
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the language model used to answer questions.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Set the delay before retrying a transient service failure.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration and that all
    /// required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let index_store = self
            .index_store
            .ok_or_else(|| RagError::Config("index_store is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::from(chunker_for(&config)?),
        };
        let extractor = self.extractor.unwrap_or_else(|| Arc::new(PlainTextExtractor));
        let retry_backoff = self.retry_backoff.unwrap_or(Duration::from_millis(500));
        let answer_generator = self.language_model.map(|model| {
            AnswerGenerator::new(model)
                .with_empty_context(config.empty_context)
                .with_retry_backoff(retry_backoff)
        });

        Ok(RagPipeline {
            config,
            embedding_provider,
            index_store,
            chunker,
            extractor,
            answer_generator,
            retry_backoff,
            current: RwLock::new(None),
            publish: Mutex::new(()),
        })
    }
}
