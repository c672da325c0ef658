//! # docqa-rag
//!
//! Question answering over a private document collection.
//!
//! ## Overview
//!
//! Documents are split into overlapping chunks, embedded, and stored in a
//! persisted vector index. A question is embedded with the same model, the
//! closest chunks are assembled into a context, and a language model answers
//! from that context alone. When the context lacks the answer the reply is
//! [`NOT_AVAILABLE_SENTINEL`].
//!
//! | Component | Entry point |
//! |-----------|-------------|
//! | Chunker | [`Chunker`], [`chunk_text`] |
//! | Embedding client | [`EmbeddingProvider`] |
//! | Vector index | [`VectorIndex`], [`IndexStore`] |
//! | Context assembler | [`assemble`], [`RetrievedContext`] |
//! | Answer generator | [`AnswerGenerator`] |
//!
//! [`RagPipeline`] wires them together.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{providers, FileIndexStore, RagConfig, RagPipeline, ServiceConfig};
//!
//! let service = ServiceConfig::from_env()?;
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(providers::embedding_provider(&service)?)
//!     .language_model(providers::language_model(&service)?)
//!     .index_store(Arc::new(FileIndexStore::new("docqa-index.json")))
//!     .build()?;
//!
//! pipeline.ingest_paths(&paths).await?;
//! let answer = pipeline.ask("When does the lease end?").await?;
//! println!("{}", answer.text);
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`], [`openai::OpenAIChatModel`] |
//! | `gemini` | [`gemini::GeminiEmbeddingProvider`], [`gemini::GeminiModel`] |

pub mod answer;
pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod store;

#[cfg(any(feature = "openai", feature = "gemini"))]
mod http;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use answer::{
    Answer, AnswerGenerator, AnswerState, AnswerTrace, NOT_AVAILABLE_SENTINEL, grounding_prompt,
};
pub use chunking::{
    BoundaryChunker, ChunkParams, Chunker, FixedSizeChunker, chunk_text, chunker_for, reconstruct,
};
pub use config::{
    ChunkerKind, EmptyContextPolicy, Provider, RagConfig, RagConfigBuilder, ServiceConfig,
};
pub use context::{CONTEXT_DELIMITER, RetrievedContext, assemble};
pub use document::{Chunk, Document, IndexedEntry, SearchResult};
pub use embedding::{EmbeddingProvider, EmbeddingSpace};
pub use error::{RagError, Result, ServiceErrorKind, Stage};
pub use extract::{PlainTextExtractor, TextExtractor};
pub use index::{VectorIndex, cosine_similarity};
pub use llm::{GenerationSettings, LanguageModel};
pub use pipeline::{IngestReport, RagPipeline, RagPipelineBuilder, SkippedDocument};
pub use store::{FileIndexStore, InMemoryIndexStore, IndexStore};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbeddingProvider, GeminiModel};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
