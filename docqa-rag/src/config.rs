//! Configuration for the RAG pipeline and the remote services it calls.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Which chunking strategy ingestion uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkerKind {
    /// Prefer paragraph, sentence, then word boundaries.
    #[default]
    Boundary,
    /// Cut at exact character offsets.
    Fixed,
}

/// What the answer generator does when retrieval returns nothing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Answer with the not-available sentinel without calling the model.
    #[default]
    SentinelOnly,
    /// Send the grounding prompt with an empty context anyway.
    InvokeModel,
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Chunking strategy.
    pub chunker: ChunkerKind,
    /// Number of chunk texts sent per embedding request.
    pub embed_batch_size: usize,
    /// Maximum number of embedding requests in flight during ingestion.
    pub embed_concurrency: usize,
    /// Behaviour when no context was retrieved.
    pub empty_context: EmptyContextPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            chunk_overlap: 1_000,
            top_k: 4,
            chunker: ChunkerKind::Boundary,
            embed_batch_size: 64,
            embed_concurrency: 4,
            empty_context: EmptyContextPolicy::SentinelOnly,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k`, `embed_batch_size`, or `embed_concurrency` is zero
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap == 0 {
            return Err(RagError::Config("chunk_overlap must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than zero".to_string()));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::Config(
                "embed_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the chunking strategy.
    pub fn chunker(mut self, kind: ChunkerKind) -> Self {
        self.config.chunker = kind;
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the number of embedding requests allowed in flight.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Set the behaviour when retrieval returns no context.
    pub fn empty_context(mut self, policy: EmptyContextPolicy) -> Self {
        self.config.empty_context = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// A remote provider for embeddings and generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    /// Provider-specific environment variable holding the API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
        }
    }

    /// Default embedding model for this provider.
    pub fn default_embedding_model(self) -> &'static str {
        match self {
            Self::OpenAI => "text-embedding-3-small",
            Self::Gemini => "text-embedding-004",
        }
    }

    /// Default generation model for this provider.
    pub fn default_generation_model(self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Gemini => "gemini-2.0-flash",
        }
    }
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(RagError::Config(format!(
                "unknown provider '{other}' (expected 'openai' or 'gemini')"
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => f.write_str("openai"),
            Self::Gemini => f.write_str("gemini"),
        }
    }
}

/// Credentials and model identifiers for the remote services.
///
/// The same `embedding_model` must be used for ingestion and for queries;
/// the index records it and queries against a different model are rejected.
#[derive(Clone, PartialEq)]
pub struct ServiceConfig {
    /// Which provider to call.
    pub provider: Provider,
    /// API key for the provider.
    pub api_key: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Requested embedding length, for models that can shorten their output.
    pub embedding_dimensions: Option<usize>,
    /// Generation model identifier.
    pub generation_model: String,
    /// Override for the provider's API base URL.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Delay before the single retry of a transient failure.
    pub retry_backoff: Duration,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("generation_model", &self.generation_model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl ServiceConfig {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    /// Default delay before retrying a transient failure.
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

    /// Create a config with the provider's default models.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `api_key` is empty.
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Config(format!("{provider} API key must not be empty")));
        }
        Ok(Self {
            provider,
            api_key,
            embedding_model: provider.default_embedding_model().to_string(),
            embedding_dimensions: None,
            generation_model: provider.default_generation_model().to_string(),
            base_url: None,
            request_timeout: Self::DEFAULT_TIMEOUT,
            retry_backoff: Self::DEFAULT_RETRY_BACKOFF,
        })
    }

    /// Read the configuration from the process environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `DOCQA_PROVIDER` | `openai` (default) or `gemini` |
    /// | `DOCQA_API_KEY` | API key, else `OPENAI_API_KEY` / `GOOGLE_API_KEY` |
    /// | `DOCQA_EMBEDDING_MODEL` | overrides the default embedding model |
    /// | `DOCQA_EMBEDDING_DIMENSIONS` | requested embedding length |
    /// | `DOCQA_GENERATION_MODEL` | overrides the default generation model |
    /// | `DOCQA_BASE_URL` | overrides the API base URL |
    /// | `DOCQA_TIMEOUT_SECS` | per-request timeout in seconds |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("DOCQA_PROVIDER") {
            Some(value) => value.parse()?,
            None => Provider::OpenAI,
        };
        let api_key = get("DOCQA_API_KEY").or_else(|| get(provider.api_key_var())).ok_or_else(
            || {
                RagError::Config(format!(
                    "no API key configured: set DOCQA_API_KEY or {}",
                    provider.api_key_var()
                ))
            },
        )?;

        let mut config = Self::new(provider, api_key)?;
        if let Some(model) = get("DOCQA_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dims) = get("DOCQA_EMBEDDING_DIMENSIONS") {
            let dims: usize = dims.trim().parse().ok().filter(|d| *d > 0).ok_or_else(|| {
                RagError::Config(format!(
                    "DOCQA_EMBEDDING_DIMENSIONS must be a positive integer, got '{dims}'"
                ))
            })?;
            config.embedding_dimensions = Some(dims);
        }
        if let Some(model) = get("DOCQA_GENERATION_MODEL") {
            config.generation_model = model;
        }
        config.base_url = get("DOCQA_BASE_URL");
        if let Some(secs) = get("DOCQA_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().ok().filter(|s| *s > 0).ok_or_else(|| {
                RagError::Config(format!(
                    "DOCQA_TIMEOUT_SECS must be a positive integer, got '{secs}'"
                ))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Set the embedding model.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Request embeddings of `dims` components.
    pub fn with_embedding_dimensions(mut self, dims: usize) -> Self {
        self.embedding_dimensions = Some(dims);
        self
    }

    /// Set the generation model.
    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
