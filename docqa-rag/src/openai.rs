//! OpenAI embedding and chat providers.
//!
//! This module is only available when the `openai` feature is enabled.
//! Any OpenAI-compatible server can be used by overriding the base URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Provider, ServiceConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, ServiceErrorKind};
use crate::http::{self, ServiceFailure};
use crate::llm::{GenerationSettings, LanguageModel};

/// The default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

/// Output length of the OpenAI embedding models that have a fixed default.
pub fn default_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or [`ServiceConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(&ServiceConfig::new(Provider::OpenAI, api_key)?)
    }

    /// Create a provider from the shared service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedding model's output length
    /// is unknown and `embedding_dimensions` is not set.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let dimensions = config
            .embedding_dimensions
            .or_else(|| default_dimensions(&config.embedding_model))
            .ok_or_else(|| {
                RagError::Config(format!(
                    "unknown output length for embedding model '{}'; \
                     set DOCQA_EMBEDDING_DIMENSIONS",
                    config.embedding_model
                ))
            })?;

        Ok(Self {
            client: http::build_client(config.request_timeout)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.embedding_model.clone(),
            dimensions,
            request_dimensions: config.embedding_dimensions,
        })
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Order the returned vectors by their `index`, checking one came back per input.
fn into_vectors(
    response: EmbeddingResponse,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ServiceFailure> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(ServiceFailure::new(
            ServiceErrorKind::MalformedResponse,
            format!("expected {expected} embeddings, got {}", data.len()),
        ));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| {
            ServiceFailure::new(ServiceErrorKind::MalformedResponse, "API returned empty response")
                .into_embedding(PROVIDER)
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let request = self
            .client
            .post(http::endpoint(&self.base_url, "embeddings"))
            .bearer_auth(&self.api_key);

        http::post_json(PROVIDER, request, &request_body)
            .await
            .and_then(|response| into_vectors(response, texts.len()))
            .map_err(|f| f.into_embedding(PROVIDER))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// A [`LanguageModel`] backed by the OpenAI chat completions API.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIChatModel {
    /// Create a chat model from the shared service configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.request_timeout)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.generation_model.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn into_reply(response: ChatResponse) -> std::result::Result<String, ServiceFailure> {
    let reply = response.choices.into_iter().next().map(|c| c.message).ok_or_else(|| {
        ServiceFailure::new(ServiceErrorKind::MalformedResponse, "response contained no choices")
    })?;
    match (reply.content, reply.refusal) {
        (Some(content), _) => Ok(content),
        (None, Some(refusal)) => {
            let message = format!("model refused: {refusal}");
            Err(ServiceFailure::new(ServiceErrorKind::Rejected, message))
        }
        (None, None) => {
            Err(ServiceFailure::new(ServiceErrorKind::MalformedResponse, "reply had no content"))
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, settings: &GenerationSettings) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.len(),
            "chat completion"
        );

        let request_body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: settings.temperature,
        };
        let request = self
            .client
            .post(http::endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key);

        http::post_json(PROVIDER, request, &request_body)
            .await
            .and_then(into_reply)
            .map_err(|f| f.into_language_model(PROVIDER))
    }
}
