//! Gemini embedding and generation providers over the Generative Language REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Provider, ServiceConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, ServiceErrorKind};
use crate::http::{self, ServiceFailure};
use crate::llm::{GenerationSettings, LanguageModel};

/// The default Generative Language API base URL.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "Gemini";

/// Output length of the Gemini embedding models that have a fixed default.
pub fn default_dimensions(model: &str) -> Option<usize> {
    match model.trim_start_matches("models/") {
        "text-embedding-004" | "embedding-001" => Some(768),
        "gemini-embedding-001" => Some(3072),
        _ => None,
    }
}

/// How an embedding will be used, which Gemini optimizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// A passage stored in the index.
    RetrievalDocument,
    /// A question searched against the index.
    RetrievalQuery,
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") { model.to_string() } else { format!("models/{model}") }
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Batches ([`embed_batch`](EmbeddingProvider::embed_batch)) are embedded as
/// [`TaskType::RetrievalDocument`]; single texts ([`embed`](EmbeddingProvider::embed))
/// as [`TaskType::RetrievalQuery`]. Both land in the same vector space.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new("your-api-key")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    output_dimensionality: Option<usize>,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a new provider using the given API key and default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(&ServiceConfig::new(Provider::Gemini, api_key)?)
    }

    /// Create a provider from the shared service configuration.
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
            base_url: config.base_url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model: config.embedding_model.trim_start_matches("models/").to_string(),
            output_dimensionality: config.embedding_dimensions,
            dimensions,
        })
    }

    /// Set the output dimensionality (truncates the embedding vector).
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims;
        self
    }

    async fn embed_as(&self, texts: &[&str], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        let model = model_path(&self.model);
        let request_body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|&text| EmbedContentRequest {
                    model: &model,
                    content: Content { parts: vec![Part { text }] },
                    task_type,
                    output_dimensionality: self.output_dimensionality,
                })
                .collect(),
        };
        let request = self
            .client
            .post(http::endpoint(&self.base_url, &format!("{model}:batchEmbedContents")))
            .header("x-goog-api-key", &self.api_key);

        http::post_json(PROVIDER, request, &request_body)
            .await
            .and_then(|response| into_vectors(response, texts.len()))
            .map_err(|f| f.into_embedding(PROVIDER))
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

fn into_vectors(
    response: BatchEmbedResponse,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, ServiceFailure> {
    if response.embeddings.len() != expected {
        return Err(ServiceFailure::new(
            ServiceErrorKind::MalformedResponse,
            format!("expected {expected} embeddings, got {}", response.embeddings.len()),
        ));
    }
    Ok(response.embeddings.into_iter().map(|e| e.values).collect())
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_as(&[text], TaskType::RetrievalQuery).await?;
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
        self.embed_as(texts, TaskType::RetrievalDocument).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// A [`LanguageModel`] backed by the Gemini `generateContent` API.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiModel {
    /// Create a model from the shared service configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.request_timeout)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone().unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model: config.generation_model.trim_start_matches("models/").to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [UserContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct UserContent<'a> {
    role: &'a str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn into_reply(response: GenerateResponse) -> std::result::Result<String, ServiceFailure> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let message = match response.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => format!("prompt blocked: {reason}"),
            None => "response contained no candidates".to_string(),
        };
        return Err(ServiceFailure::new(ServiceErrorKind::Rejected, message));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(ServiceFailure::new(
            ServiceErrorKind::MalformedResponse,
            format!("candidate had no text (finish reason: {reason})"),
        ));
    }
    Ok(text)
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, settings: &GenerationSettings) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.len(),
            "generate content"
        );

        let request_body = GenerateRequest {
            contents: [UserContent { role: "user", parts: [Part { text: prompt }] }],
            generation_config: GenerationConfig { temperature: settings.temperature },
        };
        let path = format!("{}:generateContent", model_path(&self.model));
        let request = self
            .client
            .post(http::endpoint(&self.base_url, &path))
            .header("x-goog-api-key", &self.api_key);

        http::post_json(PROVIDER, request, &request_body)
            .await
            .and_then(into_reply)
            .map_err(|f| f.into_language_model(PROVIDER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_accept_either_form() {
        assert_eq!(model_path("text-embedding-004"), "models/text-embedding-004");
        assert_eq!(model_path("models/text-embedding-004"), "models/text-embedding-004");
        assert_eq!(default_dimensions("models/text-embedding-004"), Some(768));
    }

    #[test]
    fn embed_request_uses_camel_case_task_type() {
        let request = EmbedContentRequest {
            model: "models/text-embedding-004",
            content: Content { parts: vec![Part { text: "hello" }] },
            task_type: TaskType::RetrievalQuery,
            output_dimensionality: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["content"]["parts"][0]["text"], "hello");
        assert!(json.get("outputDimensionality").is_none());
    }

    #[test]
    fn batch_response_must_match_input_count() {
        let response: BatchEmbedResponse =
            serde_json::from_str(r#"{"embeddings": [{"values": [0.1, 0.2]}]}"#).unwrap();
        assert_eq!(into_vectors(response, 1).unwrap(), vec![vec![0.1, 0.2]]);

        let response: BatchEmbedResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(
            into_vectors(response, 2).unwrap_err().kind,
            ServiceErrorKind::MalformedResponse
        );
    }

    #[test]
    fn reply_parts_are_concatenated() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [
                {"text": "Paris"}, {"text": " is the capital."}]},
                "finishReason": "STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(into_reply(response).unwrap(), "Paris is the capital.");
    }

    #[test]
    fn blocked_prompt_is_rejected() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        let failure = into_reply(response).unwrap_err();
        assert_eq!(failure.kind, ServiceErrorKind::Rejected);
        assert!(failure.message.contains("SAFETY"));
    }

    #[test]
    fn empty_candidate_is_malformed() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#).unwrap();
        let failure = into_reply(response).unwrap_err();
        assert_eq!(failure.kind, ServiceErrorKind::MalformedResponse);
        assert!(failure.message.contains("MAX_TOKENS"));
    }

    #[test]
    fn output_dimensionality_overrides_model_default() {
        let provider = GeminiEmbeddingProvider::new("key").unwrap().with_output_dimensionality(256);
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.output_dimensionality, Some(256));
    }

    #[test]
    fn provider_uses_configured_dimensions() {
        let config = ServiceConfig::new(Provider::Gemini, "key").unwrap();
        let provider = GeminiEmbeddingProvider::from_config(&config).unwrap();
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.model_id(), "text-embedding-004");
    }
}
