//! HTTP plumbing shared by the hosted providers.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{RagError, Result, ServiceErrorKind};

/// A failed call, before it is attributed to embedding or generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServiceFailure {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceFailure {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn into_embedding(self, provider: &str) -> RagError {
        RagError::Embedding {
            provider: provider.to_string(),
            kind: self.kind,
            message: self.message,
        }
    }

    pub fn into_language_model(self, provider: &str) -> RagError {
        RagError::LanguageModel {
            provider: provider.to_string(),
            kind: self.kind,
            message: self.message,
        }
    }
}

/// Error body returned by both OpenAI and Gemini.
#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Build a client with the configured per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))
}

/// The human-readable message in an error body, else the body itself.
pub(crate) fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body).map(|e| e.error.message).unwrap_or_else(|_| {
        let trimmed = body.trim();
        if trimmed.is_empty() { "empty response body".to_string() } else { trimmed.to_string() }
    })
}

/// Classify a non-success response.
pub(crate) fn status_failure(status: u16, body: &str) -> ServiceFailure {
    let detail = error_detail(body);
    ServiceFailure::new(
        ServiceErrorKind::from_status(status, &detail),
        format!("API returned {status}: {detail}"),
    )
}

/// Parse a success body into `R`.
pub(crate) fn parse_body<R>(body: &str) -> std::result::Result<R, ServiceFailure>
where
    R: DeserializeOwned,
{
    serde_json::from_str(body).map_err(|e| {
        ServiceFailure::new(
            ServiceErrorKind::MalformedResponse,
            format!("failed to parse response: {e}"),
        )
    })
}

/// Send `body` as JSON and decode the JSON reply.
pub(crate) async fn post_json<B, R>(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &B,
) -> std::result::Result<R, ServiceFailure>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request.json(body).send().await.map_err(|e| {
        error!(provider = %provider, error = %e, "request failed");
        ServiceFailure::new(ServiceErrorKind::from_reqwest(&e), format!("request failed: {e}"))
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| {
        error!(provider = %provider, %status, error = %e, "failed to read response body");
        let kind = ServiceErrorKind::from_reqwest(&e);
        ServiceFailure::new(kind, format!("failed to read response: {e}"))
    })?;

    if !status.is_success() {
        let failure = status_failure(status.as_u16(), &text);
        error!(provider = %provider, %status, kind = %failure.kind, "API error");
        return Err(failure);
    }

    parse_body(&text).inspect_err(|f| {
        error!(provider = %provider, error = %f.message, "unexpected response shape");
    })
}

/// Join `base` and `path` with exactly one slash.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_prefers_structured_message() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid"}}"#;
        assert_eq!(error_detail(body), "Incorrect API key provided");
        assert_eq!(error_detail("  upstream exploded "), "upstream exploded");
        assert_eq!(error_detail(""), "empty response body");
    }

    #[test]
    fn statuses_are_classified() {
        assert_eq!(status_failure(429, "{}").kind, ServiceErrorKind::RateLimited);
        assert_eq!(status_failure(503, "").kind, ServiceErrorKind::Server);
        assert_eq!(status_failure(401, "").kind, ServiceErrorKind::Rejected);

        let too_long = r#"{"error": {"message": "maximum context length is 8192 tokens"}}"#;
        let failure = status_failure(400, too_long);
        assert_eq!(failure.kind, ServiceErrorKind::InputTooLarge);
        assert!(failure.message.contains("8192"));
    }

    #[test]
    fn unparseable_success_body_is_malformed() {
        #[derive(Debug, Deserialize)]
        struct Expected {
            #[allow(dead_code)]
            data: Vec<u8>,
        }
        let failure = parse_body::<Expected>("<html>").unwrap_err();
        assert_eq!(failure.kind, ServiceErrorKind::MalformedResponse);
    }

    #[test]
    fn endpoint_joins_with_single_slash() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "/embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
        assert_eq!(
            endpoint("http://localhost:8080/v1", "chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn failures_are_attributed() {
        let failure = ServiceFailure::new(ServiceErrorKind::Timeout, "slow");
        assert!(matches!(
            failure.clone().into_embedding("openai"),
            RagError::Embedding { kind: ServiceErrorKind::Timeout, .. }
        ));
        assert!(matches!(
            failure.into_language_model("openai"),
            RagError::LanguageModel { kind: ServiceErrorKind::Timeout, .. }
        ));
    }
}
