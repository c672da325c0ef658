//! Error types for the `docqa-rag` crate.

use std::fmt;

use thiserror::Error;

/// Classification of a failed call to a remote embedding or generation service.
///
/// Only transient kinds are eligible for the single retry performed by
/// [`with_single_retry`](crate::retry::with_single_retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// The request never produced an HTTP response (DNS, connect, reset).
    Transport,
    /// The request exceeded the configured timeout.
    Timeout,
    /// The service answered 429.
    RateLimited,
    /// The service answered 5xx.
    Server,
    /// The input exceeded the service's size or token limit.
    InputTooLarge,
    /// A definitive rejection: bad credentials, unknown model, invalid request.
    Rejected,
    /// The service answered 2xx but the body did not have the expected shape.
    MalformedResponse,
}

impl ServiceErrorKind {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transport | Self::Timeout | Self::RateLimited | Self::Server)
    }

    /// Classify a non-success HTTP status and its error message.
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            413 => Self::InputTooLarge,
            429 => Self::RateLimited,
            408 => Self::Timeout,
            400 if mentions_input_limit(message) => Self::InputTooLarge,
            500..=599 => Self::Server,
            _ => Self::Rejected,
        }
    }

    /// Classify a `reqwest` transport error.
    #[cfg(any(feature = "openai", feature = "gemini"))]
    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse
        } else {
            Self::Transport
        }
    }
}

fn mentions_input_limit(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["maximum context length", "too long", "token limit", "exceeds the limit", "input size"]
        .iter()
        .any(|needle| message.contains(needle))
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate limited",
            Self::Server => "server error",
            Self::InputTooLarge => "input too large",
            Self::Rejected => "rejected",
            Self::MalformedResponse => "malformed response",
        };
        f.write_str(name)
    }
}

/// The pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Chunking,
    Embedding,
    Indexing,
    Persistence,
    Retrieval,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extraction => "extraction",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Persistence => "persistence",
            Self::Retrieval => "retrieval",
            Self::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while ingesting documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing credentials or invalid parameters, reported before any work starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single document could not be turned into text.
    #[error("Extraction error ({document}): {message}")]
    Extraction {
        /// The document that failed.
        document: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding service failed.
    #[error("Embedding error ({provider}, {kind}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// What kind of failure occurred.
        kind: ServiceErrorKind,
        /// A description of the failure.
        message: String,
    },

    /// No index has been persisted at the configured location yet.
    #[error("No document index found at {location}; ingest documents before asking questions")]
    IndexNotFound {
        /// The storage location that was probed.
        location: String,
    },

    /// The persisted index is unreadable or was built for another embedding space.
    #[error("Document index at {location} is unusable ({message}); re-ingest the documents")]
    IndexCorrupt {
        /// The storage location that was read.
        location: String,
        /// Why the index was rejected.
        message: String,
    },

    /// A query vector does not belong to the index's embedding space.
    #[error("Query vector has {actual} dimensions but the index expects {expected}")]
    IncompatibleQuery {
        /// Dimensionality of the index.
        expected: usize,
        /// Dimensionality of the rejected vector.
        actual: usize,
    },

    /// The language model failed to produce an answer.
    #[error("Language model error ({provider}, {kind}): {message}")]
    LanguageModel {
        /// The model provider that produced the error.
        provider: String,
        /// What kind of failure occurred.
        kind: ServiceErrorKind,
        /// A description of the failure.
        message: String,
    },

    /// Writing the index to durable storage failed.
    #[error("Storage error ({location}): {message}")]
    Storage {
        /// The storage location being written.
        location: String,
        /// A description of the failure.
        message: String,
    },

    /// A failure tagged with the pipeline stage it happened in.
    #[error("Pipeline error during {stage}: {source}")]
    Pipeline {
        /// The stage that failed.
        stage: Stage,
        /// The underlying error.
        #[source]
        source: Box<RagError>,
    },
}

impl RagError {
    /// Wrap this error with the stage it was raised in.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            already @ Self::Pipeline { .. } => already,
            other => Self::Pipeline { stage, source: Box::new(other) },
        }
    }

    /// The service error kind, if this error came from a remote service.
    pub fn service_kind(&self) -> Option<ServiceErrorKind> {
        match self {
            Self::Embedding { kind, .. } | Self::LanguageModel { kind, .. } => Some(*kind),
            Self::Pipeline { source, .. } => source.service_kind(),
            _ => None,
        }
    }

    /// The innermost error, with any stage tag removed.
    pub fn root(&self) -> &RagError {
        match self {
            Self::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ServiceErrorKind::from_status(429, ""), ServiceErrorKind::RateLimited);
        assert_eq!(ServiceErrorKind::from_status(413, ""), ServiceErrorKind::InputTooLarge);
        assert_eq!(ServiceErrorKind::from_status(503, ""), ServiceErrorKind::Server);
        assert_eq!(ServiceErrorKind::from_status(401, "bad key"), ServiceErrorKind::Rejected);
        assert_eq!(
            ServiceErrorKind::from_status(
                400,
                "This model's maximum context length is 8192 tokens"
            ),
            ServiceErrorKind::InputTooLarge
        );
        assert_eq!(ServiceErrorKind::from_status(400, "unknown field"), ServiceErrorKind::Rejected);
    }

    #[test]
    fn only_transient_kinds_retry() {
        assert!(ServiceErrorKind::Transport.is_transient());
        assert!(ServiceErrorKind::RateLimited.is_transient());
        assert!(!ServiceErrorKind::Rejected.is_transient());
        assert!(!ServiceErrorKind::InputTooLarge.is_transient());
        assert!(!ServiceErrorKind::MalformedResponse.is_transient());
    }

    #[test]
    fn stage_tag_is_applied_once() {
        let err = RagError::Config("x".into()).at(Stage::Chunking).at(Stage::Retrieval);
        match &err {
            RagError::Pipeline { stage, .. } => assert_eq!(*stage, Stage::Chunking),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(err.root(), RagError::Config(_)));
    }
}
