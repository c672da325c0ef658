//! Grounded answer generation.
//!
//! [`AnswerGenerator`] turns a question and its [`RetrievedContext`] into an
//! [`Answer`] by driving a small state machine:
//!
//! ```text
//! NoContext -> ContextAssembled -> ModelInvoked -> AnswerReady
//!                     |                  \
//!                     |                   -> Failed
//!                     -> AnswerReady   (empty context, sentinel only)
//! ```
//!
//! The model is instructed to reply with [`NOT_AVAILABLE_SENTINEL`] when the
//! context does not contain the answer. That reply is a successful answer
//! and is passed through verbatim.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::EmptyContextPolicy;
use crate::context::RetrievedContext;
use crate::error::{RagError, Result, ServiceErrorKind};
use crate::llm::{GenerationSettings, LanguageModel};
use crate::retry::with_single_retry;

/// The reply that signals the context does not contain the answer.
pub const NOT_AVAILABLE_SENTINEL: &str = "answer is not available in the context";

/// Fixed instructions sent ahead of the context and question.
pub const GROUNDING_INSTRUCTIONS: &str = "Answer the question as completely as possible using \
only the provided context. Include every relevant detail the context offers. If the context \
does not contain the answer, reply exactly with \"answer is not available in the context\". \
Never make up an answer or use knowledge from outside the context.";

/// Substitute the context and question into the grounding prompt.
pub fn grounding_prompt(context: &str, question: &str) -> String {
    format!("{GROUNDING_INSTRUCTIONS}\n\nContext:\n{context}\n\nQuestion:\n{question}\n\nAnswer:")
}

/// States of a single answer generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnswerState {
    NoContext,
    ContextAssembled,
    ModelInvoked,
    AnswerReady,
    Failed,
}

impl AnswerState {
    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(self, next: AnswerState) -> bool {
        use AnswerState::*;
        matches!(
            (self, next),
            (NoContext, ContextAssembled)
                | (ContextAssembled, ModelInvoked)
                | (ContextAssembled, AnswerReady)
                | (ModelInvoked, AnswerReady)
                | (ModelInvoked, Failed)
        )
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AnswerReady | Self::Failed)
    }
}

impl fmt::Display for AnswerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Records the path a generation took through [`AnswerState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerTrace {
    states: Vec<AnswerState>,
}

impl AnswerTrace {
    fn new() -> Self {
        Self { states: vec![AnswerState::NoContext] }
    }

    fn advance(&mut self, next: AnswerState) {
        let current = self.current();
        debug_assert!(current.can_transition_to(next), "invalid transition {current} -> {next}");
        debug!(from = %current, to = %next, "answer state transition");
        self.states.push(next);
    }

    /// The most recent state.
    pub fn current(&self) -> AnswerState {
        self.states.last().copied().unwrap_or(AnswerState::NoContext)
    }

    /// Every state visited, in order.
    pub fn states(&self) -> &[AnswerState] {
        &self.states
    }
}

/// A generated answer tied to one question and one retrieved context.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// The question that was asked.
    pub question: String,
    /// The model's reply, or the sentinel.
    pub text: String,
    /// The context the answer is grounded in.
    pub context: RetrievedContext,
    /// States visited while producing the answer.
    pub trace: AnswerTrace,
}

impl Answer {
    /// Whether the reply is the not-available sentinel.
    pub fn is_not_available(&self) -> bool {
        self.text.to_lowercase().contains(NOT_AVAILABLE_SENTINEL)
    }
}

/// Builds the grounding prompt and calls the language model.
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    empty_context: EmptyContextPolicy,
    retry_backoff: Duration,
}

impl AnswerGenerator {
    /// Create a generator around `model`.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            empty_context: EmptyContextPolicy::default(),
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Set the behaviour when the context is empty.
    pub fn with_empty_context(mut self, policy: EmptyContextPolicy) -> Self {
        self.empty_context = policy;
        self
    }

    /// Set the delay before retrying a transient model failure.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Answer `question` from `context`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::LanguageModel`] if the model fails after the
    /// single retry allowed for transient errors. No answer is fabricated.
    pub async fn generate(&self, question: &str, context: RetrievedContext) -> Result<Answer> {
        let mut trace = AnswerTrace::new();
        trace.advance(AnswerState::ContextAssembled);

        if context.is_empty() && self.empty_context == EmptyContextPolicy::SentinelOnly {
            trace.advance(AnswerState::AnswerReady);
            info!(question_len = question.len(), "no context retrieved, answering with sentinel");
            return Ok(Answer {
                question: question.to_string(),
                text: NOT_AVAILABLE_SENTINEL.to_string(),
                context,
                trace,
            });
        }

        let prompt = grounding_prompt(&context.text, question);
        let settings = GenerationSettings::grounded();
        trace.advance(AnswerState::ModelInvoked);
        debug!(model = self.model.name(), prompt_len = prompt.len(), "invoking language model");

        let model = &self.model;
        let (prompt, settings) = (prompt.as_str(), &settings);
        let reply = with_single_retry("generate", self.retry_backoff, move || {
            model.generate(prompt, settings)
        })
        .await;

        match reply {
            Ok(text) => {
                trace.advance(AnswerState::AnswerReady);
                info!(
                    model = self.model.name(),
                    sources = context.results.len(),
                    answer_len = text.len(),
                    "answer ready"
                );
                Ok(Answer { question: question.to_string(), text, context, trace })
            }
            Err(e) => {
                trace.advance(AnswerState::Failed);
                error!(model = self.model.name(), error = %e, "answer generation failed");
                Err(match e {
                    err @ RagError::LanguageModel { .. } => err,
                    other => RagError::LanguageModel {
                        provider: self.model.name().to_string(),
                        kind: other.service_kind().unwrap_or(ServiceErrorKind::MalformedResponse),
                        message: other.to_string(),
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::document::{Chunk, SearchResult};

    struct ScriptedModel {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies), prompts: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str, settings: &GenerationSettings) -> Result<String> {
            assert_eq!(settings.temperature, GenerationSettings::GROUNDED_TEMPERATURE);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn model_error(kind: ServiceErrorKind) -> RagError {
        RagError::LanguageModel { provider: "scripted".into(), kind, message: "nope".into() }
    }

    fn context_with(text: &str) -> RetrievedContext {
        RetrievedContext::new(vec![SearchResult {
            chunk: Chunk { document_id: "d".into(), position: 0, text: text.into() },
            score: 1.0,
        }])
    }

    #[test]
    fn prompt_substitutes_both_placeholders() {
        let prompt = grounding_prompt("CTX", "Q?");
        assert!(prompt.contains("Context:\nCTX\n"));
        assert!(prompt.contains("Question:\nQ?\n"));
        assert!(prompt.starts_with(GROUNDING_INSTRUCTIONS));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn instructions_name_the_sentinel() {
        assert!(GROUNDING_INSTRUCTIONS.contains(&format!("\"{NOT_AVAILABLE_SENTINEL}\"")));
    }

    #[test]
    fn transitions_follow_the_machine() {
        use AnswerState::*;
        assert!(NoContext.can_transition_to(ContextAssembled));
        assert!(ModelInvoked.can_transition_to(Failed));
        assert!(!NoContext.can_transition_to(ModelInvoked));
        assert!(!AnswerReady.can_transition_to(Failed));
        assert!(AnswerReady.is_terminal() && Failed.is_terminal());
    }

    #[tokio::test]
    async fn reply_is_passed_through() {
        let model = ScriptedModel::new(vec![Ok("Paris.".to_string())]);
        let generator = AnswerGenerator::new(model.clone());
        let answer =
            generator.generate("Capital?", context_with("The capital is Paris.")).await.unwrap();

        assert_eq!(answer.text, "Paris.");
        assert!(!answer.is_not_available());
        assert_eq!(
            answer.trace.states(),
            &[
                AnswerState::NoContext,
                AnswerState::ContextAssembled,
                AnswerState::ModelInvoked,
                AnswerState::AnswerReady
            ]
        );
        assert!(model.prompts.lock().unwrap()[0].contains("The capital is Paris."));
    }

    #[tokio::test]
    async fn sentinel_reply_is_a_successful_answer() {
        let model = ScriptedModel::new(vec![Ok(NOT_AVAILABLE_SENTINEL.to_string())]);
        let answer = AnswerGenerator::new(model)
            .generate("Unrelated?", context_with("Something else."))
            .await
            .unwrap();
        assert_eq!(answer.text, NOT_AVAILABLE_SENTINEL);
        assert!(answer.is_not_available());
        assert_eq!(answer.trace.current(), AnswerState::AnswerReady);
    }

    #[tokio::test]
    async fn empty_context_short_circuits_to_sentinel() {
        let model = ScriptedModel::new(Vec::new());
        let answer = AnswerGenerator::new(model.clone())
            .generate("Anything?", RetrievedContext::default())
            .await
            .unwrap();
        assert_eq!(answer.text, NOT_AVAILABLE_SENTINEL);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_context_can_still_invoke_model() {
        let model = ScriptedModel::new(vec![Ok(NOT_AVAILABLE_SENTINEL.to_string())]);
        let answer = AnswerGenerator::new(model.clone())
            .with_empty_context(EmptyContextPolicy::InvokeModel)
            .generate("Anything?", RetrievedContext::default())
            .await
            .unwrap();
        assert!(answer.is_not_available());
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_answers() {
        let model = ScriptedModel::new(vec![
            Err(model_error(ServiceErrorKind::Timeout)),
            Ok("42".to_string()),
        ]);
        let answer = AnswerGenerator::new(model.clone())
            .with_retry_backoff(Duration::ZERO)
            .generate("Meaning?", context_with("The meaning is 42."))
            .await
            .unwrap();
        assert_eq!(answer.text, "42");
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn definitive_failure_is_surfaced() {
        let model = ScriptedModel::new(vec![Err(model_error(ServiceErrorKind::Rejected))]);
        let err = AnswerGenerator::new(model.clone())
            .with_retry_backoff(Duration::ZERO)
            .generate("Q?", context_with("ctx"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::LanguageModel { kind: ServiceErrorKind::Rejected, .. }));
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }
}
