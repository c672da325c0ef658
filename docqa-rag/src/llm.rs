//! Language model trait used by the answer generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decoding settings sent with every generation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationSettings {
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerationSettings {
    /// Temperature used for grounded answers.
    pub const GROUNDED_TEMPERATURE: f32 = 0.3;

    /// Low-temperature settings that favour faithfulness over creativity.
    pub fn grounded() -> Self {
        Self { temperature: Self::GROUNDED_TEMPERATURE }
    }
}

/// A text-generation service.
///
/// Implementations return the model's raw reply unchanged and report
/// failures as [`RagError::LanguageModel`](crate::RagError::LanguageModel).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in logs.
    fn name(&self) -> &str;

    /// Generate a reply to a single-turn prompt.
    async fn generate(&self, prompt: &str, settings: &GenerationSettings) -> Result<String>;
}
