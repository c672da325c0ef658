//! Construction of the hosted providers selected by [`ServiceConfig`].

use std::sync::Arc;

use crate::config::{Provider, ServiceConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

/// Build the embedding provider named by `config.provider`.
///
/// # Errors
///
/// Returns [`RagError::Config`] if the provider's feature was not compiled in
/// or its settings are incomplete.
pub fn embedding_provider(config: &ServiceConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        #[cfg(feature = "openai")]
        Provider::OpenAI => {
            Ok(Arc::new(crate::openai::OpenAIEmbeddingProvider::from_config(config)?))
        }
        #[cfg(feature = "gemini")]
        Provider::Gemini => {
            Ok(Arc::new(crate::gemini::GeminiEmbeddingProvider::from_config(config)?))
        }
        #[allow(unreachable_patterns)]
        other => Err(not_compiled(other)),
    }
}

/// Build the language model named by `config.provider`.
///
/// # Errors
///
/// Returns [`RagError::Config`] if the provider's feature was not compiled in.
pub fn language_model(config: &ServiceConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider {
        #[cfg(feature = "openai")]
        Provider::OpenAI => Ok(Arc::new(crate::openai::OpenAIChatModel::from_config(config)?)),
        #[cfg(feature = "gemini")]
        Provider::Gemini => Ok(Arc::new(crate::gemini::GeminiModel::from_config(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(not_compiled(other)),
    }
}

#[allow(dead_code)]
fn not_compiled(provider: Provider) -> RagError {
    RagError::Config(format!("provider '{provider}' requires the `{provider}` feature"))
}
