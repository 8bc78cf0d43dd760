//! Backend Resolution
//!
//! Turns a configuration snapshot into the provider, prompt set and embedder
//! that answer one pipeline call.

use std::sync::Arc;

use theory_cascade_llm::{
    GeminiProvider, LlmProvider, OllamaProvider, OpenAIProvider, ProviderType,
};
use tracing::debug;

use super::prompts::{prompts_for, PromptSet};
use crate::models::settings::AppConfig;
use crate::services::retrieval::{
    create_embedding_provider, EmbeddingProvider, EmbeddingProviderConfig, EmbeddingProviderType,
    TfIdfEmbeddingProvider,
};
use crate::utils::error::AppResult;

/// Everything needed to answer the operation set with one backend.
#[derive(Clone)]
pub struct AnalysisBackend {
    pub llm: Arc<dyn LlmProvider>,
    pub prompts: Arc<dyn PromptSet>,
    /// `None` when the backend has no embedding capability.
    pub embeddings: Option<Arc<dyn EmbeddingProvider>>,
}

/// Resolves the active backend from a configuration snapshot.
pub trait BackendFactory: Send + Sync {
    fn resolve(&self, config: &AppConfig) -> AppResult<AnalysisBackend>;
}

/// Production factory over the built-in providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderRegistry;

impl ProviderRegistry {
    pub fn new() -> Self {
        Self
    }

    fn create_llm(config: &AppConfig) -> AppResult<Arc<dyn LlmProvider>> {
        let provider_config = config.provider_config(config.provider)?;
        let llm: Arc<dyn LlmProvider> = match config.provider {
            ProviderType::OpenAI => Arc::new(OpenAIProvider::new(provider_config)?),
            ProviderType::Gemini => Arc::new(GeminiProvider::new(provider_config)?),
            ProviderType::Ollama => Arc::new(OllamaProvider::new(provider_config)?),
        };
        Ok(llm)
    }

    /// The embedder for the active backend. The local TF-IDF embedder wins
    /// when enabled; otherwise the backend's own, if it has one.
    fn create_embeddings(
        config: &AppConfig,
        llm: &dyn LlmProvider,
    ) -> AppResult<Option<Arc<dyn EmbeddingProvider>>> {
        if config.retrieval.local_embeddings {
            return Ok(Some(Arc::new(TfIdfEmbeddingProvider::new())));
        }
        if !llm.supports_embeddings() {
            return Ok(None);
        }
        let Some(kind) = EmbeddingProviderType::for_provider(config.provider) else {
            return Ok(None);
        };

        let backend = config.backend(config.provider);
        let mut embedding_config = EmbeddingProviderConfig::new(
            kind,
            backend.embedding_model.clone().unwrap_or_default(),
        );
        embedding_config.api_key = config.credential(config.provider);
        embedding_config.base_url = backend.base_url.clone();
        embedding_config.headers = backend.headers.clone();
        Ok(Some(create_embedding_provider(&embedding_config)?))
    }
}

impl BackendFactory for ProviderRegistry {
    fn resolve(&self, config: &AppConfig) -> AppResult<AnalysisBackend> {
        let llm = Self::create_llm(config)?;
        let embeddings = Self::create_embeddings(config, llm.as_ref())?;
        debug!(
            provider = %config.provider,
            model = llm.model(),
            embeddings = embeddings.as_ref().map(|e| e.display_name()).unwrap_or("none"),
            "Resolved analysis backend"
        );
        Ok(AnalysisBackend {
            llm,
            prompts: prompts_for(config.provider),
            embeddings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::AppError;

    #[test]
    fn missing_key_is_configuration_error() {
        let mut config = AppConfig::default();
        config.provider = ProviderType::Gemini;
        config.gemini.api_key = None;
        // The environment may hold a real key; only assert when it does not.
        if config.credential(ProviderType::Gemini).is_none() {
            let err = ProviderRegistry.resolve(&config).err().unwrap();
            assert!(matches!(err, AppError::Config(_)));
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn gemini_has_no_embeddings() {
        let mut config = AppConfig::default();
        config.provider = ProviderType::Gemini;
        config.gemini.api_key = Some("g-key".to_string());
        let backend = ProviderRegistry.resolve(&config).unwrap();
        assert_eq!(backend.llm.name(), "gemini");
        assert_eq!(backend.prompts.backend(), ProviderType::Gemini);
        assert!(backend.embeddings.is_none());
    }

    #[test]
    fn local_embeddings_override_backend() {
        let mut config = AppConfig::default();
        config.provider = ProviderType::Gemini;
        config.gemini.api_key = Some("g-key".to_string());
        config.retrieval.local_embeddings = true;
        let backend = ProviderRegistry.resolve(&config).unwrap();
        let embeddings = backend.embeddings.unwrap();
        assert_eq!(embeddings.provider_type(), EmbeddingProviderType::TfIdf);
    }

    #[test]
    fn ollama_pairs_with_ollama_embeddings() {
        let mut config = AppConfig::default();
        config.provider = ProviderType::Ollama;
        let backend = ProviderRegistry.resolve(&config).unwrap();
        assert_eq!(backend.llm.name(), "ollama");
        assert_eq!(
            backend.embeddings.unwrap().provider_type(),
            EmbeddingProviderType::Ollama
        );
    }
}
