//! Settings Models
//!
//! Application configuration: which backend answers requests, per-backend
//! model and credential, and the tunable pipeline and retrieval parameters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use theory_cascade_llm::{ProviderConfig, ProviderType};

use crate::utils::error::{AppError, AppResult};

/// Per-backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Model identifier for completions
    pub model: String,
    /// Secret credential; falls back to the backend's environment variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override (gateways, self-hosted servers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Embedding model, when the backend offers embeddings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Extra request headers
    pub headers: HashMap<String, String>,
}

impl BackendSettings {
    fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Default::default()
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            api_key: None,
            base_url: None,
            embedding_model: None,
            headers: HashMap::new(),
        }
    }
}

/// Tunable parameters of the coding pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Maximum in-flight provider requests during fan-out
    pub concurrency: usize,
    /// Documents longer than this (in characters) are coded chunk by chunk
    pub coding_chunk_threshold: usize,
    /// Chunk size (in characters) for oversized documents
    pub coding_chunk_size: usize,
    /// Upper bound on words per first-order code, stated in the prompt
    pub max_code_words: usize,
    /// Number of themes requested from thematic clustering
    pub focus_code_count: usize,
    pub dimension_min: usize,
    pub dimension_max: usize,
    pub tuple_min: usize,
    pub tuple_max: usize,
    pub research_question_count: usize,
    /// Above this many first-order codes the diagram uses theme names
    pub diagram_vocabulary_threshold: usize,
    /// First-order codes are shown to the critic only below this count
    pub critique_code_limit: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            concurrency: 4,
            coding_chunk_threshold: 5000,
            coding_chunk_size: 10000,
            max_code_words: 7,
            focus_code_count: 12,
            dimension_min: 5,
            dimension_max: 7,
            tuple_min: 10,
            tuple_max: 20,
            research_question_count: 5,
            diagram_vocabulary_threshold: 200,
            critique_code_limit: 50,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Tunable parameters of the retrieval subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Nearest neighbours consulted when ranking a corpus
    pub top_k: usize,
    /// Passages retrieved per concept pair when summarizing interrelationships
    pub evidence_top_k: usize,
    /// Use the local TF-IDF embedder instead of the provider's
    pub local_embeddings: bool,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 50,
            top_k: 30,
            evidence_top_k: 5,
            local_embeddings: false,
        }
    }
}

/// Application configuration stored in config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend answering every pipeline operation
    pub provider: ProviderType,
    pub openai: BackendSettings,
    pub gemini: BackendSettings,
    pub ollama: BackendSettings,
    pub pipeline: PipelineParams,
    pub retrieval: RetrievalParams,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::OpenAI,
            openai: BackendSettings {
                embedding_model: Some("text-embedding-3-small".to_string()),
                ..BackendSettings::with_model("gpt-4o-mini")
            },
            gemini: BackendSettings::with_model("gemini-2.5-flash"),
            ollama: BackendSettings {
                base_url: Some("http://localhost:11434".to_string()),
                embedding_model: Some("nomic-embed-text".to_string()),
                ..BackendSettings::with_model("llama3.1")
            },
            pipeline: PipelineParams::default(),
            retrieval: RetrievalParams::default(),
        }
    }
}

/// Settings update request (partial update)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    pub provider: Option<ProviderType>,
    /// Model override for the backend named by `provider` (or the current one)
    pub model: Option<String>,
    /// Credential for the backend named by `provider` (or the current one)
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub concurrency: Option<usize>,
    pub local_embeddings: Option<bool>,
}

/// Environment variable holding a backend's credential
pub fn credential_env_var(provider: ProviderType) -> Option<&'static str> {
    match provider {
        ProviderType::OpenAI => Some("OPENAI_API_KEY"),
        ProviderType::Gemini => Some("GEMINI_API_KEY"),
        ProviderType::Ollama => None,
    }
}

impl AppConfig {
    pub fn backend(&self, provider: ProviderType) -> &BackendSettings {
        match provider {
            ProviderType::OpenAI => &self.openai,
            ProviderType::Gemini => &self.gemini,
            ProviderType::Ollama => &self.ollama,
        }
    }

    pub fn backend_mut(&mut self, provider: ProviderType) -> &mut BackendSettings {
        match provider {
            ProviderType::OpenAI => &mut self.openai,
            ProviderType::Gemini => &mut self.gemini,
            ProviderType::Ollama => &mut self.ollama,
        }
    }

    /// Apply a partial update to the configuration
    pub fn apply_update(&mut self, update: SettingsUpdate) {
        if let Some(provider) = update.provider {
            self.provider = provider;
        }
        let backend = self.backend_mut(self.provider);
        if let Some(model) = update.model {
            backend.model = model;
        }
        if let Some(api_key) = update.api_key {
            backend.api_key = Some(api_key).filter(|k| !k.is_empty());
        }
        if let Some(base_url) = update.base_url {
            backend.base_url = Some(base_url).filter(|u| !u.is_empty());
        }
        if let Some(concurrency) = update.concurrency {
            self.pipeline.concurrency = concurrency;
        }
        if let Some(local) = update.local_embeddings {
            self.retrieval.local_embeddings = local;
        }
    }

    /// Credential for `provider`, from the settings or the environment.
    pub fn credential(&self, provider: ProviderType) -> Option<String> {
        self.credential_with(provider, |name| std::env::var(name).ok())
    }

    fn credential_with(
        &self,
        provider: ProviderType,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<String> {
        self.backend(provider)
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| credential_env_var(provider).and_then(env))
            .filter(|k| !k.trim().is_empty())
    }

    /// Build the transport config for `provider`.
    ///
    /// A backend that needs a key and has none is a configuration error.
    pub fn provider_config(&self, provider: ProviderType) -> AppResult<ProviderConfig> {
        self.provider_config_with(provider, self.credential(provider))
    }

    fn provider_config_with(
        &self,
        provider: ProviderType,
        api_key: Option<String>,
    ) -> AppResult<ProviderConfig> {
        if provider.requires_api_key() && api_key.is_none() {
            let hint = credential_env_var(provider)
                .map(|var| format!(" (set it in the config file or via {})", var))
                .unwrap_or_default();
            return Err(AppError::config(format!(
                "API key not configured for {}{}",
                provider, hint
            )));
        }
        let backend = self.backend(provider);
        Ok(ProviderConfig {
            provider,
            api_key,
            base_url: backend.base_url.clone(),
            model: backend.model.clone(),
            max_tokens: self.pipeline.max_tokens,
            temperature: self.pipeline.temperature,
            headers: backend.headers.clone(),
            timeout_secs: None,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        for provider in ProviderType::ALL {
            if self.backend(provider).model.trim().is_empty() {
                return Err(format!("Model name for {} must not be empty", provider));
            }
        }

        let p = &self.pipeline;
        if p.concurrency == 0 {
            return Err("pipeline.concurrency must be at least 1".to_string());
        }
        if p.coding_chunk_size == 0 {
            return Err("pipeline.coding_chunk_size must be at least 1".to_string());
        }
        if p.dimension_min == 0 || p.dimension_min > p.dimension_max {
            return Err(format!(
                "Invalid dimension range: {}-{}",
                p.dimension_min, p.dimension_max
            ));
        }
        if p.tuple_min == 0 || p.tuple_min > p.tuple_max {
            return Err(format!("Invalid tuple range: {}-{}", p.tuple_min, p.tuple_max));
        }
        if !(0.0..=2.0).contains(&p.temperature) {
            return Err(format!("Temperature out of range: {}", p.temperature));
        }

        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err("retrieval.chunk_size must be at least 1".to_string());
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(format!(
                "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
                r.chunk_overlap, r.chunk_size
            ));
        }
        if r.top_k == 0 {
            return Err("retrieval.top_k must be at least 1".to_string());
        }

        Ok(())
    }
}
