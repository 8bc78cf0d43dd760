//! Embedding Provider Abstraction
//!
//! Embedding is a separate responsibility from chat completion, so it gets
//! its own async trait rather than living on `LlmProvider`. Each backend
//! (TF-IDF, Ollama, OpenAI) implements it to give the retrieval subsystem a
//! uniform way to vectorize chunks and queries.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use theory_cascade_llm::{ProviderConfig, ProviderType};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by embedding backends.
#[derive(Debug, Clone)]
pub enum EmbeddingError {
    AuthenticationFailed { message: String },

    ModelNotFound { model: String },

    ProviderUnavailable { message: String },

    BatchSizeLimitExceeded { requested: usize, max_allowed: usize },

    InputTooLong { message: String },

    NetworkError { message: String },

    ParseError { message: String },

    ServerError { message: String, status: Option<u16> },

    RateLimited { message: String },

    InvalidConfig { message: String },

    Other { message: String },
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed { message } => {
                write!(f, "authentication failed: {}", message)
            }
            Self::ModelNotFound { model } => write!(f, "model not found: {}", model),
            Self::ProviderUnavailable { message } => {
                write!(f, "provider unavailable: {}", message)
            }
            Self::BatchSizeLimitExceeded {
                requested,
                max_allowed,
            } => write!(f, "batch size {} exceeds maximum {}", requested, max_allowed),
            Self::InputTooLong { message } => write!(f, "input too long: {}", message),
            Self::NetworkError { message } => write!(f, "network error: {}", message),
            Self::ParseError { message } => write!(f, "parse error: {}", message),
            Self::ServerError { message, status } => match status {
                Some(code) => write!(f, "server error (HTTP {}): {}", code, message),
                None => write!(f, "server error: {}", message),
            },
            Self::RateLimited { message } => write!(f, "rate limited: {}", message),
            Self::InvalidConfig { message } => write!(f, "invalid config: {}", message),
            Self::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for EmbeddingError {}

impl EmbeddingError {
    /// Failures caused by settings rather than by the remote service.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EmbeddingError::AuthenticationFailed { .. }
                | EmbeddingError::ModelNotFound { .. }
                | EmbeddingError::InvalidConfig { .. }
        )
    }
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

// ---------------------------------------------------------------------------
// Provider type enum
// ---------------------------------------------------------------------------

/// Supported embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local TF-IDF vectors fitted on the corpus
    TfIdf,
    Ollama,
    OpenAI,
}

impl EmbeddingProviderType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TfIdf => "TF-IDF (Local)",
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }

    pub fn max_batch_size(&self) -> usize {
        match self {
            // The vocabulary is fitted on one batch, so the whole corpus goes in at once.
            Self::TfIdf => usize::MAX,
            Self::Ollama => 64,
            Self::OpenAI => 2048,
        }
    }

    /// Embedding backend paired with a completion backend, if it has one.
    pub fn for_provider(provider: ProviderType) -> Option<Self> {
        match provider {
            ProviderType::OpenAI => Some(Self::OpenAI),
            ProviderType::Ollama => Some(Self::Ollama),
            ProviderType::Gemini => None,
        }
    }
}

impl fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TfIdf => write!(f, "tfidf"),
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider configuration
// ---------------------------------------------------------------------------

/// Settings needed to construct an embedding backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    pub provider: EmbeddingProviderType,

    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl EmbeddingProviderConfig {
    pub fn new(provider: EmbeddingProviderType, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            base_url: None,
            headers: HashMap::new(),
        }
    }

    pub fn tfidf() -> Self {
        Self::new(EmbeddingProviderType::TfIdf, "tfidf")
    }

    pub fn validate(&self) -> EmbeddingResult<()> {
        if self.provider.requires_api_key()
            && self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(EmbeddingError::InvalidConfig {
                message: format!(
                    "{} requires an API key but none was provided",
                    self.provider.display_name()
                ),
            });
        }
        if self.model.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig {
                message: "model name must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Transport settings for the shared HTTP client factory.
    pub(crate) fn transport_config(&self) -> ProviderConfig {
        let provider = match self.provider {
            EmbeddingProviderType::Ollama => ProviderType::Ollama,
            _ => ProviderType::OpenAI,
        };
        ProviderConfig {
            provider,
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            headers: self.headers.clone(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Embedding provider trait
// ---------------------------------------------------------------------------

/// Unified async interface over embedding backends.
///
/// `embed_documents` returns one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_documents(&self, documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    async fn embed_query(&self, query: &str) -> EmbeddingResult<Vec<f32>> {
        let results = self.embed_documents(&[query]).await?;
        results.into_iter().next().ok_or_else(|| EmbeddingError::Other {
            message: "embed_documents returned empty results for single query".to_string(),
        })
    }

    /// Vector length, or 0 while unknown.
    fn dimension(&self) -> usize;

    async fn health_check(&self) -> EmbeddingResult<()>;

    fn provider_type(&self) -> EmbeddingProviderType;

    fn max_batch_size(&self) -> usize {
        self.provider_type().max_batch_size()
    }

    fn display_name(&self) -> &str;
}
