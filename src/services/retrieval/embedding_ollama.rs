//! Ollama Embedding Provider
//!
//! Local embeddings through `ollama-rs`. No API key; the vector dimension is
//! learned from the first successful response.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use theory_cascade_llm::build_http_client;

use super::embedding_provider::{
    EmbeddingError, EmbeddingProvider, EmbeddingProviderConfig, EmbeddingProviderType,
    EmbeddingResult,
};

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

const DEFAULT_MODEL: &str = "nomic-embed-text";

const DEFAULT_DIMENSION: usize = 768;

pub struct OllamaEmbeddingProvider {
    client: Ollama,
    model: String,
    base_url: String,
    dimension: AtomicUsize,
    display_name: String,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: &EmbeddingProviderConfig) -> EmbeddingResult<Self> {
        let model = if config.model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.trim().to_string()
        };
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());
        let client = create_client(&base_url, config)?;

        Ok(Self {
            client,
            display_name: format!("Ollama ({})", model),
            model,
            base_url,
            dimension: AtomicUsize::new(DEFAULT_DIMENSION),
        })
    }

    fn map_ollama_error(&self, err: ollama_rs::error::OllamaError) -> EmbeddingError {
        let msg = err.to_string();
        if msg.contains("connect") || msg.contains("Connection refused") {
            EmbeddingError::ProviderUnavailable {
                message: format!(
                    "cannot connect to Ollama at {}; is `ollama serve` running?",
                    self.base_url
                ),
            }
        } else if msg.contains("not found") || msg.contains("404") {
            EmbeddingError::ModelNotFound {
                model: self.model.clone(),
            }
        } else {
            EmbeddingError::NetworkError { message: msg }
        }
    }

    async fn generate(&self, input: EmbeddingsInput) -> EmbeddingResult<Vec<Vec<f32>>> {
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), input);
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| self.map_ollama_error(e))?;
        if let Some(first) = response.embeddings.first().filter(|v| !v.is_empty()) {
            self.dimension.store(first.len(), Ordering::Relaxed);
        }
        Ok(response.embeddings)
    }
}

fn create_client(base_url: &str, config: &EmbeddingProviderConfig) -> EmbeddingResult<Ollama> {
    let parsed = url::Url::parse(base_url).map_err(|e| EmbeddingError::InvalidConfig {
        message: format!("invalid Ollama URL '{}': {}", base_url, e),
    })?;
    let host = parsed.host_str().unwrap_or("localhost");
    let port = parsed.port().unwrap_or(11434);
    let host_url = format!("{}://{}", parsed.scheme(), host);
    let http_client =
        build_http_client(&config.transport_config()).map_err(|e| EmbeddingError::InvalidConfig {
            message: e.to_string(),
        })?;
    Ok(Ollama::new_with_client(host_url, port, http_client))
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed_documents(&self, documents: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let max = self.max_batch_size();
        if documents.len() > max {
            return Err(EmbeddingError::BatchSizeLimitExceeded {
                requested: documents.len(),
                max_allowed: max,
            });
        }

        let embeddings = self
            .generate(EmbeddingsInput::from(documents.to_vec()))
            .await?;
        if embeddings.len() != documents.len() {
            return Err(EmbeddingError::ParseError {
                message: format!(
                    "expected {} embeddings but Ollama returned {}",
                    documents.len(),
                    embeddings.len()
                ),
            });
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, query: &str) -> EmbeddingResult<Vec<f32>> {
        self.generate(EmbeddingsInput::from(query))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::ParseError {
                message: "Ollama returned empty embeddings for query".to_string(),
            })
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| self.map_ollama_error(e))?;
        let wanted = self.model.split(':').next().unwrap_or(&self.model);
        if models.iter().any(|m| m.name.starts_with(wanted)) {
            Ok(())
        } else {
            Err(EmbeddingError::ModelNotFound {
                model: format!("{} (run `ollama pull {}`)", self.model, self.model),
            })
        }
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Ollama
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
