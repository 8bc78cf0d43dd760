//! OpenAI Embedding Provider
//!
//! `POST {base}/embeddings` with bearer auth. The body is
//! `{ model, input: [...] }` and the response carries `data[].embedding`
//! tagged with the input `index`, which is used to restore input order.
//! A custom `base_url` targets OpenAI-compatible gateways.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use theory_cascade_llm::build_http_client;

use super::embedding_provider::{
    EmbeddingError, EmbeddingProvider, EmbeddingProviderConfig, EmbeddingProviderType,
    EmbeddingResult,
};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const DEFAULT_MODEL: &str = "text-embedding-3-small";

const DEFAULT_DIMENSION: usize = 1536;

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: Option<OpenAIErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: Option<String>,
}

pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    dimension: AtomicUsize,
    display_name: String,
}

impl OpenAIEmbeddingProvider {
    pub fn new(config: &EmbeddingProviderConfig) -> EmbeddingResult<Self> {
        config.validate()?;

        let model = if config.model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.trim().to_string()
        };
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_API_BASE)
            .trim_end_matches('/');
        let client = build_http_client(&config.transport_config()).map_err(|e| {
            EmbeddingError::InvalidConfig {
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().unwrap_or_default(),
            display_name: format!("OpenAI ({})", model),
            endpoint: format!("{}/embeddings", base),
            model,
            dimension: AtomicUsize::new(DEFAULT_DIMENSION),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_embeddings(&self, input: &[&str]) -> EmbeddingResult<OpenAIEmbeddingResponse> {
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| EmbeddingError::NetworkError {
                message: format!("failed to read response body: {}", e),
            })?;

        if status != 200 {
            return Err(self.map_http_error(status, &text));
        }

        serde_json::from_str::<OpenAIEmbeddingResponse>(&text).map_err(|e| {
            EmbeddingError::ParseError {
                message: format!("failed to parse embedding response: {}", e),
            }
        })
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_connect() {
            EmbeddingError::ProviderUnavailable {
                message: format!("cannot connect to {}: {}", self.endpoint, err),
            }
        } else if err.is_timeout() {
            EmbeddingError::NetworkError {
                message: format!("request to {} timed out", self.endpoint),
            }
        } else {
            EmbeddingError::NetworkError {
                message: err.to_string(),
            }
        }
    }

    fn map_http_error(&self, status: u16, body: &str) -> EmbeddingError {
        let message = serde_json::from_str::<OpenAIErrorResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .and_then(|d| d.message)
            .unwrap_or_else(|| body.to_string());

        match status {
            401 | 403 => EmbeddingError::AuthenticationFailed { message },
            404 => EmbeddingError::ModelNotFound {
                model: self.model.clone(),
            },
            429 => EmbeddingError::RateLimited { message },
            400 if message.contains("token") || message.contains("length") => {
                EmbeddingError::InputTooLong { message }
            }
            400 => EmbeddingError::InvalidConfig { message },
            _ => EmbeddingError::ServerError {
                message,
                status: Some(status),
            },
        }
    }
}

/// Restore input order and check the response covers every input.
fn order_embeddings(
    mut data: Vec<OpenAIEmbeddingData>,
    expected: usize,
) -> EmbeddingResult<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(EmbeddingError::ParseError {
            message: format!(
                "expected {} embeddings but received {}",
                expected,
                data.len()
            ),
        });
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
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

        let response = self.post_embeddings(documents).await?;
        let embeddings = order_embeddings(response.data, documents.len())?;
        if let Some(first) = embeddings.first().filter(|v| !v.is_empty()) {
            self.dimension.store(first.len(), Ordering::Relaxed);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    async fn health_check(&self) -> EmbeddingResult<()> {
        self.embed_query("health check").await.map(|_| ())
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::OpenAI
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }
}
