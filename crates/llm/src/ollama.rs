//! Ollama Provider
//!
//! Implementation of the LlmProvider trait for Ollama local inference
//! using the ollama-rs native SDK. No API key is needed.

use async_trait::async_trait;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::{ChatMessage, ChatMessageResponse};
use ollama_rs::generation::parameters::FormatType;
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use super::provider::LlmProvider;
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig,
    StopReason, UsageStats,
};
use crate::http_client::build_http_client;
use theory_cascade_core::streaming::UnifiedStreamEvent;

/// Default Ollama API endpoint
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Ollama provider for local inference using the native ollama-rs SDK
pub struct OllamaProvider {
    config: ProviderConfig,
    client: Ollama,
}

impl OllamaProvider {
    /// Create a new Ollama provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let base_url = config.base_url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
        let client = create_client(base_url, &config)?;
        Ok(Self { config, client })
    }

    /// Get the base URL for the Ollama server (used in error messages)
    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL)
    }

    /// Build a ChatMessageRequest from our unified types
    fn build_chat_request(
        &self,
        messages: &[Message],
        system: Option<&str>,
        request_options: &LlmRequestOptions,
    ) -> ChatMessageRequest {
        let mut chat_messages: Vec<ChatMessage> = Vec::with_capacity(messages.len() + 1);
        if let Some(sys) = system {
            chat_messages.push(ChatMessage::system(sys.to_string()));
        }
        chat_messages.extend(messages.iter().map(|msg| match msg.role {
            MessageRole::User => ChatMessage::user(msg.content.clone()),
            MessageRole::Assistant => ChatMessage::assistant(msg.content.clone()),
            MessageRole::System => ChatMessage::system(msg.content.clone()),
        }));

        let temperature = request_options
            .temperature_override
            .unwrap_or(self.config.temperature);
        let max_tokens = request_options
            .max_tokens_override
            .unwrap_or(self.config.max_tokens);
        let mut opts = ModelOptions::default().temperature(temperature);
        if max_tokens > 0 {
            opts = opts.num_predict(max_tokens as i32);
        }

        let mut request =
            ChatMessageRequest::new(self.config.model.clone(), chat_messages).options(opts);
        if request_options.json_output {
            request = request.format(FormatType::Json);
        }
        request
    }

    /// Map an SDK error onto the unified error type
    fn map_error(&self, err: impl std::fmt::Display) -> LlmError {
        let msg = err.to_string();
        if msg.contains("connect") || msg.contains("Connection refused") {
            LlmError::ProviderUnavailable {
                message: format!("Cannot connect to Ollama at {}: {}", self.base_url(), msg),
            }
        } else if msg.contains("not found") || msg.contains("404") {
            LlmError::ModelNotFound {
                model: self.config.model.clone(),
            }
        } else {
            LlmError::NetworkError { message: msg }
        }
    }

    fn usage_of(response: &ChatMessageResponse) -> Option<UsageStats> {
        response.final_data.as_ref().map(|final_data| UsageStats {
            input_tokens: final_data.prompt_eval_count as u32,
            output_tokens: final_data.eval_count as u32,
        })
    }
}

/// Create an Ollama SDK client from a base URL string.
///
/// `Ollama::new_with_client` takes host and port separately.
fn create_client(base_url: &str, config: &ProviderConfig) -> LlmResult<Ollama> {
    let parsed = url::Url::parse(base_url).map_err(|e| LlmError::InvalidRequest {
        message: format!("Invalid Ollama URL '{}': {}", base_url, e),
    })?;
    let host = parsed.host_str().unwrap_or("localhost");
    let port = parsed.port().unwrap_or(11434);
    let host_url = format!("{}://{}", parsed.scheme(), host);
    let http_client = build_http_client(config)?;
    Ok(Ollama::new_with_client(host_url, port, http_client))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let request = self.build_chat_request(&messages, system.as_deref(), &request_options);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| self.map_error(e))?;

        let content = response.message.content.trim().to_string();
        Ok(LlmResponse {
            content: (!content.is_empty()).then_some(content),
            stop_reason: StopReason::EndTurn,
            usage: Self::usage_of(&response).unwrap_or_default(),
            model: response.model.clone(),
        })
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let request = self.build_chat_request(&messages, system.as_deref(), &request_options);

        let mut stream = self
            .client
            .send_chat_messages_stream(request)
            .await
            .map_err(|e| self.map_error(e))?;

        let mut accumulated_content = String::new();
        let mut usage = UsageStats::default();
        let mut response_model = self.config.model.clone();

        while let Some(chunk_result) = stream.next().await {
            let Ok(response) = chunk_result else {
                let _ = tx
                    .send(UnifiedStreamEvent::Error {
                        message: "Stream error from Ollama".to_string(),
                        code: None,
                    })
                    .await;
                break;
            };

            response_model = response.model.clone();
            if !response.message.content.is_empty() {
                accumulated_content.push_str(&response.message.content);
                let _ = tx
                    .send(UnifiedStreamEvent::TextDelta {
                        content: response.message.content.clone(),
                    })
                    .await;
            }

            if response.done {
                if let Some(final_usage) = Self::usage_of(&response) {
                    usage = final_usage;
                    let _ = tx
                        .send(UnifiedStreamEvent::Usage {
                            input_tokens: usage.input_tokens,
                            output_tokens: usage.output_tokens,
                        })
                        .await;
                }
                let _ = tx
                    .send(UnifiedStreamEvent::Complete {
                        stop_reason: Some("stop".to_string()),
                    })
                    .await;
            }
        }

        Ok(LlmResponse {
            content: (!accumulated_content.is_empty()).then_some(accumulated_content),
            stop_reason: StopReason::EndTurn,
            usage,
            model: response_model,
        })
    }

    async fn health_check(&self) -> LlmResult<()> {
        self.client
            .list_local_models()
            .await
            .map(|_| ())
            .map_err(|e| self.map_error(e))
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn supports_embeddings(&self) -> bool {
        true
    }
}
