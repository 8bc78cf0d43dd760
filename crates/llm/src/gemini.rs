//! Gemini Provider
//!
//! Implementation of the LlmProvider trait for Google's Generative Language
//! REST API (`generateContent` / `streamGenerateContent`). The system prompt is
//! folded into the first user turn as `System: ...\n\nUser: ...`.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::{missing_api_key_error, network_error, parse_http_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig,
    StopReason, UsageStats,
};
use crate::http_client::build_http_client;
use crate::streaming_adapters::gemini::GeminiResponse;
use crate::streaming_adapters::{drive_sse_stream, GeminiStreamAdapter};
use theory_cascade_core::streaming::UnifiedStreamEvent;

/// Default Generative Language API base
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini provider
pub struct GeminiProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }

    fn api_base(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_BASE)
            .trim_end_matches('/')
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing_api_key_error("gemini"))
    }

    /// 2.5-series models accept a dynamic thinking budget.
    fn model_supports_thinking(&self) -> bool {
        self.config.model.contains("2.5")
    }

    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        request_options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = Vec::with_capacity(messages.len());
        let mut pending_system = system.filter(|s| !s.is_empty());

        for msg in messages {
            let (role, text) = match msg.role {
                MessageRole::Assistant => ("model", msg.content.clone()),
                MessageRole::User | MessageRole::System => match pending_system.take() {
                    Some(sys) => ("user", format!("System: {}\n\nUser: {}", sys, msg.content)),
                    None => ("user", msg.content.clone()),
                },
            };
            contents.push(serde_json::json!({
                "role": role,
                "parts": [{ "text": text }]
            }));
        }
        if let Some(sys) = pending_system {
            contents.insert(
                0,
                serde_json::json!({ "role": "user", "parts": [{ "text": format!("System: {}", sys) }] }),
            );
        }

        let mime_type = if request_options.json_output {
            "application/json"
        } else {
            "text/plain"
        };
        let mut generation_config = serde_json::json!({
            "temperature": request_options
                .temperature_override
                .unwrap_or(self.config.temperature),
            "maxOutputTokens": request_options
                .max_tokens_override
                .unwrap_or(self.config.max_tokens),
            "responseMimeType": mime_type,
        });
        if self.model_supports_thinking() {
            generation_config["thinkingConfig"] = serde_json::json!({ "thinkingBudget": -1 });
        }

        let safety_settings: Vec<serde_json::Value> = HARM_CATEGORIES
            .iter()
            .map(|category| {
                serde_json::json!({
                    "category": category,
                    "threshold": "BLOCK_LOW_AND_ABOVE"
                })
            })
            .collect();

        serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
            "safetySettings": safety_settings,
        })
    }

    async fn post(&self, method: &str, body: &serde_json::Value) -> LlmResult<reqwest::Response> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{}:{}", self.api_base(), self.config.model, method);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body_text = response.text().await.map_err(network_error)?;
            return Err(parse_http_error(status, &body_text, "gemini"));
        }
        Ok(response)
    }

    fn parse_response(&self, response: GeminiResponse) -> LlmResult<LlmResponse> {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmError::InvalidRequest {
                message: format!("Prompt blocked by Gemini: {}", reason),
            });
        }

        let text = response.text();
        let stop_reason = response
            .finish_reason()
            .map(StopReason::from)
            .unwrap_or(StopReason::EndTurn);
        let usage = response
            .usage_metadata
            .map(|u| UsageStats {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: (!text.is_empty()).then_some(text),
            stop_reason,
            usage,
            model: self.config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
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
        let body = self.build_request_body(&messages, system.as_deref(), &request_options);
        let response = self.post("generateContent", &body).await?;
        let body_text = response.text().await.map_err(network_error)?;
        let parsed: GeminiResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;
        self.parse_response(parsed)
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let body = self.build_request_body(&messages, system.as_deref(), &request_options);
        let response = self.post("streamGenerateContent?alt=sse", &body).await?;
        drive_sse_stream(response, GeminiStreamAdapter::new(), &tx, &self.config.model).await
    }

    async fn health_check(&self) -> LlmResult<()> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/models/{}", self.api_base(), self.config.model))
            .header("x-goog-api-key", api_key)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status, &body, "gemini"))
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
