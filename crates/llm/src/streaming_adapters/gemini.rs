//! Gemini streamGenerateContent Adapter
//!
//! With `alt=sse` every line carries one complete `GenerateContentResponse`.
//! Usage metadata is cumulative, so only the latest value matters.

use serde::Deserialize;
use theory_cascade_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    pub(crate) fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    pub(crate) fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }
}

/// Adapter for Gemini SSE format
#[derive(Debug, Default)]
pub struct GeminiStreamAdapter;

impl GeminiStreamAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl StreamAdapter for GeminiStreamAdapter {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();
        let json_str = trimmed.strip_prefix("data:").map(str::trim).unwrap_or(trimmed);
        if json_str.is_empty() {
            return Ok(vec![]);
        }

        let chunk: GeminiResponse =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut events = vec![];
        if let Some(reason) = chunk.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
            events.push(UnifiedStreamEvent::Error {
                message: format!("Prompt blocked: {}", reason),
                code: Some(reason),
            });
            return Ok(events);
        }

        let text = chunk.text();
        if !text.is_empty() {
            events.push(UnifiedStreamEvent::TextDelta { content: text });
        }
        if let Some(usage) = &chunk.usage_metadata {
            events.push(UnifiedStreamEvent::Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            });
        }
        if let Some(reason) = chunk.finish_reason() {
            events.push(UnifiedStreamEvent::Complete {
                stop_reason: Some(reason.to_string()),
            });
        }
        Ok(events)
    }
}
