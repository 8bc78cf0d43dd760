//! OpenAI Chat Completions Adapter
//!
//! Handles the OpenAI SSE format (`data: {...}` lines terminated by `data: [DONE]`).

use serde::Deserialize;
use theory_cascade_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Adapter for OpenAI API SSE format
#[derive(Debug, Default)]
pub struct OpenAIStreamAdapter {
    completed: bool,
}

impl OpenAIStreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamAdapter for OpenAIStreamAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();
        let json_str = trimmed.strip_prefix("data:").map(str::trim).unwrap_or(trimmed);

        if json_str.is_empty() {
            return Ok(vec![]);
        }
        if json_str == "[DONE]" {
            if self.completed {
                return Ok(vec![]);
            }
            self.completed = true;
            return Ok(vec![UnifiedStreamEvent::Complete { stop_reason: None }]);
        }

        let chunk: OpenAIChunk =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut events = vec![];
        for choice in chunk.choices {
            if let Some(content) = choice.delta.and_then(|d| d.content) {
                if !content.is_empty() {
                    events.push(UnifiedStreamEvent::TextDelta { content });
                }
            }
            if let Some(finish_reason) = choice.finish_reason {
                self.completed = true;
                events.push(UnifiedStreamEvent::Complete {
                    stop_reason: Some(finish_reason),
                });
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(UnifiedStreamEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        Ok(events)
    }

    fn reset(&mut self) {
        self.completed = false;
    }
}
