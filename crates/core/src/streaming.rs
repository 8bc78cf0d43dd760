//! Unified Stream Event Types
//!
//! Provider-agnostic events for streamed completions. Provider adapters in the
//! LLM crate translate their wire formats into these; the application crate
//! forwards text fragments to a caller-supplied sink.

use serde::{Deserialize, Serialize};

/// Unified streaming event that all provider adapters convert to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedStreamEvent {
    /// Text content delta from the model
    TextDelta { content: String },

    /// Token usage information
    Usage { input_tokens: u32, output_tokens: u32 },

    /// Error during streaming
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Stream complete
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

impl UnifiedStreamEvent {
    /// Text carried by a delta event, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            UnifiedStreamEvent::TextDelta { content } => Some(content),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnifiedStreamEvent::Complete { .. } | UnifiedStreamEvent::Error { .. }
        )
    }
}

/// Errors produced while adapting a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Invalid format that couldn't be parsed
    InvalidFormat(String),
    /// JSON/data parsing error
    ParseError(String),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AdapterError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Trait for adapting provider-specific stream formats to unified events.
pub trait StreamAdapter: Send + Sync {
    /// Returns the provider name for logging and identification.
    fn provider_name(&self) -> &'static str;

    /// Adapt a raw stream line to unified events.
    ///
    /// A single input line may produce zero, one, or multiple events.
    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError>;

    /// Reset adapter state for a new stream.
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta_serialization() {
        let event = UnifiedStreamEvent::TextDelta {
            content: "Hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"text_delta\""));
        assert!(json.contains("\"content\":\"Hello\""));

        let parsed: UnifiedStreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_complete_omits_missing_reason() {
        let event = UnifiedStreamEvent::Complete { stop_reason: None };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"complete"}"#);
    }

    #[test]
    fn test_text_and_terminal_helpers() {
        let delta = UnifiedStreamEvent::TextDelta {
            content: "flow".into(),
        };
        assert_eq!(delta.text(), Some("flow"));
        assert!(!delta.is_terminal());

        let err = UnifiedStreamEvent::Error {
            message: "boom".into(),
            code: None,
        };
        assert_eq!(err.text(), None);
        assert!(err.is_terminal());
    }

    #[test]
    fn test_adapter_error_display() {
        let err = AdapterError::ParseError("bad json".into());
        assert_eq!(err.to_string(), "Parse error: bad json");
    }
}
