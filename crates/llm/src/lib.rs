//! Theory Cascade LLM
//!
//! Provides a unified interface for interacting with the supported LLM providers:
//! - OpenAI (and OpenAI-compatible gateways)
//! - Google Gemini
//! - Ollama (local inference)
//!
//! Also includes provider-specific streaming adapters and the HTTP client factory.

pub mod gemini;
pub mod http_client;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod streaming_adapters;
pub mod types;

// Re-export main types
pub use gemini::GeminiProvider;
pub use http_client::build_http_client;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use provider::{missing_api_key_error, parse_http_error, LlmProvider};
pub use types::*;

// Re-export streaming adapters
pub use streaming_adapters::{GeminiStreamAdapter, OpenAIStreamAdapter};
