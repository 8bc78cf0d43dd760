//! HTTP Client Factory
//!
//! Builds the reqwest client shared by the HTTP-based providers, carrying the
//! configured timeout and any gateway headers.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::types::{LlmError, LlmResult, ProviderConfig};

/// Default request timeout when the config does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Build a `reqwest::Client` for the given provider configuration.
pub fn build_http_client(config: &ProviderConfig) -> LlmResult<reqwest::Client> {
    let headers = default_headers(config)?;
    reqwest::Client::builder()
        .timeout(Duration::from_secs(
            config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        ))
        .default_headers(headers)
        .build()
        .map_err(|e| LlmError::Other {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

fn default_headers(config: &ProviderConfig) -> LlmResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| LlmError::InvalidRequest {
            message: format!("Invalid header name '{}': {}", name, e),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| LlmError::InvalidRequest {
            message: format!("Invalid value for header '{}': {}", name, e),
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}
