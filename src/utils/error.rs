//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::services::retrieval::EmbeddingError;
use theory_cascade_core::CoreError;
use theory_cascade_llm::LlmError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing credential or invalid setting; the operation is not attempted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Language-model provider failures
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    /// Embedding provider failures
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Data-model errors from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error should be reported as a configuration problem
    /// rather than a transport failure.
    pub fn is_configuration(&self) -> bool {
        match self {
            AppError::Config(_) | AppError::Validation(_) => true,
            AppError::Provider(e) => e.is_configuration(),
            AppError::Embedding(e) => e.is_configuration(),
            _ => false,
        }
    }
}

/// Convert AppError to a one-line string for user-facing notices
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
