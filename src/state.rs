//! Settings Store
//!
//! Shared handle to the live configuration. The pipeline snapshots it at the
//! start of every operation, so a backend switch takes effect on the next call.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};

/// Cloneable handle to the current configuration
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    inner: Arc<RwLock<AppConfig>>,
}

impl SettingsStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the configuration as it is right now
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }

    /// Replace the whole configuration
    pub async fn replace(&self, config: AppConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        *self.inner.write().await = config;
        Ok(())
    }

    /// Apply a partial update, rejecting it if the result does not validate
    pub async fn update(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.inner.write().await;
        let mut candidate = guard.clone();
        candidate.apply_update(update);
        candidate.validate().map_err(AppError::validation)?;
        *guard = candidate.clone();
        Ok(candidate)
    }
}
