//! Theory Cascade
//!
//! Gioia-style qualitative coding over interchangeable language-model
//! providers. It includes:
//! - Settings, configuration storage and the live settings handle
//! - The provider-backed analysis operations and their prompt templates
//! - The staged coding pipeline, from first-order codes to a model diagram
//! - Embedding-based retrieval over the corpus

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use models::settings::{AppConfig, PipelineParams, RetrievalParams, SettingsUpdate};
pub use services::coding::{CodedCorpus, CodingPipeline, PipelineReport, StageOutcome};
pub use services::analysis::ProviderRegistry;
pub use state::SettingsStore;
pub use storage::ConfigService;
pub use utils::error::{AppError, AppResult};

pub use theory_cascade_core::{Document, ModelState};
