//! Analysis Operations
//!
//! Backend-independent operation set over the language-model providers.

pub mod analyst;
pub mod backend;
pub mod prompts;

pub use analyst::{Analyst, NOT_AVAILABLE};
pub use backend::{AnalysisBackend, BackendFactory, ProviderRegistry};
pub use prompts::{prompts_for, Operation, PromptPair, PromptSet, DIAGRAM_KEYWORD};
