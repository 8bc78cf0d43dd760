//! Theory Cascade Core
//!
//! Foundational error types, the qualitative-model data types, and the unified
//! streaming event vocabulary for the Theory Cascade workspace. This crate has
//! no dependencies on provider SDKs, HTTP clients or the async runtime.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `document` - Source documents and their first-order codes
//! - `model_state` - Theme/dimension maps, theories, tuples and the accumulating `ModelState`
//! - `streaming` - Unified stream event types and adapter trait

pub mod document;
pub mod error;
pub mod model_state;
pub mod streaming;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Data Model ─────────────────────────────────────────────────────────
pub use document::{dedupe_codes, Document, InitialCode};
pub use model_state::{
    restrict_members,
    ConceptTuple, DimensionMap, Interrelationship, ModelState, ModelStateUpdate, ThemeMap, Theory,
};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};
