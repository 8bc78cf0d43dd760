//! Data Models
//!
//! Application settings. The analysis data model lives in the core crate.

pub mod settings;

pub use settings::*;
