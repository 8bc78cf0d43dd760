//! Storage Layer
//!
//! JSON configuration persistence. Analysis state itself is never persisted.

pub mod config;

pub use config::*;
