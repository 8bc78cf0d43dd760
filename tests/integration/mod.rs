//! Integration Tests Module
//!
//! End-to-end tests of the coding pipeline, retrieval and response parsing,
//! driven by scripted providers so no network access is needed.

// Scripted providers and backend factory
mod support;

// Stage orchestration, drivers and failure semantics
mod pipeline_test;

// Corpus ranking and evidence retrieval
mod retrieval_test;

// Parser, diagram, chunking and fan-out behavior
mod structured_output_test;
