//! Knowledge
//!
//! Text chunking for coding oversized documents and for building the
//! retrieval index.

pub mod chunker;

pub use chunker::{coding_segments, Chunk, TextChunker, TextChunks};
