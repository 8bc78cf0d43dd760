//! In-memory vector store with exact cosine k-nearest-neighbour search.

use crate::services::knowledge::chunker::Chunk;

/// A chunk together with its embedding.
#[derive(Debug, Clone)]
struct StoredChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub score: f32,
}

/// Flat store scanned on every query. Corpora here are a few thousand
/// chunks at most.
#[derive(Debug, Clone, Default)]
pub struct MemoryVectorStore {
    entries: Vec<StoredChunk>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chunk: Chunk, embedding: Vec<f32>) {
        self.entries.push(StoredChunk { chunk, embedding });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` most similar chunks, best first. Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let chunk = &self.entries[i].chunk;
                SearchHit {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    content: chunk.content.clone(),
                    score,
                }
            })
            .collect()
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
