//! Retrieval Subsystem
//!
//! Embedding backends, an in-memory vector store, and corpus ranking.

pub mod embedding_ollama;
pub mod embedding_openai;
pub mod embedding_provider;
pub mod embedding_tfidf;
pub mod ranking;
pub mod vector_store;

use std::sync::Arc;

pub use embedding_ollama::OllamaEmbeddingProvider;
pub use embedding_openai::OpenAIEmbeddingProvider;
pub use embedding_provider::{
    EmbeddingError, EmbeddingProvider, EmbeddingProviderConfig, EmbeddingProviderType,
    EmbeddingResult,
};
pub use embedding_tfidf::TfIdfEmbeddingProvider;
pub use ranking::{documents_for_hits, CorpusIndex, RankingService};
pub use vector_store::{cosine_similarity, MemoryVectorStore, SearchHit};

/// Construct the embedding backend described by `config`.
pub fn create_embedding_provider(
    config: &EmbeddingProviderConfig,
) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderType::TfIdf => Arc::new(TfIdfEmbeddingProvider::new()),
        EmbeddingProviderType::Ollama => Arc::new(OllamaEmbeddingProvider::new(config)?),
        EmbeddingProviderType::OpenAI => Arc::new(OpenAIEmbeddingProvider::new(config)?),
    };
    Ok(provider)
}
