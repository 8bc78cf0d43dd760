//! Corpus Ranking
//!
//! Chunks a corpus, embeds every chunk, and answers free-text queries with
//! the nearest chunks. `RankingService` folds those hits back onto source
//! documents.

use std::collections::HashSet;
use std::sync::Arc;

use theory_cascade_core::Document;
use tracing::{debug, info};

use super::embedding_provider::{EmbeddingProvider, EmbeddingResult};
use super::vector_store::{MemoryVectorStore, SearchHit};
use crate::models::settings::RetrievalParams;
use crate::services::knowledge::chunker::TextChunker;

/// Embedded chunks of one corpus, searchable by free-text query.
pub struct CorpusIndex {
    store: MemoryVectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl CorpusIndex {
    /// Chunk and embed `documents`, in batches no larger than the embedder allows.
    pub async fn build(
        documents: &[Document],
        chunker: &TextChunker,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> EmbeddingResult<Self> {
        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|doc| chunker.chunk_document(doc))
            .collect();

        let batch_size = embedder.max_batch_size().max(1);
        let mut store = MemoryVectorStore::new();
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embeddings = embedder.embed_documents(&texts).await?;
            for (chunk, embedding) in batch.iter().cloned().zip(embeddings) {
                store.insert(chunk, embedding);
            }
        }

        debug!(
            documents = documents.len(),
            chunks = store.len(),
            embedder = embedder.display_name(),
            "Built corpus index"
        );
        Ok(Self { store, embedder })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// The `k` chunks closest to `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> EmbeddingResult<Vec<SearchHit>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(query).await?;
        Ok(self.store.search(&vector, k))
    }
}

/// Ranks a corpus against a query through a [`CorpusIndex`].
#[derive(Debug, Clone, Default)]
pub struct RankingService {
    params: RetrievalParams,
}

impl RankingService {
    pub fn new(params: RetrievalParams) -> Self {
        Self { params }
    }

    pub fn chunker(&self) -> TextChunker {
        TextChunker::for_retrieval(&self.params)
    }

    /// Rank `documents` by relevance to `query`.
    ///
    /// A blank query, or no embedder, returns the input unchanged. Otherwise
    /// the top-k chunks are mapped back to their documents, deduplicated in
    /// first-seen order.
    pub async fn rank(
        &self,
        query: &str,
        documents: &[Document],
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> EmbeddingResult<Vec<Document>> {
        let query = query.trim();
        if query.is_empty() || documents.is_empty() {
            return Ok(documents.to_vec());
        }
        let Some(embedder) = embedder else {
            info!("No embedding capability; returning corpus unranked");
            return Ok(documents.to_vec());
        };

        let index = CorpusIndex::build(documents, &self.chunker(), embedder).await?;
        let hits = index.search(query, self.params.top_k).await?;
        let ranked = documents_for_hits(&hits, documents);

        info!(
            query = %query,
            hits = hits.len(),
            documents = ranked.len(),
            "Ranked corpus"
        );
        Ok(ranked)
    }
}

/// Map hits to their source documents, first occurrence wins.
pub fn documents_for_hits(hits: &[SearchHit], documents: &[Document]) -> Vec<Document> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|hit| seen.insert(hit.document_id.as_str()))
        .filter_map(|hit| documents.iter().find(|d| d.id == hit.document_id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::retrieval::TfIdfEmbeddingProvider;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("d1", "Supply chains", "Logistics costs and shipping delays."),
            Document::new("d2", "Remote work", "Remote teams report burnout and isolation."),
            Document::new("d3", "Pricing", "Dynamic pricing in retail markets."),
        ]
    }

    fn hit(doc: &str, chunk: usize) -> SearchHit {
        SearchHit {
            chunk_id: format!("{}:{}", doc, chunk),
            document_id: doc.to_string(),
            content: String::new(),
            score: 0.0,
        }
    }

    #[test]
    fn hits_map_to_unique_documents_in_order() {
        let hits = vec![hit("d3", 0), hit("d1", 2), hit("d3", 1), hit("missing", 0)];
        let ids: Vec<String> = documents_for_hits(&hits, &corpus())
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["d3", "d1"]);
    }

    #[tokio::test]
    async fn blank_query_is_identity() {
        let service = RankingService::default();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TfIdfEmbeddingProvider::new());
        let ranked = service.rank("   ", &corpus(), Some(embedder)).await.unwrap();
        assert_eq!(ranked, corpus());
    }

    #[tokio::test]
    async fn missing_embedder_returns_input_unchanged() {
        let service = RankingService::default();
        let ranked = service.rank("burnout", &corpus(), None).await.unwrap();
        assert_eq!(ranked, corpus());
    }

    #[tokio::test]
    async fn relevant_document_ranks_first() {
        let service = RankingService::default();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TfIdfEmbeddingProvider::new());
        let ranked = service
            .rank("remote burnout", &corpus(), Some(embedder))
            .await
            .unwrap();
        assert_eq!(ranked[0].id, "d2");
        assert_eq!(ranked.len(), 3);
    }

    #[tokio::test]
    async fn index_search_returns_chunk_content() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TfIdfEmbeddingProvider::new());
        let index = CorpusIndex::build(&corpus(), &TextChunker::new(1000, 0), embedder)
            .await
            .unwrap();
        assert_eq!(index.len(), 3);
        let hits = index.search("shipping delays", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "d1:0");
        assert!(hits[0].content.contains("shipping"));
    }
}
